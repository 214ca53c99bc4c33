//! The method dispatcher (spec.md §4.7): for every value kind, a fixed
//! catalogue of named methods. A matched method materializes as a
//! `Func` carrying the receiver, so `a.push` and `a.push(x)` both make
//! sense the same way a plain identifier does (spec.md §9 "Methods as
//! callables"). Mutating array/dict methods (`push`, `pop`, `insert`,
//! `remove`) are the exception: they need a mutable slot, not a value
//! copy, so they bypass [`get_method`] entirely and are dispatched
//! straight from `code::eval_func_call` through `access::access`.

use ecow::{eco_format, EcoString};
use indexmap::IndexMap;
use regex::Regex;

use quill_syntax::Span;

use crate::diag::{At, SourceResult};
use crate::value::{
    compare, values_equal, Arguments, Array, Color, Content, ContentNode, Counter, Dict, Func,
    Selector, Value,
};
use crate::vm::Vm;

/// Whether `field` names one of the mutating array/dict methods (spec.md
/// §4.7, §9).
pub fn is_mutating(field: &str) -> bool {
    matches!(field, "push" | "pop" | "insert" | "remove")
}

/// Resolve `field` against `value`'s method catalogue. `None` means
/// "no such method", letting the caller fall through to plain field
/// access (spec.md §4.2 field access resolution order).
pub fn get_method(value: &Value, field: &str) -> Option<Func> {
    match value {
        Value::Str(s) => string_method(s.clone(), field),
        Value::Array(a) => array_method(a.clone(), field),
        Value::Dict(d) => dict_method(d.clone(), field),
        Value::Content(c) => content_method(c.clone(), field),
        Value::Counter(c) => counter_method(c.clone(), field),
        Value::Color(c) => color_method(*c, field),
        Value::Func(f) => function_method(f.clone(), field),
        Value::Selector(s) => selector_method(s.clone(), field),
        Value::Args(a) => arguments_method(a.clone(), field),
        _ => None,
    }
}

fn native(name: &'static str, f: impl Fn(&mut Vm, Arguments, Span) -> SourceResult<Value> + 'static) -> Func {
    Func::native(name, f)
}

fn pop_positional(args: &mut Arguments) -> Option<Value> {
    if args.positional.is_empty() { None } else { Some(args.positional.remove(0)) }
}

fn pop_named(args: &mut Arguments, name: &str) -> Option<Value> {
    args.named.shift_remove(name)
}

fn expect_arg(args: &mut Arguments, what: &str, span: Span) -> SourceResult<Value> {
    pop_positional(args).ok_or_else(|| eco_format!("missing argument: {what}")).at(span)
}

fn expect_str(args: &mut Arguments, what: &str, span: Span) -> SourceResult<EcoString> {
    match expect_arg(args, what, span)? {
        Value::Str(s) => Ok(s),
        other => Err(eco_format!("expected string, found {}", other.ty())).at(span),
    }
}

fn expect_int(args: &mut Arguments, what: &str, span: Span) -> SourceResult<i64> {
    match expect_arg(args, what, span)? {
        Value::Int(i) => Ok(i),
        other => Err(eco_format!("expected integer, found {}", other.ty())).at(span),
    }
}

fn expect_func(args: &mut Arguments, what: &str, span: Span) -> SourceResult<Func> {
    match expect_arg(args, what, span)? {
        Value::Func(f) => Ok(f),
        other => Err(eco_format!("expected function, found {}", other.ty())).at(span),
    }
}

// ------------------------------------------------------------- Patterns

/// A `string | regex` argument shared by the `contains`, `find`,
/// `replace`, and `split` catalogue entries.
enum Pattern {
    Str(EcoString),
    Regex(Regex),
}

impl Pattern {
    fn from_value(v: Value, span: Span) -> SourceResult<Pattern> {
        match v {
            Value::Str(s) => Ok(Pattern::Str(s)),
            Value::Regex(r) => Ok(Pattern::Regex(r)),
            other => Err(eco_format!("expected string or regex, found {}", other.ty())).at(span),
        }
    }

    fn find_at(&self, haystack: &str) -> Option<(usize, usize)> {
        match self {
            Pattern::Str(needle) => haystack.find(needle.as_str()).map(|i| (i, i + needle.len())),
            Pattern::Regex(re) => re.find(haystack).map(|m| (m.start(), m.end())),
        }
    }

    fn find_all(&self, haystack: &str) -> Vec<(usize, usize)> {
        match self {
            Pattern::Str(needle) => {
                if needle.is_empty() {
                    return Vec::new();
                }
                haystack.match_indices(needle.as_str()).map(|(i, m)| (i, i + m.len())).collect()
            }
            Pattern::Regex(re) => re.find_iter(haystack).map(|m| (m.start(), m.end())).collect(),
        }
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Pattern::Str(needle) => haystack.contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }
}

fn nth_char_boundary(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn char_len(s: &str) -> i64 {
    s.chars().count() as i64
}

/// Resolve a possibly-negative, codepoint-indexed position into a byte
/// offset, the way `at`/`slice`/`first`/`last` all need to (spec.md §4.7).
fn wrap_index(i: i64, len: i64) -> i64 {
    if i < 0 { i + len } else { i }
}

// --------------------------------------------------------------- String

fn string_method(s: EcoString, field: &str) -> Option<Func> {
    let recv = s;
    Some(match field {
        "len" => {
            let recv = recv.clone();
            native("len", move |_, _, _| Ok(Value::Int(char_len(&recv))))
        }
        "first" => {
            let recv = recv.clone();
            native("first", move |_, _, span| {
                recv.chars().next().map(|c| Value::Str(c.into())).ok_or_else(|| eco_format!("string is empty")).at(span)
            })
        }
        "last" => {
            let recv = recv.clone();
            native("last", move |_, _, span| {
                recv.chars().last().map(|c| Value::Str(c.into())).ok_or_else(|| eco_format!("string is empty")).at(span)
            })
        }
        "at" => {
            let recv = recv.clone();
            native("at", move |_, mut args, span| {
                let i = expect_int(&mut args, "index", span)?;
                let len = char_len(&recv);
                let idx = wrap_index(i, len);
                if idx < 0 || idx >= len {
                    crate::bail!(span, "string index out of bounds (index: {i}, len: {len})");
                }
                Ok(Value::Str(recv.chars().nth(idx as usize).unwrap().into()))
            })
        }
        "slice" => {
            let recv = recv.clone();
            native("slice", move |_, mut args, span| {
                let len = char_len(&recv);
                let start = wrap_index(expect_int(&mut args, "start", span)?, len).clamp(0, len);
                let end = match pop_positional(&mut args) {
                    Some(Value::Int(e)) => wrap_index(e, len).clamp(0, len),
                    Some(Value::None) | None => len,
                    Some(other) => crate::bail!(span, "expected integer, found {}", other.ty()),
                };
                if end <= start {
                    return Ok(Value::Str(EcoString::new()));
                }
                let start_b = nth_char_boundary(&recv, start as usize);
                let end_b = nth_char_boundary(&recv, end as usize);
                Ok(Value::Str(recv[start_b..end_b].into()))
            })
        }
        // True grapheme clusters, unlike `codepoints` — the crate already
        // carries `unicode-segmentation` for this (spec.md §9 resolves
        // the stated per-codepoint fallback in favor of the real thing).
        "clusters" => {
            let recv = recv.clone();
            native("clusters", move |_, _, _| {
                use unicode_segmentation::UnicodeSegmentation;
                Ok(Value::Array(recv.as_str().graphemes(true).map(|g| Value::Str(g.into())).collect()))
            })
        }
        "codepoints" => {
            let recv = recv.clone();
            native("codepoints", move |_, _, _| {
                Ok(Value::Array(recv.chars().map(|c| Value::Str(c.into())).collect()))
            })
        }
        "contains" => {
            let recv = recv.clone();
            native("contains", move |_, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                Ok(Value::Bool(pat.is_match(&recv)))
            })
        }
        "starts-with" => {
            let recv = recv.clone();
            native("starts-with", move |_, mut args, span| {
                match expect_arg(&mut args, "pattern", span)? {
                    Value::Str(needle) => Ok(Value::Bool(recv.starts_with(needle.as_str()))),
                    Value::Regex(re) => Ok(Value::Bool(re.find(&recv).is_some_and(|m| m.start() == 0))),
                    other => Err(eco_format!("expected string or regex, found {}", other.ty())).at(span),
                }
            })
        }
        "ends-with" => {
            let recv = recv.clone();
            native("ends-with", move |_, mut args, span| {
                match expect_arg(&mut args, "pattern", span)? {
                    Value::Str(needle) => Ok(Value::Bool(recv.ends_with(needle.as_str()))),
                    Value::Regex(re) => Ok(Value::Bool(re.find(&recv).is_some_and(|m| m.end() == recv.len()))),
                    other => Err(eco_format!("expected string or regex, found {}", other.ty())).at(span),
                }
            })
        }
        "find" => {
            let recv = recv.clone();
            native("find", move |_, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                Ok(match pat.find_at(&recv) {
                    Some((s, e)) => Value::Str(recv[s..e].into()),
                    None => Value::None,
                })
            })
        }
        "position" => {
            let recv = recv.clone();
            native("position", move |_, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                Ok(match pat.find_at(&recv) {
                    Some((s, _)) => Value::Int(recv[..s].chars().count() as i64),
                    None => Value::None,
                })
            })
        }
        "match" => {
            let recv = recv.clone();
            native("match", move |_, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                Ok(match pat.find_at(&recv) {
                    Some((s, e)) => {
                        let mut d = Dict::new();
                        d.insert("start".into(), Value::Int(recv[..s].chars().count() as i64));
                        d.insert("end".into(), Value::Int(recv[..e].chars().count() as i64));
                        d.insert("text".into(), Value::Str(recv[s..e].into()));
                        Value::Dict(d)
                    }
                    None => Value::None,
                })
            })
        }
        "matches" => {
            let recv = recv.clone();
            native("matches", move |_, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                Ok(Value::Array(pat.find_all(&recv).into_iter().map(|(s, e)| Value::Str(recv[s..e].into())).collect()))
            })
        }
        "replace" => {
            let recv = recv.clone();
            native("replace", move |vm, mut args, span| {
                let pat = Pattern::from_value(expect_arg(&mut args, "pattern", span)?, span)?;
                let with = expect_arg(&mut args, "replacement", span)?;
                let count = match pop_named(&mut args, "count") {
                    Some(Value::Int(n)) => Some(n as usize),
                    Some(Value::None) | None => None,
                    Some(other) => crate::bail!(span, "expected integer, found {}", other.ty()),
                };
                let mut out = String::new();
                let mut last = 0;
                let mut done = 0;
                for (s, e) in pat.find_all(&recv) {
                    if let Some(limit) = count {
                        if done >= limit {
                            break;
                        }
                    }
                    out.push_str(&recv[last..s]);
                    match &with {
                        Value::Str(lit) => out.push_str(lit),
                        Value::Func(f) => {
                            let mut call_args = Arguments::new(span);
                            call_args.push_positional(Value::Str(recv[s..e].into()));
                            let replacement = f.call(vm, call_args, span)?;
                            match replacement {
                                Value::Str(r) => out.push_str(&r),
                                other => crate::bail!(span, "replacement function must return a string, found {}", other.ty()),
                            }
                        }
                        other => crate::bail!(span, "expected string or function, found {}", other.ty()),
                    }
                    last = e;
                    done += 1;
                }
                out.push_str(&recv[last..]);
                Ok(Value::Str(out.into()))
            })
        }
        "trim" => {
            let recv = recv.clone();
            native("trim", move |_, mut args, span| {
                let pattern = pop_positional(&mut args);
                let repeat = match pop_named(&mut args, "repeat") {
                    Some(Value::Bool(b)) => b,
                    _ => true,
                };
                let at = match pop_named(&mut args, "at") {
                    Some(Value::Str(s)) => Some(s),
                    _ => None,
                };
                let trim_start = at.as_deref() != Some("end");
                let trim_end = at.as_deref() != Some("start");
                let text = recv.as_str();
                let text = match pattern {
                    None | Some(Value::None) => {
                        let s = if trim_start { text.trim_start() } else { text };
                        if trim_end { s.trim_end() } else { s }
                    }
                    Some(v) => {
                        let pat = Pattern::from_value(v, span)?;
                        trim_pattern(text, &pat, trim_start, trim_end, repeat)
                    }
                };
                Ok(Value::Str(text.into()))
            })
        }
        "split" => {
            let recv = recv.clone();
            native("split", move |_, mut args, span| {
                let sep = pop_positional(&mut args);
                let parts: Vec<Value> = match sep {
                    None | Some(Value::None) => recv.chars().map(|c| Value::Str(c.into())).collect(),
                    Some(Value::Str(s)) if s.is_empty() => {
                        let mut out = vec![Value::Str(EcoString::new())];
                        out.extend(recv.chars().map(|c| Value::Str(c.into())));
                        out.push(Value::Str(EcoString::new()));
                        out
                    }
                    Some(v) => {
                        let pat = Pattern::from_value(v, span)?;
                        let mut out = Vec::new();
                        let mut last = 0;
                        for (s, e) in pat.find_all(&recv) {
                            out.push(Value::Str(recv[last..s].into()));
                            last = e;
                        }
                        out.push(Value::Str(recv[last..].into()));
                        out
                    }
                };
                Ok(Value::Array(parts))
            })
        }
        _ => return None,
    })
}

fn trim_pattern(text: &str, pat: &Pattern, start: bool, end: bool, repeat: bool) -> String {
    let mut s = text;
    if start {
        loop {
            match pat.find_at(s) {
                Some((0, e)) if e > 0 => {
                    s = &s[e..];
                    if !repeat {
                        break;
                    }
                }
                _ => break,
            }
        }
    }
    if end {
        loop {
            match pat.find_at(s).filter(|&(_, e)| e == s.len()) {
                Some((st, _)) if st < s.len() => {
                    s = &s[..st];
                    if !repeat {
                        break;
                    }
                }
                _ => break,
            }
        }
    }
    s.to_string()
}

// ---------------------------------------------------------------- Array

fn array_method(a: Array, field: &str) -> Option<Func> {
    Some(match field {
        "len" => {
            let a = a.clone();
            native("len", move |_, _, _| Ok(Value::Int(a.len() as i64)))
        }
        "first" => {
            let a = a.clone();
            native("first", move |_, _, span| a.first().cloned().ok_or_else(|| eco_format!("array is empty")).at(span))
        }
        "last" => {
            let a = a.clone();
            native("last", move |_, _, span| a.last().cloned().ok_or_else(|| eco_format!("array is empty")).at(span))
        }
        "at" => {
            let a = a.clone();
            native("at", move |_, mut args, span| {
                let i = expect_int(&mut args, "index", span)?;
                let default = pop_named(&mut args, "default");
                let len = a.len() as i64;
                let idx = wrap_index(i, len);
                if idx < 0 || idx >= len {
                    return default.ok_or_else(|| eco_format!("array index out of bounds (index: {i}, len: {len})")).at(span);
                }
                Ok(a[idx as usize].clone())
            })
        }
        "slice" => {
            let a = a.clone();
            native("slice", move |_, mut args, span| {
                let len = a.len() as i64;
                let start = wrap_index(expect_int(&mut args, "start", span)?, len).clamp(0, len);
                let end = match pop_positional(&mut args).or_else(|| pop_named(&mut args, "count").map(|c| c)) {
                    Some(Value::Int(e)) => wrap_index(e, len).clamp(0, len),
                    _ => len,
                };
                if end <= start {
                    return Ok(Value::Array(Vec::new()));
                }
                Ok(Value::Array(a[start as usize..end as usize].to_vec()))
            })
        }
        "split" => {
            let a = a.clone();
            native("split", move |_, mut args, span| {
                let at = expect_arg(&mut args, "separator", span)?;
                let mut out: Vec<Value> = Vec::new();
                let mut current = Vec::new();
                for item in &a {
                    if values_equal(item, &at) {
                        out.push(Value::Array(std::mem::take(&mut current)));
                    } else {
                        current.push(item.clone());
                    }
                }
                out.push(Value::Array(current));
                Ok(Value::Array(out))
            })
        }
        "contains" => {
            let a = a.clone();
            native("contains", move |_, mut args, span| {
                let needle = expect_arg(&mut args, "value", span)?;
                Ok(Value::Bool(a.iter().any(|v| values_equal(v, &needle))))
            })
        }
        "find" => {
            let a = a.clone();
            native("find", move |vm, mut args, span| {
                let pred = expect_func(&mut args, "predicate", span)?;
                for item in &a {
                    if call_bool(vm, &pred, item.clone(), span)? {
                        return Ok(item.clone());
                    }
                }
                Ok(Value::None)
            })
        }
        "position" => {
            let a = a.clone();
            native("position", move |vm, mut args, span| {
                let pred = expect_func(&mut args, "predicate", span)?;
                for (i, item) in a.iter().enumerate() {
                    if call_bool(vm, &pred, item.clone(), span)? {
                        return Ok(Value::Int(i as i64));
                    }
                }
                Ok(Value::None)
            })
        }
        "filter" => {
            let a = a.clone();
            native("filter", move |vm, mut args, span| {
                let pred = expect_func(&mut args, "predicate", span)?;
                let mut out = Vec::new();
                for item in &a {
                    if call_bool(vm, &pred, item.clone(), span)? {
                        out.push(item.clone());
                    }
                }
                Ok(Value::Array(out))
            })
        }
        "map" => {
            let a = a.clone();
            native("map", move |vm, mut args, span| {
                let f = expect_func(&mut args, "function", span)?;
                let mut out = Vec::with_capacity(a.len());
                for item in &a {
                    let mut call_args = Arguments::new(span);
                    call_args.push_positional(item.clone());
                    out.push(f.call(vm, call_args, span)?);
                }
                Ok(Value::Array(out))
            })
        }
        "flatten" => {
            let a = a.clone();
            native("flatten", move |_, _, _| {
                fn flatten_into(v: &Value, out: &mut Vec<Value>) {
                    match v {
                        Value::Array(items) => items.iter().for_each(|i| flatten_into(i, out)),
                        other => out.push(other.clone()),
                    }
                }
                let mut out = Vec::new();
                for item in &a {
                    flatten_into(item, &mut out);
                }
                Ok(Value::Array(out))
            })
        }
        "enumerate" => {
            let a = a.clone();
            native("enumerate", move |_, _, _| {
                Ok(Value::Array(
                    a.iter().enumerate().map(|(i, v)| Value::Array(vec![Value::Int(i as i64), v.clone()])).collect(),
                ))
            })
        }
        "fold" => {
            let a = a.clone();
            native("fold", move |vm, mut args, span| {
                let mut acc = expect_arg(&mut args, "init", span)?;
                let f = expect_func(&mut args, "function", span)?;
                for item in &a {
                    let mut call_args = Arguments::new(span);
                    call_args.push_positional(acc);
                    call_args.push_positional(item.clone());
                    acc = f.call(vm, call_args, span)?;
                }
                Ok(acc)
            })
        }
        "any" => {
            let a = a.clone();
            native("any", move |vm, mut args, span| {
                let pred = expect_func(&mut args, "predicate", span)?;
                for item in &a {
                    if call_bool(vm, &pred, item.clone(), span)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            })
        }
        "all" => {
            let a = a.clone();
            native("all", move |vm, mut args, span| {
                let pred = expect_func(&mut args, "predicate", span)?;
                for item in &a {
                    if !call_bool(vm, &pred, item.clone(), span)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            })
        }
        "rev" => {
            let a = a.clone();
            native("rev", move |_, _, _| {
                let mut out = a.clone();
                out.reverse();
                Ok(Value::Array(out))
            })
        }
        "join" => {
            let a = a.clone();
            native("join", move |_, mut args, span| {
                let sep = pop_positional(&mut args);
                let last = pop_named(&mut args, "last");
                if a.is_empty() {
                    return Ok(Value::None);
                }
                let mut acc = a[0].clone();
                let n = a.len();
                for (i, item) in a.iter().enumerate().skip(1) {
                    let piece = if i + 1 == n { last.clone().or_else(|| sep.clone()) } else { sep.clone() };
                    if let Some(piece) = piece {
                        acc = crate::ops::join(acc, piece).at(span)?;
                    }
                    acc = crate::ops::join(acc, item.clone()).at(span)?;
                }
                Ok(acc)
            })
        }
        "sorted" => {
            let a = a.clone();
            native("sorted", move |vm, mut args, span| {
                let key = pop_named(&mut args, "key").and_then(|v| match v {
                    Value::Func(f) => Some(f),
                    _ => None,
                });
                let mut projected: Vec<(Value, Value)> = Vec::with_capacity(a.len());
                for item in &a {
                    let k = match &key {
                        Some(f) => {
                            let mut call_args = Arguments::new(span);
                            call_args.push_positional(item.clone());
                            f.call(vm, call_args, span)?
                        }
                        None => item.clone(),
                    };
                    projected.push((k, item.clone()));
                }
                let mut error = None;
                projected.sort_by(|(ka, _), (kb, _)| match compare(ka, kb) {
                    Some(ord) => ord,
                    None => {
                        error = Some(eco_format!("cannot order {} and {}", ka.ty(), kb.ty()));
                        std::cmp::Ordering::Equal
                    }
                });
                if let Some(e) = error {
                    return Err(e).at(span);
                }
                Ok(Value::Array(projected.into_iter().map(|(_, v)| v).collect()))
            })
        }
        "zip" => {
            let a = a.clone();
            native("zip", move |_, mut args, span| {
                let other = match expect_arg(&mut args, "other", span)? {
                    Value::Array(items) => items,
                    other => crate::bail!(span, "expected array, found {}", other.ty()),
                };
                Ok(Value::Array(
                    a.iter().zip(other.iter()).map(|(x, y)| Value::Array(vec![x.clone(), y.clone()])).collect(),
                ))
            })
        }
        "sum" => {
            let a = a.clone();
            native("sum", move |_, mut args, span| {
                let default = pop_named(&mut args, "default");
                let mut items = a.iter().cloned();
                let mut acc = match items.next() {
                    Some(first) => first,
                    None => return default.ok_or_else(|| eco_format!("cannot sum an empty array")).at(span),
                };
                for item in items {
                    acc = crate::ops::add(acc, item).at(span)?;
                }
                Ok(acc)
            })
        }
        "product" => {
            let a = a.clone();
            native("product", move |_, mut args, span| {
                let default = pop_named(&mut args, "default");
                let mut items = a.iter().cloned();
                let mut acc = match items.next() {
                    Some(first) => first,
                    None => return default.ok_or_else(|| eco_format!("cannot take the product of an empty array")).at(span),
                };
                for item in items {
                    acc = crate::ops::mul(acc, item).at(span)?;
                }
                Ok(acc)
            })
        }
        _ => return None,
    })
}

fn call_bool(vm: &mut Vm, f: &Func, arg: Value, span: Span) -> SourceResult<bool> {
    let mut args = Arguments::new(span);
    args.push_positional(arg);
    match f.call(vm, args, span)? {
        Value::Bool(b) => Ok(b),
        other => Err(eco_format!("expected boolean, found {}", other.ty())).at(span),
    }
}

// ----------------------------------------------------------------- Dict

fn dict_method(d: Dict, field: &str) -> Option<Func> {
    Some(match field {
        "len" => {
            let d = d.clone();
            native("len", move |_, _, _| Ok(Value::Int(d.len() as i64)))
        }
        "at" => {
            let d = d.clone();
            native("at", move |_, mut args, span| {
                let key = expect_str(&mut args, "key", span)?;
                let default = pop_named(&mut args, "default");
                match d.get(key.as_str()) {
                    Some(v) => Ok(v.clone()),
                    None => default.ok_or_else(|| eco_format!("dictionary does not contain key {key:?}")).at(span),
                }
            })
        }
        "keys" => {
            let d = d.clone();
            native("keys", move |_, _, _| Ok(Value::Array(d.keys().map(|k| Value::Str(k.clone())).collect())))
        }
        "values" => {
            let d = d.clone();
            native("values", move |_, _, _| Ok(Value::Array(d.values().cloned().collect())))
        }
        "pairs" => {
            let d = d.clone();
            native("pairs", move |_, _, _| {
                Ok(Value::Array(d.iter().map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()])).collect()))
            })
        }
        _ => return None,
    })
}

// -------------------------------------------------------------- Content

fn collect_text(content: &Content, out: &mut String) {
    for node in &content.0 {
        match node {
            ContentNode::Txt(t) => out.push_str(t),
            ContentNode::Elt(elt) => {
                for value in elt.fields.values() {
                    if let Value::Content(inner) = value {
                        collect_text(inner, out);
                    }
                }
            }
        }
    }
}

fn content_method(c: Content, field: &str) -> Option<Func> {
    Some(match field {
        "func" => {
            let c = c.clone();
            native("func", move |_, _, span| match c.0.first() {
                Some(ContentNode::Elt(elt)) => Ok(Value::Str(elt.name.clone())),
                _ => crate::bail!(span, "text content has no associated function"),
            })
        }
        "has" => {
            let c = c.clone();
            native("has", move |_, mut args, span| {
                let key = expect_str(&mut args, "field", span)?;
                Ok(Value::Bool(match c.0.first() {
                    Some(ContentNode::Elt(elt)) => elt.fields.contains_key(key.as_str()),
                    _ => false,
                }))
            })
        }
        "at" => {
            let c = c.clone();
            native("at", move |_, mut args, span| {
                let key = expect_str(&mut args, "field", span)?;
                let default = pop_named(&mut args, "default");
                match c.0.first() {
                    Some(ContentNode::Elt(elt)) => match elt.fields.get(key.as_str()) {
                        Some(v) => Ok(v.clone()),
                        None => default.ok_or_else(|| eco_format!("content does not contain field {key:?}")).at(span),
                    },
                    _ => default.ok_or_else(|| eco_format!("content does not contain field {key:?}")).at(span),
                }
            })
        }
        "text" => {
            let c = c.clone();
            native("text", move |_, _, _| {
                let mut out = String::new();
                collect_text(&c, &mut out);
                Ok(Value::Str(out.into()))
            })
        }
        "children" => {
            let c = c.clone();
            native("children", move |_, _, _| {
                Ok(Value::Array(c.0.iter().map(|n| Value::Content(Content(vec![n.clone()]))).collect()))
            })
        }
        _ => return None,
    })
}

// ------------------------------------------------------------- Counter

fn counter_method(c: Counter, field: &str) -> Option<Func> {
    Some(match field {
        "display" => {
            let key = c.key.clone();
            native("display", move |vm, _, _| Ok(Value::Int(*vm.counters.get(key.as_str()).unwrap_or(&0))))
        }
        "step" => {
            let key = c.key.clone();
            native("step", move |vm, _, _| {
                *vm.counters.entry(key.clone()).or_insert(0) += 1;
                Ok(Value::None)
            })
        }
        "update" => {
            let key = c.key.clone();
            native("update", move |vm, mut args, span| {
                match expect_arg(&mut args, "value", span)? {
                    Value::Int(n) => {
                        vm.counters.insert(key.clone(), n);
                    }
                    Value::Func(f) => {
                        let current = *vm.counters.get(key.as_str()).unwrap_or(&0);
                        let mut call_args = Arguments::new(span);
                        call_args.push_positional(Value::Int(current));
                        match f.call(vm, call_args, span)? {
                            Value::Int(n) => {
                                vm.counters.insert(key.clone(), n);
                            }
                            other => crate::bail!(span, "counter update function must return an integer, found {}", other.ty()),
                        }
                    }
                    other => crate::bail!(span, "expected integer or function, found {}", other.ty()),
                }
                Ok(Value::None)
            })
        }
        "at" | "final" => native(if field == "at" { "at" } else { "final" }, |_, _, span| {
            crate::bail!(span, "Counter.{} is not yet implemented", "at|final")
        }),
        _ => return None,
    })
}

// --------------------------------------------------------------- Color

fn color_method(c: Color, field: &str) -> Option<Func> {
    Some(match field {
        "darken" => native("darken", move |_, mut args, span| {
            let amount = expect_amount(&mut args, span)?;
            Ok(Value::Color(c.darken(amount)))
        }),
        "lighten" => native("lighten", move |_, mut args, span| {
            let amount = expect_amount(&mut args, span)?;
            Ok(Value::Color(c.lighten(amount)))
        }),
        "negate" => native("negate", move |_, _, _| Ok(Value::Color(c.negate()))),
        _ => return None,
    })
}

fn expect_amount(args: &mut Arguments, span: Span) -> SourceResult<f64> {
    match expect_arg(args, "amount", span)? {
        Value::Ratio(r) => Ok(r.0),
        Value::Float(f) => Ok(f),
        Value::Int(i) => Ok(i as f64),
        other => Err(eco_format!("expected ratio, found {}", other.ty())).at(span),
    }
}

// ------------------------------------------------------------- Function

fn function_method(f: Func, field: &str) -> Option<Func> {
    Some(match field {
        "with" => {
            let target = f.clone();
            native("with", move |_, args, _| {
                let target = target.clone();
                Ok(Value::Func(Func::native("with", move |inner_vm, call_args, call_span| {
                    let merged = Arguments::concat(args.clone(), call_args);
                    target.call(inner_vm, merged, call_span)
                })))
            })
        }
        "where" => {
            let f = f.clone();
            native("where", move |_, args, span| {
                let Some(name) = &f.element_name else {
                    crate::bail!(span, "`where()` can only be called on element functions");
                };
                Ok(Value::Selector(Selector::Element(name.clone(), args.named.into_iter().collect())))
            })
        }
        _ => return None,
    })
}

// ------------------------------------------------------------- Selector

fn selector_method(s: Selector, field: &str) -> Option<Func> {
    Some(match field {
        "or" => {
            let s = s.clone();
            native("or", move |_, mut args, span| {
                let other = crate::selector::to_selector(expect_arg(&mut args, "other", span)?).at(span)?;
                Ok(Value::Selector(Selector::Or(Box::new(s.clone()), Box::new(other))))
            })
        }
        "and" => {
            let s = s.clone();
            native("and", move |_, mut args, span| {
                let other = crate::selector::to_selector(expect_arg(&mut args, "other", span)?).at(span)?;
                Ok(Value::Selector(Selector::And(Box::new(s.clone()), Box::new(other))))
            })
        }
        "before" => {
            let s = s.clone();
            native("before", move |_, mut args, span| {
                let other = crate::selector::to_selector(expect_arg(&mut args, "other", span)?).at(span)?;
                Ok(Value::Selector(Selector::Before(Box::new(s.clone()), Box::new(other))))
            })
        }
        "after" => {
            let s = s.clone();
            native("after", move |_, mut args, span| {
                let other = crate::selector::to_selector(expect_arg(&mut args, "other", span)?).at(span)?;
                Ok(Value::Selector(Selector::After(Box::new(s.clone()), Box::new(other))))
            })
        }
        _ => return None,
    })
}

// ------------------------------------------------------------ Arguments

fn arguments_method(a: Arguments, field: &str) -> Option<Func> {
    Some(match field {
        "pos" => {
            let a = a.clone();
            native("pos", move |_, _, _| Ok(Value::Array(a.positional.clone())))
        }
        "named" => {
            let a = a.clone();
            native("named", move |_, _, _| {
                Ok(Value::Dict(a.named.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<IndexMap<_, _>>()))
            })
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_vm, NoHost};
    use crate::value::values_equal;

    fn call(vm: &mut Vm, f: &Func, positional: Vec<Value>, named: Vec<(&str, Value)>) -> SourceResult<Value> {
        let span = Span::detached();
        let mut args = Arguments::new(span);
        for v in positional {
            args.push_positional(v);
        }
        for (k, v) in named {
            args.push_named(k.into(), v);
        }
        f.call(vm, args, span)
    }

    fn assert_value_eq(actual: &Value, expected: &Value) {
        assert!(values_equal(actual, expected), "expected {}, got {}", expected.repr(), actual.repr());
    }

    #[test]
    fn test_string_slice_clamps_and_uses_codepoint_indices() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let f = string_method("héllo".into(), "slice").unwrap();
        let result = call(&mut vm, &f, vec![Value::Int(1), Value::Int(3)], vec![]).unwrap();
        assert_value_eq(&result, &Value::Str("él".into()));
    }

    #[test]
    fn test_string_trim_with_explicit_pattern_and_no_repeat() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let f = string_method("aabfooaab".into(), "trim").unwrap();
        let result = call(&mut vm, &f, vec![Value::Str("ab".into())], vec![("repeat", Value::Bool(false))]).unwrap();
        assert_value_eq(&result, &Value::Str("afooaa".into()));
    }

    #[test]
    fn test_string_replace_honors_count_and_function_replacement() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let f = string_method("a.b.c.d".into(), "replace").unwrap();
        let result = call(
            &mut vm,
            &f,
            vec![Value::Str(".".into()), Value::Str("-".into())],
            vec![("count", Value::Int(2))],
        )
        .unwrap();
        assert_value_eq(&result, &Value::Str("a-b-c.d".into()));
    }

    #[test]
    fn test_string_clusters_counts_graphemes_not_codepoints() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        // a single letter plus a combining accent is one cluster, two codepoints
        let f = string_method("e\u{0301}".into(), "clusters").unwrap();
        let result = call(&mut vm, &f, vec![], vec![]).unwrap();
        assert_value_eq(&result, &Value::Array(vec![Value::Str("e\u{0301}".into())]));

        let g = string_method("e\u{0301}".into(), "codepoints").unwrap();
        let result = call(&mut vm, &g, vec![], vec![]).unwrap();
        let Value::Array(items) = result else { panic!("expected an array") };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_array_map_and_filter_and_fold() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let double = Func::native("double", |_, args, span| match &args.positional[0] {
            Value::Int(n) => Ok(Value::Int(n * 2)),
            other => Err(eco_format!("expected int, found {}", other.ty())).at(span),
        });
        let is_even = Func::native("is_even", |_, args, span| match &args.positional[0] {
            Value::Int(n) => Ok(Value::Bool(n % 2 == 0)),
            other => Err(eco_format!("expected int, found {}", other.ty())).at(span),
        });
        let add = Func::native("add", |_, args, span| match (&args.positional[0], &args.positional[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (a, _) => Err(eco_format!("expected int, found {}", a.ty())).at(span),
        });

        let a: Array = vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)];

        let mapped = call(&mut vm, &array_method(a.clone(), "map").unwrap(), vec![Value::Func(double)], vec![]).unwrap();
        assert_value_eq(&mapped, &Value::Array(vec![Value::Int(2), Value::Int(4), Value::Int(6), Value::Int(8)]));

        let filtered = call(&mut vm, &array_method(a.clone(), "filter").unwrap(), vec![Value::Func(is_even)], vec![]).unwrap();
        assert_value_eq(&filtered, &Value::Array(vec![Value::Int(2), Value::Int(4)]));

        let folded = call(&mut vm, &array_method(a.clone(), "fold").unwrap(), vec![Value::Int(0), Value::Func(add)], vec![]).unwrap();
        assert_value_eq(&folded, &Value::Int(10));
    }

    #[test]
    fn test_array_sorted_with_key_function() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let neg = Func::native("neg", |_, args, span| match &args.positional[0] {
            Value::Int(n) => Ok(Value::Int(-n)),
            other => Err(eco_format!("expected int, found {}", other.ty())).at(span),
        });
        let a: Array = vec![Value::Int(1), Value::Int(3), Value::Int(2)];
        let result = call(&mut vm, &array_method(a, "sorted").unwrap(), vec![], vec![("key", Value::Func(neg))]).unwrap();
        assert_value_eq(&result, &Value::Array(vec![Value::Int(3), Value::Int(2), Value::Int(1)]));
    }

    #[test]
    fn test_array_sum_and_product_with_default_on_empty() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let empty: Array = Vec::new();
        let sum = call(&mut vm, &array_method(empty.clone(), "sum").unwrap(), vec![], vec![("default", Value::Int(0))]).unwrap();
        assert_value_eq(&sum, &Value::Int(0));
        let product = call(&mut vm, &array_method(empty, "product").unwrap(), vec![], vec![("default", Value::Int(1))]).unwrap();
        assert_value_eq(&product, &Value::Int(1));

        let a: Array = vec![Value::Int(2), Value::Int(3), Value::Int(4)];
        let sum = call(&mut vm, &array_method(a.clone(), "sum").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&sum, &Value::Int(9));
        let product = call(&mut vm, &array_method(a, "product").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&product, &Value::Int(24));
    }

    #[test]
    fn test_array_zip_and_enumerate_and_flatten() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let a: Array = vec![Value::Int(1), Value::Int(2)];
        let b: Array = vec![Value::Str("a".into()), Value::Str("b".into())];
        let zipped = call(&mut vm, &array_method(a.clone(), "zip").unwrap(), vec![Value::Array(b)], vec![]).unwrap();
        assert_value_eq(
            &zipped,
            &Value::Array(vec![
                Value::Array(vec![Value::Int(1), Value::Str("a".into())]),
                Value::Array(vec![Value::Int(2), Value::Str("b".into())]),
            ]),
        );

        let enumerated = call(&mut vm, &array_method(a, "enumerate").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(
            &enumerated,
            &Value::Array(vec![
                Value::Array(vec![Value::Int(0), Value::Int(1)]),
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
            ]),
        );

        let nested: Array = vec![Value::Array(vec![Value::Int(1), Value::Int(2)]), Value::Int(3)];
        let flat = call(&mut vm, &array_method(nested, "flatten").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&flat, &Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn test_dict_at_keys_values_pairs() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let mut d = Dict::new();
        d.insert("a".into(), Value::Int(1));
        d.insert("b".into(), Value::Int(2));

        let at = call(&mut vm, &dict_method(d.clone(), "at").unwrap(), vec![Value::Str("a".into())], vec![]).unwrap();
        assert_value_eq(&at, &Value::Int(1));

        let missing = call(
            &mut vm,
            &dict_method(d.clone(), "at").unwrap(),
            vec![Value::Str("z".into())],
            vec![("default", Value::Int(-1))],
        )
        .unwrap();
        assert_value_eq(&missing, &Value::Int(-1));

        let keys = call(&mut vm, &dict_method(d.clone(), "keys").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&keys, &Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())]));

        let values = call(&mut vm, &dict_method(d.clone(), "values").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&values, &Value::Array(vec![Value::Int(1), Value::Int(2)]));

        let pairs = call(&mut vm, &dict_method(d, "pairs").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(
            &pairs,
            &Value::Array(vec![
                Value::Array(vec![Value::Str("a".into()), Value::Int(1)]),
                Value::Array(vec![Value::Str("b".into()), Value::Int(2)]),
            ]),
        );
    }

    #[test]
    fn test_color_darken_lighten_negate_through_method_dispatch() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let c = Color::Rgb { r: 200, g: 100, b: 50, a: 255 };
        let darker = call(&mut vm, &color_method(c, "darken").unwrap(), vec![Value::Float(0.5)], vec![]).unwrap();
        assert_eq!(darker.repr(), Value::Color(c.darken(0.5)).repr());
        let negated = call(&mut vm, &color_method(c, "negate").unwrap(), vec![], vec![]).unwrap();
        assert_eq!(negated.repr(), Value::Color(c.negate()).repr());
    }

    #[test]
    fn test_counter_display_step_and_update_with_function() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let counter = Counter { key: "page".into() };

        let zero = call(&mut vm, &counter_method(counter.clone(), "display").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&zero, &Value::Int(0));

        call(&mut vm, &counter_method(counter.clone(), "step").unwrap(), vec![], vec![]).unwrap();
        call(&mut vm, &counter_method(counter.clone(), "step").unwrap(), vec![], vec![]).unwrap();
        let after_steps = call(&mut vm, &counter_method(counter.clone(), "display").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&after_steps, &Value::Int(2));

        let incr = Func::native("incr", |_, args, span| match &args.positional[0] {
            Value::Int(n) => Ok(Value::Int(n + 10)),
            other => Err(eco_format!("expected int, found {}", other.ty())).at(span),
        });
        call(&mut vm, &counter_method(counter.clone(), "update").unwrap(), vec![Value::Func(incr)], vec![]).unwrap();
        let after_update = call(&mut vm, &counter_method(counter.clone(), "display").unwrap(), vec![], vec![]).unwrap();
        assert_value_eq(&after_update, &Value::Int(12));
    }

    #[test]
    fn test_counter_at_and_final_are_not_yet_implemented() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let counter = Counter { key: "page".into() };
        let err = call(&mut vm, &counter_method(counter.clone(), "at").unwrap(), vec![Value::Int(0)], vec![]).unwrap_err();
        assert!(err[0].message.contains("not yet implemented"));
        let err = call(&mut vm, &counter_method(counter, "final").unwrap(), vec![], vec![]).unwrap_err();
        assert!(err[0].message.contains("not yet implemented"));
    }
}
