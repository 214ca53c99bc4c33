//! Destructuring binds (spec.md §4.2 `Let(DestructuringBind, ..)`).

use std::collections::HashSet;

use ecow::eco_format;

use quill_syntax::ast::{DestructPart, Pattern};
use quill_syntax::Span;

use crate::diag::{At, SourceResult};
use crate::value::{Array, Dict, Value};
use crate::vm::Vm;

/// Bind `value` against `pattern`, inserting every named part into the
/// innermost scope frame (spec.md §4.2, §4.6 step 7).
pub fn bind_pattern(vm: &mut Vm, pattern: &Pattern, value: Value) -> SourceResult<()> {
    match pattern {
        Pattern::Normal(ident) => {
            vm.define(ident.name.clone(), ident.span, value);
            Ok(())
        }
        Pattern::Placeholder(_) => Ok(()),
        Pattern::Destructuring(parts) => match value {
            Value::Array(array) => bind_array(vm, parts, array, pattern.span()),
            Value::Dict(dict) => bind_dict(vm, parts, dict, pattern.span()),
            other => crate::bail!(pattern.span(), "cannot destructure {}", other.ty()),
        },
    }
}

fn bind_array(vm: &mut Vm, parts: &[DestructPart], array: Array, span: Span) -> SourceResult<()> {
    let len = array.len();
    let mut i = 0usize;

    for part in parts {
        match part {
            DestructPart::Pattern(p) => {
                let Some(v) = array.get(i) else {
                    return Err(vec![wrong_count(parts, len, span)]);
                };
                bind_pattern(vm, p, v.clone())?;
                i += 1;
            }
            DestructPart::Spread(name, sink_span) => {
                let sink_size = (1 + len).checked_sub(parts.len());
                let sink = sink_size.and_then(|s| array.get(i..i + s));
                let (Some(sink_size), Some(sink)) = (sink_size, sink) else {
                    return Err(vec![wrong_count(parts, len, span)]);
                };
                if let Some(name) = name {
                    vm.define(name.name.clone(), *sink_span, Value::Array(sink.to_vec()));
                }
                i += sink_size;
            }
            DestructPart::Named(ident, _) => {
                crate::bail!(ident.span, "cannot destructure named pattern from an array");
            }
        }
    }

    if i < len {
        return Err(vec![wrong_count(parts, len, span)]);
    }
    Ok(())
}

fn bind_dict(vm: &mut Vm, parts: &[DestructPart], dict: Dict, span: Span) -> SourceResult<()> {
    let mut sink: Option<&quill_syntax::ast::Ident> = None;
    let mut used = HashSet::new();

    for part in parts {
        match part {
            DestructPart::Pattern(Pattern::Normal(ident)) => {
                let v = dict
                    .get(ident.as_str())
                    .ok_or_else(|| eco_format!("dictionary does not contain key {:?}", ident.as_str()))
                    .at(ident.span)?;
                vm.define(ident.name.clone(), ident.span, v.clone());
                used.insert(ident.name.clone());
            }
            DestructPart::Named(ident, pattern) => {
                let v = dict
                    .get(ident.as_str())
                    .ok_or_else(|| eco_format!("dictionary does not contain key {:?}", ident.as_str()))
                    .at(ident.span)?;
                bind_pattern(vm, pattern, v.clone())?;
                used.insert(ident.name.clone());
            }
            DestructPart::Spread(name, _) => {
                sink = name.as_ref();
            }
            DestructPart::Pattern(other) => {
                crate::bail!(other.span(), "cannot destructure unnamed pattern from a dictionary");
            }
        }
    }

    if let Some(sink_name) = sink {
        let mut rest = Dict::new();
        for (key, value) in dict {
            if !used.contains(&key) {
                rest.insert(key, value);
            }
        }
        vm.define(sink_name.name.clone(), sink_name.span, Value::Dict(rest));
    }

    let _ = span;
    Ok(())
}


fn wrong_count(parts: &[DestructPart], len: usize, span: Span) -> crate::diag::SourceDiagnostic {
    let has_spread = parts.iter().any(|p| matches!(p, DestructPart::Spread(..)));
    let count = parts.iter().filter(|p| matches!(p, DestructPart::Pattern(_))).count();
    let quantifier = if len > count { "too many" } else { "not enough" };
    let expected = if has_spread {
        eco_format!("at least {count} elements")
    } else {
        eco_format!("{count} elements")
    };
    crate::error!(span, "{quantifier} elements to destructure"; hint: "the provided array has a length of {len}, but the pattern expects {expected}")[0].clone()
}
