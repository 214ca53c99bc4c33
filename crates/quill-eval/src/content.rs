//! The content evaluator (spec.md §4.1): turns a `Markup` stream into
//! a `Content` sequence, handling smart quotes, the markup-to-element
//! mapping table, greedy list-item grouping, and text collapsing.

use ecow::EcoString;
use quill_syntax::ast::{MarkupKind, MarkupNode};
use quill_syntax::Span;

use crate::diag::SourceResult;
use crate::scope::ScopeKind;
use crate::value::{Arguments, Content, ContentNode, Label, TermItem, Value};
use crate::vm::Vm;

/// `many(pContent) then eof`, with the `showRules` save/restore that
/// spec.md §3.5 attaches to each "inner contents" evaluation.
pub fn eval_markup(vm: &mut Vm, markup: &[MarkupNode]) -> SourceResult<Content> {
    let rules_len = vm.rules.len();
    let styles_mark = vm.styles.mark();
    let span = markup.first().map(|n| n.span).unwrap_or_else(Span::detached);
    let result = eval_markup_inner(vm, markup).and_then(|content| crate::rules::apply_global_show_rules(vm, content, span));
    vm.rules.truncate(rules_len);
    vm.styles.truncate(styles_mark);
    result
}

fn eval_markup_inner(vm: &mut Vm, nodes: &[MarkupNode]) -> SourceResult<Content> {
    let mut produced = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let (content, consumed) = p_content(vm, nodes, i)?;
        produced.extend(content.0);
        i += consumed.max(1);
    }
    collapse_adjacent_text(vm, produced)
}

fn eval_single(vm: &mut Vm, node: &MarkupNode) -> SourceResult<Content> {
    eval_markup(vm, &[node.clone()])
}

fn p_content(vm: &mut Vm, nodes: &[MarkupNode], i: usize) -> SourceResult<(Content, usize)> {
    let span = nodes[i].span;
    let (raw, consumed) = if is_text_atom(&nodes[i].kind) {
        p_txt(nodes, i, vm.math)
    } else {
        p_elt(vm, nodes, i)?
    };
    let shown = crate::rules::apply_show_rules(vm, raw, span)?;
    Ok((shown, consumed))
}

fn is_text_atom(kind: &MarkupKind) -> bool {
    matches!(
        kind,
        MarkupKind::Text(_)
            | MarkupKind::Space
            | MarkupKind::SoftBreak
            | MarkupKind::Nbsp
            | MarkupKind::Shy
            | MarkupKind::EmDash
            | MarkupKind::EnDash
            | MarkupKind::Ellipsis
            | MarkupKind::Quote(_)
    )
}

fn text_run_len(nodes: &[MarkupNode], start: usize, math: bool) -> usize {
    if math {
        return 1;
    }
    nodes[start..].iter().take_while(|n| is_text_atom(&n.kind)).count().max(1)
}

/// Consume a run of text-like atoms (one atom only in math mode) and
/// apply smart-quote rewriting (spec.md §4.1).
fn p_txt(nodes: &[MarkupNode], start: usize, math: bool) -> (Content, usize) {
    let run_len = text_run_len(nodes, start, math);
    let atoms = &nodes[start..start + run_len];
    let mut text = String::new();
    for (j, node) in atoms.iter().enumerate() {
        match &node.kind {
            MarkupKind::Quote(c) => text.push_str(resolve_quote(*c, atoms, j)),
            MarkupKind::Text(s) => text.push_str(s),
            MarkupKind::Space => text.push(' '),
            MarkupKind::SoftBreak => text.push('\n'),
            MarkupKind::Nbsp => text.push('\u{00A0}'),
            MarkupKind::Shy => text.push('\u{00AD}'),
            MarkupKind::EmDash => text.push('\u{2014}'),
            MarkupKind::EnDash => text.push('\u{2013}'),
            MarkupKind::Ellipsis => text.push('\u{2026}'),
            _ => unreachable!("non-text atom inside a text run"),
        }
    }
    (Content(vec![ContentNode::Txt(EcoString::from(text))]), run_len)
}

const CLOSER_PUNCT: &[char] = &[')', '.', ',', ';', ':', '?', '!', ']'];

fn is_space_like(kind: &MarkupKind) -> bool {
    matches!(kind, MarkupKind::Space | MarkupKind::SoftBreak)
}

fn opening(c: char) -> &'static str {
    if c == '"' { "\u{201C}" } else { "\u{2018}" }
}

fn closing(c: char) -> &'static str {
    if c == '"' { "\u{201D}" } else { "\u{2019}" }
}

/// Decide what a single `Quote` atom renders as, given its neighbors
/// in the current run (spec.md §4.1's smart-quote priority chain).
fn resolve_quote(c: char, atoms: &[MarkupNode], j: usize) -> &'static str {
    let prev = (j > 0).then(|| &atoms[j - 1].kind);
    let next = (j + 1 < atoms.len()).then(|| &atoms[j + 1].kind);

    if prev.is_some_and(is_space_like) {
        return closing(c);
    }
    if next.is_some_and(is_space_like) {
        return closing(c);
    }
    let between_text = matches!(prev, Some(MarkupKind::Text(_))) && matches!(next, Some(MarkupKind::Text(_)));
    if between_text && c == '\'' {
        return "\u{2019}";
    }
    if let Some(MarkupKind::Text(t)) = next {
        if !t.chars().next().is_some_and(|ch| CLOSER_PUNCT.contains(&ch)) {
            return opening(c);
        }
    }
    closing(c)
}

fn is_list_break(kind: &MarkupKind) -> bool {
    matches!(kind, MarkupKind::SoftBreak)
}

/// Invoke a builtin element by name with named arguments, converting
/// its result back to content (spec.md §4.3).
fn elt(vm: &mut Vm, name: &str, fields: Vec<(&str, Value)>, span: Span) -> SourceResult<Content> {
    let mut args = Arguments::new(span);
    for (k, v) in fields {
        args.push_named(EcoString::from(k), v);
    }
    let result = crate::call::construct_element(vm, name, args, span)?;
    Ok(value_to_content(&result))
}

fn p_elt(vm: &mut Vm, nodes: &[MarkupNode], i: usize) -> SourceResult<(Content, usize)> {
    match &nodes[i].kind {
        MarkupKind::BulletListItem(_) => return p_bullet_list(vm, nodes, i),
        MarkupKind::EnumListItem { .. } => return p_enum_list(vm, nodes, i),
        MarkupKind::DescListItem { .. } => return p_desc_list(vm, nodes, i),
        _ => {}
    }

    let span = nodes[i].span;
    let content = match &nodes[i].kind {
        MarkupKind::ParBreak => elt(vm, "parbreak", vec![], span)?,
        MarkupKind::HardBreak => elt(vm, "linebreak", vec![], span)?,
        MarkupKind::Comment => Content(Vec::new()),
        MarkupKind::Code(_pos, expr) => {
            let value = crate::code::eval_expr(vm, expr)?;
            value_to_content(&value)
        }
        MarkupKind::Emph(body) => {
            let inner = eval_markup(vm, body)?;
            elt(vm, "emph", vec![("body", Value::Content(inner))], span)?
        }
        MarkupKind::Strong(body) => {
            let inner = eval_markup(vm, body)?;
            elt(vm, "strong", vec![("body", Value::Content(inner))], span)?
        }
        MarkupKind::Bracketed(body) => {
            let inner = eval_markup(vm, body)?;
            let mut out = vec![ContentNode::Txt(EcoString::from("["))];
            out.extend(inner.0);
            out.push(ContentNode::Txt(EcoString::from("]")));
            Content(out)
        }
        MarkupKind::RawBlock { lang, text } => {
            let lang_value = if lang.is_empty() { Value::None } else { Value::Str(lang.clone()) };
            elt(
                vm,
                "raw",
                vec![("text", Value::Str(text.clone())), ("block", Value::Bool(true)), ("lang", lang_value)],
                span,
            )?
        }
        MarkupKind::RawInline(text) => elt(
            vm,
            "raw",
            vec![("text", Value::Str(text.clone())), ("block", Value::Bool(false)), ("lang", Value::None)],
            span,
        )?,
        MarkupKind::Heading { level, body } => {
            let inner = eval_markup(vm, body)?;
            elt(vm, "heading", vec![("body", Value::Content(inner)), ("level", Value::Int(*level as i64))], span)?
        }
        MarkupKind::Equation { display, body } => {
            let saved_math = vm.math;
            vm.math = true;
            vm.scopes.enter(ScopeKind::Block);
            let inner = eval_markup(vm, body);
            vm.scopes.exit();
            vm.math = saved_math;
            let inner = inner?;
            elt(
                vm,
                "equation",
                vec![("body", Value::Content(inner)), ("block", Value::Bool(*display)), ("numbering", Value::None)],
                span,
            )?
        }
        MarkupKind::MFrac { num, den } => {
            let num_content = frac_operand(vm, num)?;
            let den_content = frac_operand(vm, den)?;
            elt(vm, "frac", vec![("num", Value::Content(num_content)), ("den", Value::Content(den_content))], span)?
        }
        MarkupKind::MAttach { base, bottom, top } => {
            let base_c = eval_single(vm, base)?;
            let bottom_v = match bottom {
                Some(n) => Value::Content(eval_single(vm, n)?),
                None => Value::None,
            };
            let top_v = match top {
                Some(n) => Value::Content(eval_single(vm, n)?),
                None => Value::None,
            };
            elt(vm, "attach", vec![("base", Value::Content(base_c)), ("b", bottom_v), ("t", top_v)], span)?
        }
        MarkupKind::MGroup { open, close, body } => {
            let inner = eval_markup(vm, body)?;
            match (open, close) {
                (Some(o), Some(c)) => {
                    let mut wrapped = vec![ContentNode::Txt(EcoString::from(o.to_string()))];
                    wrapped.extend(inner.0);
                    wrapped.push(ContentNode::Txt(EcoString::from(c.to_string())));
                    elt(vm, "math.lr", vec![("body", Value::Content(Content(wrapped)))], span)?
                }
                _ => {
                    let mut out = Vec::new();
                    if let Some(o) = open {
                        out.push(ContentNode::Txt(EcoString::from(o.to_string())));
                    }
                    out.extend(inner.0);
                    if let Some(c) = close {
                        out.push(ContentNode::Txt(EcoString::from(c.to_string())));
                    }
                    Content(out)
                }
            }
        }
        MarkupKind::MAlignPoint => elt(vm, "alignpoint", vec![], span)?,
        MarkupKind::Ref { ident, supplement } => {
            let supp = match supplement {
                Some(expr) => crate::code::eval_expr(vm, expr)?,
                None => Value::None,
            };
            elt(vm, "ref", vec![("label", Value::Label(Label(ident.clone()))), ("supplement", supp)], span)?
        }
        MarkupKind::Url(t) => elt(
            vm,
            "link",
            vec![("target", Value::Str(t.clone())), ("body", Value::Content(Content(vec![ContentNode::Txt(t.clone())])))],
            span,
        )?,
        MarkupKind::BulletListItem(_) | MarkupKind::EnumListItem { .. } | MarkupKind::DescListItem { .. } => {
            unreachable!("handled above")
        }
    };
    Ok((content, 1))
}

fn frac_operand(vm: &mut Vm, node: &MarkupNode) -> SourceResult<Content> {
    if let MarkupKind::MGroup { open: Some('('), close: Some(')'), body } = &node.kind {
        eval_markup(vm, body)
    } else {
        eval_single(vm, node)
    }
}

fn p_bullet_list(vm: &mut Vm, nodes: &[MarkupNode], i: usize) -> SourceResult<(Content, usize)> {
    let span = nodes[i].span;
    let MarkupKind::BulletListItem(body) = &nodes[i].kind else { unreachable!() };
    let mut items = vec![Value::Content(eval_markup(vm, body)?)];
    let mut j = i + 1;
    loop {
        let mut k = j;
        while k < nodes.len() && is_list_break(&nodes[k].kind) {
            k += 1;
        }
        match nodes.get(k) {
            Some(MarkupNode { kind: MarkupKind::BulletListItem(body), .. }) => {
                items.push(Value::Content(eval_markup(vm, body)?));
                j = k + 1;
            }
            _ => break,
        }
    }
    Ok((elt(vm, "list", vec![("items", Value::Array(items))], span)?, j - i))
}

fn p_enum_list(vm: &mut Vm, nodes: &[MarkupNode], i: usize) -> SourceResult<(Content, usize)> {
    let span = nodes[i].span;
    let MarkupKind::EnumListItem { start, body } = &nodes[i].kind else { unreachable!() };
    let first_start = *start;
    let mut items = vec![Value::Content(eval_markup(vm, body)?)];
    let mut j = i + 1;
    loop {
        let mut k = j;
        while k < nodes.len() && is_list_break(&nodes[k].kind) {
            k += 1;
        }
        match nodes.get(k) {
            Some(MarkupNode { kind: MarkupKind::EnumListItem { body, .. }, .. }) => {
                items.push(Value::Content(eval_markup(vm, body)?));
                j = k + 1;
            }
            _ => break,
        }
    }
    let mut args = vec![("items", Value::Array(items))];
    if let Some(n) = first_start {
        args.push(("start", Value::Int(n as i64)));
    }
    Ok((elt(vm, "enum", args, span)?, j - i))
}

fn p_desc_list(vm: &mut Vm, nodes: &[MarkupNode], i: usize) -> SourceResult<(Content, usize)> {
    let span = nodes[i].span;
    let MarkupKind::DescListItem { term, descr } = &nodes[i].kind else { unreachable!() };
    let mut items = vec![Value::TermItem(TermItem { term: eval_markup(vm, term)?, descr: eval_markup(vm, descr)? })];
    let mut j = i + 1;
    loop {
        let mut k = j;
        while k < nodes.len() && is_list_break(&nodes[k].kind) {
            k += 1;
        }
        match nodes.get(k) {
            Some(MarkupNode { kind: MarkupKind::DescListItem { term, descr }, .. }) => {
                items.push(Value::TermItem(TermItem { term: eval_markup(vm, term)?, descr: eval_markup(vm, descr)? }));
                j = k + 1;
            }
            _ => break,
        }
    }
    Ok((elt(vm, "terms", vec![("items", Value::Array(items))], span)?, j - i))
}

/// Fold contiguous `Txt` runs through the `"text"` element constructor
/// and drop empties (spec.md §3.2, §4.1).
fn collapse_adjacent_text(vm: &mut Vm, produced: Vec<ContentNode>) -> SourceResult<Content> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < produced.len() {
        if let ContentNode::Txt(_) = &produced[i] {
            let mut merged = String::new();
            while let Some(ContentNode::Txt(s)) = produced.get(i) {
                merged.push_str(s);
                i += 1;
            }
            if !merged.is_empty() {
                let wrapped = elt(vm, "text", vec![("body", Value::Str(EcoString::from(merged)))], Span::detached())?;
                out.extend(wrapped.0);
            }
        } else {
            out.push(produced[i].clone());
            i += 1;
        }
    }
    Ok(Content(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mcode, mquote, mstrong, msoftbreak, mtext, new_vm, NoHost};

    fn text_bodies(content: &Content) -> Vec<&str> {
        content
            .0
            .iter()
            .filter_map(|node| match node {
                ContentNode::Elt(elt) if elt.name == "text" => match elt.fields.get("body") {
                    Some(Value::Str(s)) => Some(s.as_str()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_adjacent_text_atoms_collapse_into_one_text_element() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let markup = vec![mtext("hello"), crate::test_support::mspace(), mtext("world")];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["hello world"]);
    }

    #[test]
    fn test_strong_wraps_its_body_in_an_elt() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let markup = vec![mstrong(vec![mtext("hi")])];
        let content = eval_markup(&mut vm, &markup).unwrap();
        match &content.0[..] {
            [ContentNode::Elt(elt)] => {
                assert_eq!(elt.name, "strong");
                let Some(Value::Content(body)) = elt.fields.get("body") else { panic!("missing body") };
                assert_eq!(text_bodies(body), vec!["hi"]);
            }
            other => panic!("expected a single strong element, got {other:?}"),
        }
    }

    #[test]
    fn test_smart_quotes_pick_curly_variants_around_text() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let markup = vec![mtext("He said "), mquote('"'), mtext("hi"), mquote('"')];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["He said \u{201C}hi\u{201D}"]);
    }

    #[test]
    fn test_smart_single_quote_between_words_is_an_apostrophe() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let markup = vec![mtext("don"), mquote('\''), mtext("t")];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["don\u{2019}t"]);
    }

    #[test]
    fn test_math_mode_consumes_text_atoms_one_at_a_time() {
        // In math mode each text-like atom becomes its own "text" element
        // instead of merging into a run (spec.md §4.1).
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        vm.math = true;
        let markup = vec![mtext("x"), crate::test_support::mspace(), mtext("y")];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["x", " ", "y"]);
    }

    #[test]
    fn test_quote_next_to_space_is_a_closing_quote() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        // a quote atom immediately followed by whitespace reads as closing
        // even though it opens no prior quote — the priority chain checks
        // neighbors, not a matching-pair stack (spec.md §4.1).
        let markup = vec![mquote('"'), msoftbreak()];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["\u{201D}\n"]);
    }

    #[test]
    fn test_code_node_value_becomes_content() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let markup = vec![mcode(crate::test_support::lit_int(5))];
        let content = eval_markup(&mut vm, &markup).unwrap();
        assert_eq!(text_bodies(&content), vec!["5"]);
    }

    #[test]
    fn test_value_to_content_flattens_nested_arrays() {
        let value = Value::Array(vec![Value::Int(1), Value::Array(vec![Value::Int(2), Value::Int(3)])]);
        let content = value_to_content(&value);
        let texts: Vec<&str> = content
            .0
            .iter()
            .map(|n| match n {
                ContentNode::Txt(t) => t.as_str(),
                _ => panic!("expected a text node"),
            })
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_value_to_content_none_and_auto_are_empty() {
        assert!(value_to_content(&Value::None).0.is_empty());
        assert!(value_to_content(&Value::Auto).0.is_empty());
    }
}

/// `valToContent` (spec.md §4.5): total value-to-content coercion.
pub fn value_to_content(value: &Value) -> Content {
    match value {
        Value::Content(c) => c.clone(),
        Value::Str(s) => Content(vec![ContentNode::Txt(s.clone())]),
        Value::None | Value::Auto => Content(Vec::new()),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(value_to_content(item).0);
            }
            Content(out)
        }
        Value::Args(args) => {
            let mut out = Vec::new();
            for item in &args.positional {
                out.extend(value_to_content(item).0);
            }
            for (_, item) in &args.named {
                out.extend(value_to_content(item).0);
            }
            Content(out)
        }
        other => Content(vec![ContentNode::Txt(EcoString::from(other.repr()))]),
    }
}
