//! The show-rule engine (spec.md §4.4).
//!
//! `applyShowRules` walks a content sequence and, for each node,
//! applies every currently active rule whose selector matches it,
//! newest rule first, substituting the transform's output in place.
//! The matcher itself — deciding whether a selector matches a node —
//! is explicitly an external collaborator's responsibility per
//! spec.md §4.4; what follows is this evaluator's own simplified
//! stand-in, just faithful enough to drive the rules it installs
//! itself. `Before`/`After` degrade to matching on their first operand
//! alone (see DESIGN.md) rather than reasoning about document order.

use quill_syntax::Span;

use crate::diag::{SourceResult, Tracepoint, Trace};
use crate::value::{Arguments, Content, ContentNode, Elt, Selector, Value};
use crate::vm::Vm;

#[derive(Clone)]
pub enum ShowTransform {
    Dynamic(crate::value::Func),
    Static(Content),
    /// `show selector: set ...` (spec.md §9 Open Question: "the
    /// treatment of show rules under Show Set is a deliberate
    /// pass-through stub in the source"). The `set` already took
    /// effect as a side effect of evaluating the show body; the rule
    /// itself contributes no rewrite and is kept only as the
    /// documented extension point a later style-cascade could hook.
    PassThrough,
}

#[derive(Clone)]
pub struct ShowRule {
    pub selector: Option<Selector>,
    pub transform: ShowTransform,
}

/// Whether `selector` matches a single content node. A best-effort,
/// in-crate stand-in for the external matcher (spec.md §4.4).
pub fn matches(selector: &Selector, node: &ContentNode) -> bool {
    match selector {
        Selector::Element(name, fields) => match node {
            ContentNode::Elt(elt) => {
                elt.name == *name
                    && fields.iter().all(|(k, v)| {
                        elt.fields.get(k).is_some_and(|existing| crate::value::values_equal(existing, v))
                    })
            }
            ContentNode::Txt(_) => false,
        },
        Selector::Str(needle) => match node {
            ContentNode::Txt(text) => text.contains(needle.as_str()),
            ContentNode::Elt(_) => false,
        },
        Selector::Regex(re) => match node {
            ContentNode::Txt(text) => re.is_match(text),
            ContentNode::Elt(_) => false,
        },
        Selector::Label(target) => match node {
            ContentNode::Elt(Elt { label: Some(label), .. }) => label == target,
            _ => false,
        },
        Selector::Or(a, b) => matches(a, node) || matches(b, node),
        Selector::And(a, b) => matches(a, node) && matches(b, node),
        Selector::Before(a, _) | Selector::After(a, _) => matches(a, node),
    }
}

/// Apply every active rule to each node of `content`, newest rule
/// first.
pub fn apply_show_rules(vm: &mut Vm, content: Content, span: Span) -> SourceResult<Content> {
    let mut out = Vec::with_capacity(content.0.len());
    for node in content.0 {
        out.extend(apply_to_node(vm, node, span)?.0);
    }
    Ok(Content(out))
}

fn apply_to_node(vm: &mut Vm, node: ContentNode, span: Span) -> SourceResult<Content> {
    let rules = vm.rules.clone();
    let mut current = Content(vec![node]);
    for rule in &rules {
        let Some(selector) = &rule.selector else { continue };
        if current.0.len() != 1 || !matches(selector, &current.0[0]) {
            continue;
        }
        current = apply_transform(vm, &rule.transform, current, span)?;
    }
    Ok(current)
}

fn apply_transform(vm: &mut Vm, transform: &ShowTransform, current: Content, span: Span) -> SourceResult<Content> {
    match transform {
        ShowTransform::PassThrough => Ok(current),
        ShowTransform::Static(replacement) => Ok(replacement.clone()),
        ShowTransform::Dynamic(func) => {
            let mut args = Arguments::new(span);
            args.push_positional(Value::Content(current));
            let result = func
                .call(vm, args, span)
                .trace(|| Tracepoint::Show(func.name().unwrap_or("content").into()), span)?;
            Ok(crate::content::value_to_content(&result))
        }
    }
}

/// Apply every active selector-less rule, newest-first, once to the
/// whole of `content` rather than node by node. A selector-less `show`
/// (`show: transform`) restyles everything from that point on in its
/// enclosing block, not individual matching fragments, so it cannot go
/// through [`apply_to_node`], which only ever sees one node selector
/// pairs at a time.
pub fn apply_global_show_rules(vm: &mut Vm, content: Content, span: Span) -> SourceResult<Content> {
    let rules: Vec<ShowRule> = vm.rules.iter().filter(|r| r.selector.is_none()).cloned().collect();
    let mut current = content;
    for rule in &rules {
        current = apply_transform(vm, &rule.transform, current, span)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoHost;
    use crate::value::Func;

    #[test]
    fn test_matches_str_selector_against_text_node() {
        let sel = Selector::Str("cat".into());
        assert!(matches(&sel, &ContentNode::Txt("a cat sat".into())));
        assert!(!matches(&sel, &ContentNode::Txt("a dog sat".into())));
    }

    #[test]
    fn test_matches_element_selector_checks_name_and_fields() {
        let mut fields = indexmap::IndexMap::new();
        fields.insert("level".into(), Value::Int(1));
        let node = ContentNode::Elt(Elt { name: "heading".into(), label: None, fields });

        assert!(matches(&Selector::Element("heading".into(), vec![]), &node));
        assert!(matches(&Selector::Element("heading".into(), vec![("level".into(), Value::Int(1))]), &node));
        assert!(!matches(&Selector::Element("heading".into(), vec![("level".into(), Value::Int(2))]), &node));
        assert!(!matches(&Selector::Element("paragraph".into(), vec![]), &node));
    }

    #[test]
    fn test_before_after_degrade_to_first_operand() {
        let a = Selector::Str("cat".into());
        let b = Selector::Str("dog".into());
        let before = Selector::Before(Box::new(a), Box::new(b));
        assert!(matches(&before, &ContentNode::Txt("cat".into())));
        assert!(!matches(&before, &ContentNode::Txt("dog".into())));
    }

    #[test]
    fn test_apply_show_rules_substitutes_static_replacement() {
        let mut host = NoHost;
        let mut vm = crate::test_support::new_vm(&mut host);
        vm.rules.push(ShowRule {
            selector: Some(Selector::Str("cat".into())),
            transform: ShowTransform::Static(Content(vec![ContentNode::Txt("dog".into())])),
        });
        let content = Content(vec![ContentNode::Txt("cat".into())]);
        let result = apply_show_rules(&mut vm, content, Span::detached()).unwrap();
        assert!(matches!(&result.0[..], [ContentNode::Txt(t)] if t == "dog"));
    }

    #[test]
    fn test_apply_show_rules_skips_non_matching_nodes() {
        let mut host = NoHost;
        let mut vm = crate::test_support::new_vm(&mut host);
        vm.rules.push(ShowRule {
            selector: Some(Selector::Str("cat".into())),
            transform: ShowTransform::Static(Content(vec![ContentNode::Txt("dog".into())])),
        });
        let content = Content(vec![ContentNode::Txt("bird".into())]);
        let result = apply_show_rules(&mut vm, content, Span::detached()).unwrap();
        assert!(matches!(&result.0[..], [ContentNode::Txt(t)] if t == "bird"));
    }

    #[test]
    fn test_apply_global_show_rules_ignores_selector_rules() {
        let mut host = NoHost;
        let mut vm = crate::test_support::new_vm(&mut host);
        vm.rules.push(ShowRule {
            selector: Some(Selector::Str("cat".into())),
            transform: ShowTransform::Static(Content(vec![ContentNode::Txt("dog".into())])),
        });
        vm.rules.push(ShowRule {
            selector: None,
            transform: ShowTransform::Dynamic(Func::native("double", |_, args, _span| {
                let Value::Content(c) = &args.positional[0] else { unreachable!() };
                let mut out = c.0.clone();
                out.extend(c.0.clone());
                Ok(Value::Content(Content(out)))
            })),
        });
        let content = Content(vec![ContentNode::Txt("hi".into())]);
        let result = apply_global_show_rules(&mut vm, content, Span::detached()).unwrap();
        assert_eq!(result.0.len(), 2);
    }
}
