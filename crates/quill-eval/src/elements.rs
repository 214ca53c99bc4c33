//! A minimal stand-in for the (out-of-scope, externally supplied)
//! standard library, providing just the element-constructing
//! identifiers the content evaluator's markup-to-content mapping
//! calls by name (spec.md §4.1, §6 "Standard library contract").
//!
//! Each of these is an ordinary `Function` with `element_name` set,
//! so `set`/`show` still apply to it exactly as they would to a
//! richer, externally supplied implementation — a real integration is
//! expected to preload a fuller map over (or instead of) this one.

use ecow::{eco_format, EcoString};
use indexmap::IndexMap;

use crate::scope::Scopes;
use crate::value::{Content, ContentNode, Elt, Func, Value};

const NAMES: &[&str] = &[
    "text",
    "parbreak",
    "linebreak",
    "emph",
    "strong",
    "raw",
    "heading",
    "equation",
    "frac",
    "attach",
    "math.lr",
    "alignpoint",
    "ref",
    "list",
    "enum",
    "terms",
    "link",
    "accent",
];

/// Install the builtin element set into the root scope.
pub fn install(scopes: &mut Scopes) {
    for &name in NAMES {
        scopes.bind(EcoString::from(name), Value::Func(Func::element(name, identity_body(name.into()))));
    }
}

/// The default body every builtin element gets: package the call's
/// arguments straight into an `Elt` node under `name`. Positional
/// arguments (there are none in this evaluator's own call sites, which
/// only ever use named fields, but a caller-supplied `set`/direct call
/// could still pass some) land under numbered keys.
fn identity_body(
    name: EcoString,
) -> impl Fn(&mut crate::vm::Vm, crate::value::Arguments, quill_syntax::Span) -> crate::diag::SourceResult<Value> {
    move |_vm, args, _span| {
        let mut fields = IndexMap::new();
        for (i, v) in args.positional.into_iter().enumerate() {
            fields.insert(eco_format!("_{i}"), v);
        }
        for (k, v) in args.named {
            fields.insert(k, v);
        }
        Ok(Value::Content(Content(vec![ContentNode::Elt(Elt {
            name: name.clone(),
            label: None,
            fields,
        })])))
    }
}
