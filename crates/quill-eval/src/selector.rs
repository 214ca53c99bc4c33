//! Selector conversion, `toSelector` (spec.md §4.2).
//!
//! Matching a selector against a content node is the show-rule
//! matcher's job, an external collaborator (spec.md §4.4) — this
//! evaluator only constructs selector values and a simplified
//! in-crate matcher good enough to drive its own show-rule engine
//! (see [`crate::rules`]).

use crate::diag::StrResult;
use crate::value::{Selector, Value};

/// Convert a value used in selector position (the target of `show
/// selector: ..` or a combinator method) into a [`Selector`].
pub fn to_selector(value: Value) -> StrResult<Selector> {
    match value {
        Value::Selector(s) => Ok(s),
        Value::Func(f) => match f.element_name {
            Some(name) => Ok(Selector::Element(name, Vec::new())),
            None => Err("only element functions can be used as selectors".into()),
        },
        Value::Str(s) => Ok(Selector::Str(s)),
        Value::Regex(r) => Ok(Selector::Regex(r)),
        Value::Label(l) => Ok(Selector::Label(l.0)),
        Value::Symbol(s) => Ok(Selector::Str(s.text)),
        other => Err(ecow::eco_format!("cannot convert {} to a selector", other.ty())),
    }
}
