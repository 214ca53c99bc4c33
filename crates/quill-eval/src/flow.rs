//! Control-flow directive (spec.md §3.5, §4.2).

use quill_syntax::Span;

use crate::diag::SourceDiagnostic;
use crate::error;

/// A control-flow event currently in effect. `None` on [`crate::vm::Vm`]
/// means `Normal`.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    Break(Span),
    Continue(Span),
    /// `bool` marks whether the return happened conditionally (inside
    /// an `if`/`while`/`for` whose own flow must still propagate as a
    /// value rather than unwind further, spec.md §4.2 block rules).
    Return(Span, Option<crate::value::Value>, bool),
}

impl FlowEvent {
    pub fn forbidden(&self) -> SourceDiagnostic {
        match self {
            FlowEvent::Break(span) => error!(*span, "cannot break outside of loop")[0].clone(),
            FlowEvent::Continue(span) => error!(*span, "cannot continue outside of loop")[0].clone(),
            FlowEvent::Return(span, ..) => error!(*span, "cannot return outside of function")[0].clone(),
        }
    }
}
