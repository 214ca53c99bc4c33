//! Diagnostics.
//!
//! `SourceDiagnostic`/`SourceResult`, the `error!`/`bail!`/`warning!`
//! macros, and the `At`/`Trace` extension traits, scoped down to what
//! the core evaluator's error taxonomy actually needs.

use std::fmt::{self, Display, Formatter};

use ecow::{eco_format, EcoString};
use quill_syntax::Span;

/// An error or warning produced during evaluation. The recommended way
/// to create one is with the `error!`/`warning!` macros.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDiagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: EcoString,
    pub hints: Vec<EcoString>,
    pub trace: Vec<(Tracepoint, Span)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl SourceDiagnostic {
    pub fn error(span: Span, message: impl Into<EcoString>) -> Self {
        Self {
            severity: Severity::Error,
            span,
            message: message.into(),
            hints: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn warning(span: Span, message: impl Into<EcoString>) -> Self {
        Self {
            severity: Severity::Warning,
            span,
            message: message.into(),
            hints: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<EcoString>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn with_tracepoint(mut self, point: Tracepoint, span: Span) -> Self {
        self.trace.push((point, span));
        self
    }
}

impl Display for SourceDiagnostic {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A breadcrumb recorded as an error crosses a call, show-rule
/// application, or import boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracepoint {
    Call(Option<EcoString>),
    Show(EcoString),
    Import,
}

impl Display for Tracepoint {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Tracepoint::Call(Some(name)) => {
                write!(f, "error occurred in this call of function `{name}`")
            }
            Tracepoint::Call(None) => write!(f, "error occurred in this function call"),
            Tracepoint::Show(name) => {
                write!(f, "error occurred while applying show rule to this {name}")
            }
            Tracepoint::Import => write!(f, "error occurred while importing this module"),
        }
    }
}

/// A result that can carry multiple source errors — errors are fatal
/// here, so in practice only ever one, but kept as a vec so a future
/// best-effort evaluation mode could accumulate several.
pub type SourceResult<T> = Result<T, Vec<SourceDiagnostic>>;

/// A plain string error with no span yet attached.
pub type StrResult<T> = Result<T, EcoString>;

/// An output alongside any warnings generated while producing it.
#[derive(Debug, Clone)]
pub struct Warned<T> {
    pub output: T,
    pub warnings: Vec<SourceDiagnostic>,
}

/// Attach a span to a [`StrResult`], turning it into a [`SourceResult`].
pub trait At<T> {
    fn at(self, span: Span) -> SourceResult<T>;
}

impl<T, S> At<T> for Result<T, S>
where
    S: Into<EcoString>,
{
    fn at(self, span: Span) -> SourceResult<T> {
        self.map_err(|message| vec![SourceDiagnostic::error(span, message)])
    }
}

/// Add a hint to a [`StrResult`]-shaped error without yet attaching a span.
pub trait Hint<T> {
    fn hint(self, hint: impl Into<EcoString>) -> Self;
}

impl<T> Hint<T> for StrResult<T> {
    fn hint(self, _hint: impl Into<EcoString>) -> Self {
        // Plain `StrResult`s carry no hint storage; hints are attached
        // once a span is known, via `SourceDiagnostic::with_hint`.
        self
    }
}

/// Enrich a [`SourceResult`] with a tracepoint as it crosses a call,
/// show-rule application, or import boundary.
pub trait Trace<T> {
    fn trace<F>(self, make_point: F, span: Span) -> Self
    where
        F: Fn() -> Tracepoint;
}

impl<T> Trace<T> for SourceResult<T> {
    fn trace<F>(self, make_point: F, span: Span) -> Self
    where
        F: Fn() -> Tracepoint,
    {
        self.map_err(|errors| {
            errors
                .into_iter()
                .map(|error| {
                    // Skip traces that surround the error itself.
                    if span.surrounds(error.span) {
                        error
                    } else {
                        error.with_tracepoint(make_point(), span)
                    }
                })
                .collect()
        })
    }
}

/// Early-return with an error. `bail!(span, "msg {}", x)` returns a
/// [`SourceResult`]; `bail!("msg {}", x)` (no span) returns a
/// [`StrResult`]. Hints can be appended with `; hint: "...";`.
#[macro_export]
macro_rules! bail {
    ($span:expr, $fmt:literal $(, $arg:expr)* $(,)? $(; hint: $hint:literal $(, $hint_arg:expr)*)* $(;)?) => {
        return Err($crate::error!($span, $fmt $(, $arg)* $(; hint: $hint $(, $hint_arg)*)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err(ecow::eco_format!($fmt $(, $arg)*))
    };
}

/// Construct a [`SourceDiagnostic`] (with a span) or a plain `EcoString`
/// (without one) with severity `Error`.
#[macro_export]
macro_rules! error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        ecow::eco_format!($fmt $(, $arg)*)
    };
    ($span:expr, $fmt:literal $(, $arg:expr)* $(,)? $(; hint: $hint:literal $(, $hint_arg:expr)*)* $(;)?) => {{
        #[allow(unused_mut)]
        let mut diag = $crate::diag::SourceDiagnostic::error(
            $span,
            ecow::eco_format!($fmt $(, $arg)*),
        );
        $(diag = diag.with_hint(ecow::eco_format!($hint $(, $hint_arg)*));)*
        vec![diag]
    }};
}

/// Construct a [`SourceDiagnostic`] with severity `Warning`.
#[macro_export]
macro_rules! warning {
    ($span:expr, $fmt:literal $(, $arg:expr)* $(,)? $(; hint: $hint:literal $(, $hint_arg:expr)*)* $(;)?) => {{
        #[allow(unused_mut)]
        let mut diag = $crate::diag::SourceDiagnostic::warning(
            $span,
            ecow::eco_format!($fmt $(, $arg)*),
        );
        $(diag = diag.with_hint(ecow::eco_format!($hint $(, $hint_arg)*));)*
        diag
    }};
}

pub(crate) fn unknown_variable(name: &str) -> EcoString {
    eco_format!("{name} not defined in scope")
}
