//! AST and source-position types shared between a quill parser and
//! `quill-eval`.
//!
//! This crate deliberately contains no lexer or parser: producing this
//! tree from source text is out of scope for the evaluator core. What
//! lives here is only the contract a parser must satisfy and the
//! evaluator may rely on.

pub mod ast;
mod span;

pub use span::{FileId, Span, Spanned};
