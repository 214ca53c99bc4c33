//! Source positions.
//!
//! The evaluator never constructs these on its own — they come from
//! whatever parser produced the [`crate::ast`] tree it is walking. A
//! `Span` just has to be cheap to copy and to compare, and to carry a
//! "detached" state for synthesized nodes (e.g. inside `eval`, where
//! there is no real source text to point at).

use std::fmt::{self, Debug, Formatter};

/// Identifies a loaded source file within a single evaluation run.
///
/// Distinct from a file path: two imports of the same path during one
/// evaluation still get distinct ids if re-loaded, which is enough for
/// the core evaluator's cyclic-import check (it compares against the
/// route of ids currently being evaluated, not against paths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte range into a specific source file, or a detached span that
/// carries no position at all.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    file: Option<FileId>,
    range: Option<(u32, u32)>,
}

impl Span {
    /// A span carrying no position, used for synthesized code.
    pub const fn detached() -> Self {
        Self { file: None, range: None }
    }

    /// A span over `start..end` bytes of `file`.
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file: Some(file), range: Some((start, end)) }
    }

    pub fn file(&self) -> Option<FileId> {
        self.file
    }

    pub fn range(&self) -> Option<std::ops::Range<u32>> {
        self.range.map(|(start, end)| start..end)
    }

    pub fn is_detached(&self) -> bool {
        self.file.is_none()
    }

    /// Whether `self` fully contains `other`'s byte range in the same file.
    pub fn surrounds(&self, other: Span) -> bool {
        match (self.file, self.range, other.file, other.range) {
            (Some(a), Some((s1, e1)), Some(b), Some((s2, e2))) => {
                a == b && s1 <= s2 && e1 >= e2
            }
            _ => false,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::detached()
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (self.file, self.range) {
            (Some(file), Some((start, end))) => write!(f, "{}@{start}..{end}", file.0),
            _ => write!(f, "detached"),
        }
    }
}

/// A value bundled with the span of the source text it came from.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Spanned<T> {
    pub v: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(v: T, span: Span) -> Self {
        Self { v, span }
    }

    pub fn detached(v: T) -> Self {
        Self { v, span: Span::detached() }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned::new(f(self.v), self.span)
    }

    pub fn as_ref(&self) -> Spanned<&T> {
        Spanned::new(&self.v, self.span)
    }
}

impl<T: Debug> Debug for Spanned<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.v.fmt(f)
    }
}
