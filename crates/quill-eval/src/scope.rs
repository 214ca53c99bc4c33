//! The environment stack (spec.md §3.4).
//!
//! Frames are modeled as small ordered maps. `Scopes::top` is the
//! innermost, active frame; `Scopes::scopes` holds the frames further
//! out, most recently pushed at the end.

use ecow::EcoString;
use indexmap::IndexMap;

use crate::value::Value;

/// Whether a frame was introduced by a block (`{ .. }`, loop body, …)
/// or by a function call. Assignment cannot walk outward past a
/// `Function` frame without finding its target there (spec.md §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Block,
    Function,
}

/// A single named scope: an insertion-ordered map from identifier to
/// value (spec.md §3.3 ordering invariant applies equally to scopes).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    map: IndexMap<EcoString, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.map.get_mut(name)
    }

    /// Insert or update a binding, preserving the original position of
    /// an existing key (same invariant as [`crate::value::Dict`]).
    pub fn bind(&mut self, name: EcoString, value: Value) {
        self.map.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EcoString, &Value)> {
        self.map.iter()
    }

    pub fn into_map(self) -> IndexMap<EcoString, Value> {
        self.map
    }
}

/// The stack of scopes a running evaluation threads through.
#[derive(Debug, Clone)]
pub struct Scopes {
    pub top: Scope,
    top_kind: ScopeKind,
    scopes: Vec<(ScopeKind, Scope)>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        Self { top: Scope::new(), top_kind: ScopeKind::Block, scopes: Vec::new() }
    }

    /// Number of frames currently on the stack (used by the scope
    /// discipline invariant in spec.md §8).
    pub fn depth(&self) -> usize {
        self.scopes.len() + 1
    }

    /// Push a fresh frame of the given kind, making it the new top.
    pub fn enter(&mut self, kind: ScopeKind) {
        let old_top = std::mem::take(&mut self.top);
        let old_kind = std::mem::replace(&mut self.top_kind, kind);
        self.scopes.push((old_kind, old_top));
    }

    /// Pop the top frame, restoring the previous one.
    ///
    /// Panics if called with no pushed frame — callers always pair
    /// this with a matching [`Scopes::enter`], even on failure paths
    /// (spec.md §5).
    pub fn exit(&mut self) {
        let (kind, scope) = self.scopes.pop().expect("no pushed scope to exit");
        self.top = scope;
        self.top_kind = kind;
    }

    /// Look up a variable by walking frames innermost-to-outermost.
    /// Unlike [`Scopes::get_mut`], reading never stops at a function
    /// boundary — a closure's captured snapshot is read like any other
    /// scope (spec.md §4.6).
    pub fn get(&self, name: &str) -> Option<&Value> {
        std::iter::once(&self.top)
            .chain(self.scopes.iter().rev().map(|(_, s)| s))
            .find_map(|scope| scope.get(name))
    }

    /// Look up a variable mutably for assignment. Walks outward from
    /// the top and stops at the first frame containing the name; if a
    /// `Function` frame is reached (inclusive) without finding it,
    /// the walk aborts — crossing into a closure's captured
    /// environment to mutate it from inside the closure is not
    /// allowed (spec.md §3.4, §7 "Undefined reference").
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if let Some(value) = self.top.get_mut(name) {
            return Some(value);
        }
        if self.top_kind == ScopeKind::Function {
            return None;
        }
        for (kind, scope) in self.scopes.iter_mut().rev() {
            if let Some(value) = scope.get_mut(name) {
                return Some(value);
            }
            if *kind == ScopeKind::Function {
                return None;
            }
        }
        None
    }

    /// Bind a new name into the innermost frame.
    pub fn bind(&mut self, name: EcoString, value: Value) {
        self.top.bind(name, value);
    }

    /// Snapshot the whole stack for closure capture (spec.md §4.6).
    /// Cheap to clone structurally since `Value` clones are cheap
    /// (content/arrays/dicts are reference-counted internally).
    pub fn snapshot(&self) -> Vec<(ScopeKind, Scope)> {
        let mut frames = self.scopes.clone();
        frames.push((self.top_kind, self.top.clone()));
        frames
    }

    /// Replace the live stack with a previously captured snapshot,
    /// returning the stack that was live before the call so the
    /// caller can restore it afterwards (spec.md §4.6 step 2).
    pub fn enter_snapshot(&mut self, snapshot: Vec<(ScopeKind, Scope)>) -> Vec<(ScopeKind, Scope)> {
        let mut frames = snapshot;
        let (top_kind, top) = frames.pop().expect("snapshot is never empty");
        let saved_scopes = std::mem::replace(&mut self.scopes, frames);
        let saved_top = std::mem::replace(&mut self.top, top);
        let saved_top_kind = std::mem::replace(&mut self.top_kind, top_kind);
        let mut saved = saved_scopes;
        saved.push((saved_top_kind, saved_top));
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_exit_is_balanced_and_restores_bindings() {
        let mut scopes = Scopes::new();
        scopes.bind("x".into(), Value::Int(1));
        assert_eq!(scopes.depth(), 1);

        scopes.enter(ScopeKind::Block);
        scopes.bind("y".into(), Value::Int(2));
        assert_eq!(scopes.depth(), 2);
        assert!(scopes.get("x").is_some());
        assert!(scopes.get("y").is_some());

        scopes.exit();
        assert_eq!(scopes.depth(), 1);
        assert!(scopes.get("y").is_none());
        assert!(scopes.get("x").is_some());
    }

    #[test]
    fn test_get_mut_stops_at_function_boundary() {
        let mut scopes = Scopes::new();
        scopes.bind("x".into(), Value::Int(1));
        scopes.enter(ScopeKind::Function);
        scopes.bind("y".into(), Value::Int(2));

        // reading crosses the boundary freely
        assert!(scopes.get("x").is_some());
        // mutating does not: `x` lives outside the closure's own frame
        assert!(scopes.get_mut("x").is_none());
        assert!(scopes.get_mut("y").is_some());
    }

    #[test]
    fn test_block_frame_does_not_block_get_mut() {
        let mut scopes = Scopes::new();
        scopes.bind("x".into(), Value::Int(1));
        scopes.enter(ScopeKind::Block);
        assert!(scopes.get_mut("x").is_some());
    }

    #[test]
    fn test_snapshot_and_enter_snapshot_round_trip() {
        let mut scopes = Scopes::new();
        scopes.bind("x".into(), Value::Int(1));
        let snapshot = scopes.snapshot();

        scopes.bind("x".into(), Value::Int(2));
        assert_eq!(scopes.get("x").and_then(Value::as_bool), None);

        let live = scopes.enter_snapshot(snapshot);
        assert!(matches!(scopes.get("x"), Some(Value::Int(1))));

        let restored = scopes.enter_snapshot(live);
        assert!(matches!(scopes.get("x"), Some(Value::Int(2))));
        let _ = restored;
    }

    #[test]
    #[should_panic(expected = "no pushed scope to exit")]
    fn test_exit_without_enter_panics() {
        let mut scopes = Scopes::new();
        scopes.exit();
    }
}
