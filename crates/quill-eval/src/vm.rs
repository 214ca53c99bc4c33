//! The virtual machine (spec.md §3.4, SPEC_FULL.md §6).

use ecow::EcoString;
use quill_syntax::Span;
use rustc_hash::FxHashMap;

use crate::diag::SourceDiagnostic;
use crate::flow::FlowEvent;
use crate::rules::ShowRule;
use crate::scope::Scopes;
use crate::style::Styles;
use crate::value::Value;

/// Host callbacks the evaluator needs but does not implement itself:
/// loading another file's bytes (for `import`/`include`), parsing that
/// text into the AST contract of `quill_syntax::ast` (this crate never
/// parses anything itself), and reading the current time (for
/// `datetime.today()`). Incremental recomputation across edits is out
/// of scope here, so a plain synchronous callback set is enough.
pub trait Host {
    /// Resolve `path` relative to `base`, returning the canonical name
    /// the loaded file should be reported under and its text.
    fn load_source(&mut self, base: &str, path: &str) -> Result<(EcoString, EcoString), EcoString>;

    /// Parse `text` into markup (spec.md §4.8 `import`/`include`,
    /// SPEC_FULL.md §4.9.1 `eval`).
    fn parse(&mut self, text: &str) -> Result<quill_syntax::ast::Markup, EcoString>;

    /// The current Unix timestamp, in seconds.
    fn current_time(&mut self) -> i64;
}

/// A virtual machine. A new one is created for each module evaluation
/// and function call.
pub struct Vm<'a> {
    pub host: &'a mut dyn Host,
    /// A control flow event currently in effect (spec.md §3.4).
    pub flow: Option<FlowEvent>,
    pub scopes: Scopes,
    /// Active show rules, newest-first (spec.md §4.4).
    pub rules: Vec<ShowRule>,
    /// Active `set` styles (spec.md §4.3).
    pub styles: Styles,
    /// A span under inspection, for tooling hooks (SPEC_FULL.md §3.5).
    pub inspected: Option<Span>,
    /// Accumulated warnings (SPEC_FULL.md §7).
    pub diagnostics: Vec<SourceDiagnostic>,
    /// The name of the file currently being evaluated, used in import
    /// cycle detection and tracepoints.
    pub source_name: EcoString,
    /// The directory `import`/`include` paths are resolved against.
    pub base_dir: EcoString,
    /// Files currently being imported, for cycle detection (spec.md §4.8).
    pub import_route: Vec<EcoString>,
    /// Whether the content evaluator is currently inside an `Equation`
    /// (spec.md §3.5 `math`). Affects text-atom consumption, function
    /// call rendering, and symbol accent behavior.
    pub math: bool,
    /// `counters[key]`, mutated by the `Counter` method catalogue
    /// (spec.md §4.7).
    pub counters: FxHashMap<EcoString, i64>,
}

impl<'a> Vm<'a> {
    pub fn new(host: &'a mut dyn Host, source_name: impl Into<EcoString>, base_dir: impl Into<EcoString>) -> Self {
        Self {
            host,
            flow: None,
            scopes: Scopes::new(),
            rules: Vec::new(),
            styles: Styles::default(),
            inspected: None,
            diagnostics: Vec::new(),
            source_name: source_name.into(),
            base_dir: base_dir.into(),
            import_route: Vec::new(),
            math: false,
            counters: FxHashMap::default(),
        }
    }

    /// Bind a value to an identifier in the current innermost scope,
    /// tracing it if it is the inspected span (SPEC_FULL.md §3.5).
    pub fn define(&mut self, name: EcoString, span: Span, value: Value) {
        if self.inspected == Some(span) {
            self.trace(value.clone());
        }
        self.scopes.bind(name, value);
    }

    pub fn trace(&mut self, _value: Value) {
        // Hook point for IDE-style tooling (SPEC_FULL.md §3.5); the
        // core evaluator itself has no inspector to report to.
    }

    pub fn warn(&mut self, diag: SourceDiagnostic) {
        self.diagnostics.push(diag);
    }
}
