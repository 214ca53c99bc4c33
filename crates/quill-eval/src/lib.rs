//! A tree-walking evaluator for a Typst-like markup/scripting language
//! (spec.md §1). Parsing is out of scope: callers hand in an already
//! parsed [`quill_syntax::ast::Markup`] and a [`vm::Host`] implementation
//! that can load other files, parse their text, and report the time.

pub mod access;
pub mod binding;
pub mod call;
pub mod code;
pub mod content;
pub mod diag;
pub mod elements;
mod eval_builtin;
pub mod flow;
pub mod methods;
pub mod module;
pub(crate) mod ops;
pub mod rules;
pub mod scope;
pub mod selector;
pub mod style;
#[cfg(test)]
mod test_support;
pub mod value;
pub mod vm;

use ecow::EcoString;
use quill_syntax::ast::Markup;

pub use diag::{SourceDiagnostic, SourceResult, Warned};
pub use value::Content;
pub use vm::Host;

use vm::Vm;

/// Evaluate a parsed document to content (spec.md §6, SPEC_FULL.md §6).
///
/// Returns the rendered content and any warnings collected along the
/// way on success; a non-empty error list on failure, the same shape
/// every other fallible entry point in this crate uses.
pub fn evaluate_typst(
    host: &mut dyn Host,
    source_name: impl Into<EcoString>,
    base_dir: impl Into<EcoString>,
    markup: &Markup,
) -> SourceResult<Warned<Content>> {
    let mut vm = Vm::new(host, source_name, base_dir);
    install_builtins(&mut vm);

    let content = content::eval_markup(&mut vm, markup)?;

    if let Some(flow) = vm.flow.take() {
        return Err(vec![flow.forbidden()]);
    }

    Ok(Warned { output: content, warnings: vm.diagnostics })
}

/// Install the builtin element-name table and the `eval` function into
/// a fresh `Vm`'s root scope — shared by the document entry point and
/// by every module evaluated through `import`/`include` (spec.md §4.8),
/// so a module sees the same builtin environment as the top-level
/// document.
pub(crate) fn install_builtins(vm: &mut Vm) {
    elements::install(&mut vm.scopes);
    vm.scopes.bind("eval".into(), value::Value::Func(eval_builtin::builtin()));
}
