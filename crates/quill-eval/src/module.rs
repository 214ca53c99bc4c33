//! Module loading, `import`/`include` (spec.md §4.8).
//!
//! Parsing is out of scope for this crate (spec.md §1); a module's
//! text is turned into markup by [`crate::vm::Host::parse`], which a
//! real integration backs with an actual parser.

use ecow::EcoString;
use quill_syntax::Span;

use crate::diag::{At, SourceResult, Trace, Tracepoint};
use crate::value::{Content, Module};
use crate::vm::Vm;

fn evaluate_module(vm: &mut Vm, path: &str, span: Span) -> SourceResult<(Module, Content)> {
    let path_key = EcoString::from(path);
    if vm.import_route.contains(&path_key) {
        crate::bail!(span, "cyclic import: {path}");
    }

    let (canonical_name, text) = vm.host.load_source(&vm.base_dir, path).at(span)?;
    let markup = vm.host.parse(&text).at(span)?;

    let mut route = vm.import_route.clone();
    route.push(path_key);

    let mut sub_vm = Vm::new(&mut *vm.host, canonical_name.clone(), vm.base_dir.clone());
    sub_vm.import_route = route;
    crate::install_builtins(&mut sub_vm);

    let result = crate::content::eval_markup(&mut sub_vm, &markup).trace(|| Tracepoint::Import, span);
    vm.diagnostics.extend(std::mem::take(&mut sub_vm.diagnostics));
    let scope = sub_vm.scopes.top.into_map();
    let content = result?;

    Ok((Module { name: canonical_name, scope: std::rc::Rc::new(scope) }, content))
}

/// `import "path"`: load and evaluate the module, exposing its
/// top-level scope. The module's own rendered content is discarded —
/// importing binds names, it does not splice in a document.
pub fn load_module(vm: &mut Vm, path: &str, span: Span) -> SourceResult<Module> {
    evaluate_module(vm, path, span).map(|(module, _)| module)
}

/// `include "path"`: load, evaluate, and splice the module's content
/// directly into the caller, discarding its scope.
pub fn include_module(vm: &mut Vm, path: &str, span: Span) -> SourceResult<Content> {
    evaluate_module(vm, path, span).map(|(_, content)| content)
}
