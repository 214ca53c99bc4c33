//! The `eval` built-in (spec.md §4.9, SPEC_FULL.md §4.9.1): evaluate a
//! string as a sandboxed sub-program. Sandboxed means no file access —
//! an `import`/`include` reached from inside an `eval`'d string cannot
//! read anything outside what the caller already has in scope.

use ecow::{eco_format, EcoString};
use quill_syntax::ast::MarkupKind;
use quill_syntax::Span;

use crate::diag::{SourceDiagnostic, SourceResult};
use crate::value::{Arguments, Func, Value};
use crate::vm::{Host, Vm};

struct SandboxHost<'a> {
    inner: &'a mut dyn Host,
}

impl Host for SandboxHost<'_> {
    fn load_source(&mut self, _base: &str, _path: &str) -> Result<(EcoString, EcoString), EcoString> {
        Err("file access is not available inside eval".into())
    }

    fn parse(&mut self, text: &str) -> Result<quill_syntax::ast::Markup, EcoString> {
        self.inner.parse(text)
    }

    fn current_time(&mut self) -> i64 {
        self.inner.current_time()
    }
}

/// The value bound to the name `eval` in the root scope.
pub fn builtin() -> Func {
    Func::native("eval", eval_builtin)
}

fn eval_builtin(vm: &mut Vm, mut args: Arguments, span: Span) -> SourceResult<Value> {
    let text = match args.named.shift_remove("source").or_else(|| {
        if args.positional.is_empty() { None } else { Some(args.positional.remove(0)) }
    }) {
        Some(Value::Str(s)) => s,
        Some(other) => return Err(prefix(vec![SourceDiagnostic::error(span, eco_format!("expected string, found {}", other.ty()))])),
        None => return Err(prefix(vec![SourceDiagnostic::error(span, "missing argument: source")])),
    };

    run(vm, &text, span).map_err(prefix)
}

fn run(vm: &mut Vm, text: &str, span: Span) -> SourceResult<Value> {
    let mut sandbox = SandboxHost { inner: &mut *vm.host };
    let markup = sandbox.parse(text).map_err(|e| vec![SourceDiagnostic::error(span, e)])?;

    let mut sub_vm = Vm::new(&mut sandbox, eco_format!("{}:eval", vm.source_name), vm.base_dir.clone());
    sub_vm.scopes = vm.scopes.clone();
    sub_vm.math = vm.math;

    let value = match markup.as_slice() {
        [quill_syntax::ast::MarkupNode { kind: MarkupKind::Code(_, expr), .. }] => crate::code::eval_expr(&mut sub_vm, expr)?,
        _ => Value::Content(crate::content::eval_markup(&mut sub_vm, &markup)?),
    };

    vm.diagnostics.extend(std::mem::take(&mut sub_vm.diagnostics));
    Ok(value)
}

fn prefix(errors: Vec<SourceDiagnostic>) -> Vec<SourceDiagnostic> {
    errors
        .into_iter()
        .map(|mut e| {
            e.message = eco_format!("eval: {}", e.message);
            e
        })
        .collect()
}
