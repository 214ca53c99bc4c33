//! Function invocation: style-merged element calls, closure calls
//! (spec.md §4.2 "Function call", §4.6), and the math-mode call
//! fallbacks.

use std::collections::VecDeque;

use ecow::eco_format;
use quill_syntax::ast::{Param, Pattern};
use quill_syntax::Span;

use crate::diag::{At, SourceResult};
use crate::flow::FlowEvent;
use crate::scope::ScopeKind;
use crate::value::{Arguments, Closure, ClosureBody, Content, ContentNode, Func, Value};
use crate::vm::Vm;

/// Invoke an arbitrary callee value the way a `FuncCall` expression
/// does (spec.md §4.2).
pub fn invoke(vm: &mut Vm, callee: Value, args: Arguments, span: Span) -> SourceResult<Value> {
    match callee {
        Value::Func(f) => {
            let merged = match &f.element_name {
                Some(name) => Arguments::concat(vm.styles.defaults_for(name), args),
                None => args,
            };
            f.call(vm, merged, span)
        }
        Value::Symbol(sym) if vm.math && sym.is_accent => {
            let accent = vm
                .scopes
                .get("accent")
                .cloned()
                .ok_or_else(|| eco_format!("accent not defined in scope"))
                .at(span)?;
            let Value::Func(accent) = accent else {
                crate::bail!(span, "accent is not a function");
            };
            let mut args = args;
            args.push_positional(Value::Symbol(sym));
            accent.call(vm, args, span)
        }
        other if vm.math => Ok(Value::Content(math_call_content(&other, &args))),
        other => crate::bail!(span, "expected function, found {}", other.ty()),
    }
}

fn math_call_content(callee: &Value, args: &Arguments) -> Content {
    let mut text = callee.repr();
    text.push('(');
    for (i, arg) in args.positional.iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(&arg.repr());
    }
    text.push(')');
    Content(vec![ContentNode::Txt(text)])
}

/// Resolve `name` in the environment and invoke it as an element
/// function, merging `args` over the current `set` defaults for that
/// element (spec.md §4.3).
pub fn construct_element(vm: &mut Vm, name: &str, args: Arguments, span: Span) -> SourceResult<Value> {
    let callee = vm
        .scopes
        .get(name)
        .cloned()
        .ok_or_else(|| crate::diag::unknown_variable(name))
        .at(span)?;
    invoke(vm, callee, args, span)
}

/// The three-pass parameter binding of spec.md §4.6.
pub fn call_closure(vm: &mut Vm, func: &Func, closure: &Closure, mut args: Arguments, span: Span) -> SourceResult<Value> {
    let outer = vm.scopes.enter_snapshot(closure.captured.clone());
    vm.scopes.enter(ScopeKind::Function);

    if let Some(name) = &closure.name {
        vm.scopes.bind(name.clone(), Value::Func(func.clone()));
    }

    let result = bind_params(vm, &closure.params, &mut args, span).and_then(|()| {
        let saved_flow = vm.flow.take();
        let outcome = match &closure.body {
            ClosureBody::Expr(expr) => crate::code::eval_expr(vm, expr),
        };
        let outcome = match outcome {
            Ok(value) => match vm.flow.take() {
                Some(FlowEvent::Return(_, explicit, _)) => Ok(explicit.unwrap_or(value)),
                None => Ok(value),
                Some(other) => Err(vec![other.forbidden()]),
            },
            Err(e) => {
                vm.flow = None;
                Err(e)
            }
        };
        vm.flow = saved_flow;
        outcome
    });

    vm.scopes.exit();
    vm.scopes.enter_snapshot(outer);
    result
}

fn bind_params(vm: &mut Vm, params: &[Param], args: &mut Arguments, span: Span) -> SourceResult<()> {
    let sink_idx = params.iter().position(|p| matches!(p, Param::Sink(_)));
    let mut positional: VecDeque<Value> = args.positional.drain(..).collect();
    let mut named = std::mem::take(&mut args.named);

    match sink_idx {
        Some(idx) => {
            for param in &params[..idx] {
                bind_one(vm, param, true, &mut positional, &mut named, span)?;
            }
            for param in params[idx + 1..].iter().rev() {
                bind_one(vm, param, false, &mut positional, &mut named, span)?;
            }
            if let Param::Sink(Some(name)) = &params[idx] {
                let rest: Vec<Value> = positional.into_iter().collect();
                vm.define(name.name.clone(), name.span, Value::Array(rest));
            }
        }
        None => {
            for param in params {
                bind_one(vm, param, true, &mut positional, &mut named, span)?;
            }
        }
    }

    Ok(())
}

fn bind_one(
    vm: &mut Vm,
    param: &Param,
    from_front: bool,
    positional: &mut VecDeque<Value>,
    named: &mut indexmap::IndexMap<ecow::EcoString, Value>,
    span: Span,
) -> SourceResult<()> {
    let take = |positional: &mut VecDeque<Value>| {
        if from_front { positional.pop_front() } else { positional.pop_back() }
    };
    match param {
        Param::Normal(ident) => {
            let value = take(positional).ok_or_else(|| eco_format!("missing argument: {}", ident.as_str())).at(span)?;
            vm.define(ident.name.clone(), ident.span, value);
        }
        Param::Default(ident, default) => {
            let value = match named.shift_remove(ident.as_str()) {
                Some(v) => v,
                None => crate::code::eval_expr(vm, default)?,
            };
            vm.define(ident.name.clone(), ident.span, value);
        }
        Param::Destructuring(parts) => {
            let value = take(positional).ok_or_else(|| eco_format!("missing argument")).at(span)?;
            crate::binding::bind_pattern(vm, &Pattern::Destructuring(parts.clone()), value)?;
        }
        Param::Skip => {
            let _ = take(positional);
        }
        Param::Sink(_) => unreachable!("sink handled by bind_params"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::value::values_equal;
    use quill_syntax::ast::{Expr, Param};

    fn run(vm: &mut Vm, e: &Expr) -> Value {
        crate::code::eval_expr(vm, e).unwrap()
    }

    #[test]
    fn test_closure_call_binds_parameters_and_returns_body_value() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_func("add", vec![Param::Normal(id("a")), Param::Normal(id("b"))], binary(ident("a"), quill_syntax::ast::BinOp::Add, ident("b")));
        run(&mut vm, &def);
        let result = run(&mut vm, &call_ident("add", pos_args(vec![lit_int(2), lit_int(3)])));
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn test_recursive_closure_can_call_itself_by_name() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        // fact(n) = if n <= 1 { 1 } else { n * fact(n - 1) }
        let body = if_(vec![
            (binary(ident("n"), quill_syntax::ast::BinOp::Leq, lit_int(1)), lit_int(1)),
            (
                lit_bool(true),
                binary(
                    ident("n"),
                    quill_syntax::ast::BinOp::Mul,
                    call_ident("fact", pos_args(vec![binary(ident("n"), quill_syntax::ast::BinOp::Sub, lit_int(1))])),
                ),
            ),
        ]);
        let def = let_func("fact", vec![Param::Normal(id("n"))], body);
        run(&mut vm, &def);
        let result = run(&mut vm, &call_ident("fact", pos_args(vec![lit_int(5)])));
        assert!(matches!(result, Value::Int(120)));
    }

    #[test]
    fn test_sink_parameter_collects_the_unclaimed_middle() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        // f(x, ..rest, y) called as f(1, 2, 3, 4):
        // x takes from the front (1), y takes from the back (4), rest
        // gets whatever positional arguments are left over (2, 3).
        let def = let_func(
            "f",
            vec![Param::Normal(id("x")), Param::Sink(Some(id("rest"))), Param::Normal(id("y"))],
            array(vec![ident("x"), ident("rest"), ident("y")]),
        );
        run(&mut vm, &def);
        let result = run(&mut vm, &call_ident("f", pos_args(vec![lit_int(1), lit_int(2), lit_int(3), lit_int(4)])));
        let expected = Value::Array(vec![Value::Int(1), Value::Array(vec![Value::Int(2), Value::Int(3)]), Value::Int(4)]);
        assert!(values_equal(&result, &expected));
    }

    #[test]
    fn test_closure_cannot_see_names_defined_after_it_was_built() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_func("f", vec![], ident("late"));
        run(&mut vm, &def);
        run(&mut vm, &let_ident("late", lit_int(1)));
        let err = crate::code::eval_expr(&mut vm, &call_ident("f", pos_args(vec![]))).unwrap_err();
        assert!(err[0].message.contains("late"));
    }

    #[test]
    fn test_calling_a_closure_does_not_leak_its_parameters_into_the_caller() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_func("f", vec![Param::Normal(id("x"))], ident("x"));
        run(&mut vm, &def);
        run(&mut vm, &call_ident("f", pos_args(vec![lit_int(9)])));
        assert!(vm.scopes.get("x").is_none());
    }
}
