//! The expression evaluator, `evalExpr` (spec.md §4.2).
//!
//! Every other module that needs to run arbitrary user code — content
//! mapping's embedded `Code` nodes, closure bodies, default parameter
//! expressions, `set`/`show` targets — calls back into [`eval_expr`].

use std::rc::Rc;

use ecow::{eco_format, EcoString};
use indexmap::IndexMap;
use quill_syntax::ast::{Arg, Args, Block, Expr, ExprKind, Imports, Literal, Unit};
use quill_syntax::Span;

use crate::diag::{At, SourceResult, Trace, Tracepoint};
use crate::flow::FlowEvent;
use crate::scope::ScopeKind;
use crate::value::{
    Angle, Arguments, Closure, ClosureBody, Dict, Fraction, Func, FuncRepr, Length, Ratio, Value,
};
use crate::vm::Vm;
use crate::{access, binding, call, methods, module, ops, rules, selector};

const MAX_LOOP_ITERATIONS: usize = 10_000;

/// Evaluate a single expression to a value, tracing it if it is the
/// span under inspection (SPEC_FULL.md §3.5).
pub fn eval_expr(vm: &mut Vm, expr: &Expr) -> SourceResult<Value> {
    let span = expr.span();
    let value = eval_expr_inner(vm, expr, span)?;
    if vm.inspected == Some(span) {
        vm.trace(value.clone());
    }
    Ok(value)
}

fn eval_expr_inner(vm: &mut Vm, expr: &Expr, span: Span) -> SourceResult<Value> {
    match &*expr.kind {
        ExprKind::Lit(lit) => Ok(literal_value(lit)),

        ExprKind::Ident(ident) => vm
            .scopes
            .get(ident.as_str())
            .cloned()
            .ok_or_else(|| crate::diag::unknown_variable(ident.as_str()))
            .at(span),

        ExprKind::Label(name) => Ok(Value::Label(crate::value::Label(name.clone()))),

        ExprKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(vm, item)?);
            }
            Ok(Value::Array(out))
        }

        ExprKind::Dict(items) => {
            let mut out: Dict = IndexMap::new();
            for (key, value_expr) in items {
                let value = eval_expr(vm, value_expr)?;
                out.insert(key.name.clone(), value);
            }
            Ok(Value::Dict(out))
        }

        ExprKind::Parenthesized(inner) => eval_expr(vm, inner),

        ExprKind::Unary(op, inner) => {
            let value = eval_expr(vm, inner)?;
            match op {
                quill_syntax::ast::UnOp::Pos => ops::pos(value).at(span),
                quill_syntax::ast::UnOp::Neg => ops::neg(value).at(span),
                quill_syntax::ast::UnOp::Not => ops::not(value).at(span),
            }
        }

        ExprKind::Binary(lhs, op, rhs) => eval_binary(vm, lhs, *op, rhs, span),

        ExprKind::Let(pattern, init) => {
            let value = match init {
                Some(e) => eval_expr(vm, e)?,
                None => Value::None,
            };
            binding::bind_pattern(vm, pattern, value)?;
            Ok(Value::None)
        }

        ExprKind::LetFunc { name, params, body } => {
            let func = build_closure(vm, Some(name.name.clone()), params, body);
            vm.define(name.name.clone(), name.span, Value::Func(func));
            Ok(Value::None)
        }

        ExprKind::Closure { name, params, body } => {
            let func = build_closure(vm, name.as_ref().map(|i| i.name.clone()), params, body);
            Ok(Value::Func(func))
        }

        ExprKind::Assign(target, value_expr) => {
            let value = eval_expr(vm, value_expr)?;
            let slot = access::access(vm, target)?;
            *slot = value;
            Ok(Value::None)
        }

        ExprKind::FieldAccess { target, field } => {
            let value = eval_expr(vm, target)?;
            if let Some(func) = methods::get_method(&value, field.as_str()) {
                return Ok(Value::Func(func));
            }
            field_access(value, field.as_str(), span)
        }

        ExprKind::FuncCall { callee, args } => eval_call(vm, callee, args, span),

        ExprKind::If(arms) => {
            let mut result = Value::None;
            for (cond, body) in arms {
                match eval_expr(vm, cond)? {
                    Value::Bool(true) => {
                        result = eval_expr(vm, body)?;
                        break;
                    }
                    Value::Bool(false) => continue,
                    other => crate::bail!(cond.span(), "expected boolean, found {}", other.ty()),
                }
            }
            mark_conditional_return(vm);
            Ok(result)
        }

        ExprKind::While { condition, body } => {
            let mut output = Value::None;
            let mut iterations = 0usize;
            loop {
                match eval_expr(vm, condition)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => break,
                    other => crate::bail!(condition.span(), "expected boolean, found {}", other.ty()),
                }
                iterations += 1;
                if iterations > MAX_LOOP_ITERATIONS {
                    vm.warn(crate::warning!(span, "loop seems to be infinite"));
                    break;
                }
                let value = eval_expr(vm, body)?;
                output = ops::join(output, value).at(body.span())?;
                if loop_control(vm) {
                    break;
                }
            }
            mark_conditional_return(vm);
            Ok(output)
        }

        ExprKind::For { pattern, iterable, body } => {
            let items = iterate(eval_expr(vm, iterable)?, iterable.span())?;
            let mut output = Value::None;
            for item in items {
                vm.scopes.enter(ScopeKind::Block);
                let outcome = binding::bind_pattern(vm, pattern, item).and_then(|()| eval_expr(vm, body));
                vm.scopes.exit();
                let value = outcome?;
                output = ops::join(output, value).at(body.span())?;
                if loop_control(vm) {
                    break;
                }
            }
            mark_conditional_return(vm);
            Ok(output)
        }

        ExprKind::Return(opt) => {
            let value = match opt {
                Some(e) => Some(eval_expr(vm, e)?),
                None => None,
            };
            if vm.flow.is_none() {
                vm.flow = Some(FlowEvent::Return(span, value, false));
            }
            Ok(Value::None)
        }

        ExprKind::Continue => {
            if vm.flow.is_none() {
                vm.flow = Some(FlowEvent::Continue(span));
            }
            Ok(Value::None)
        }

        ExprKind::Break => {
            if vm.flow.is_none() {
                vm.flow = Some(FlowEvent::Break(span));
            }
            Ok(Value::None)
        }

        ExprKind::Block(Block::Code(exprs)) => eval_code_block(vm, exprs, span),
        ExprKind::Block(Block::Content(markup)) => crate::content::eval_markup(vm, markup).map(Value::Content),

        ExprKind::Set { target, args } => {
            let target_val = eval_expr(vm, target)?;
            let Value::Func(f) = target_val else {
                crate::bail!(target.span(), "expected function, found {}", target_val.ty());
            };
            let Some(name) = f.element_name.clone() else {
                crate::bail!(target.span(), "only element functions can be used in set rules");
            };
            let call_args = eval_args(vm, args)?;
            vm.styles.push(name, call_args);
            Ok(Value::None)
        }

        ExprKind::Show { selector: sel_expr, body } => {
            let sel = match sel_expr {
                Some(e) => {
                    let value = eval_expr(vm, e)?;
                    Some(selector::to_selector(value).at(e.span())?)
                }
                None => None,
            };
            // `show selector: set ...` is a documented pass-through stub
            // (spec.md §9 Open Questions): the `set` still runs for its
            // styling side effect, but the rule it installs rewrites
            // nothing.
            let transform = if matches!(&*body.kind, ExprKind::Set { .. }) {
                eval_expr(vm, body)?;
                rules::ShowTransform::PassThrough
            } else {
                match eval_expr(vm, body)? {
                    Value::Func(f) => rules::ShowTransform::Dynamic(f),
                    other => rules::ShowTransform::Static(crate::content::value_to_content(&other)),
                }
            };
            vm.rules.insert(0, rules::ShowRule { selector: sel, transform });
            Ok(Value::None)
        }

        ExprKind::Import { source, imports, rename } => {
            let source_val = eval_expr(vm, source)?;
            let module = match source_val {
                Value::Module(m) => m,
                Value::Str(path) => module::load_module(vm, path.as_str(), source.span())?,
                other => crate::bail!(source.span(), "cannot import from {}", other.ty()),
            };
            bind_import(vm, module, imports, rename, span)?;
            Ok(Value::None)
        }

        ExprKind::Include(source) => {
            let value = eval_expr(vm, source)?;
            let Value::Str(path) = value else {
                crate::bail!(source.span(), "expected string, found {}", value.ty());
            };
            let content = module::include_module(vm, path.as_str(), span)?;
            Ok(Value::Content(content))
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::Auto => Value::Auto,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Numeric(v, unit) => numeric_value(*v, *unit),
    }
}

/// Convert a unit-suffixed literal to its canonical internal
/// representation (spec.md §4.2): lengths are stored in points, angles
/// in degrees.
fn numeric_value(v: f64, unit: Unit) -> Value {
    const PT_PER_IN: f64 = 72.0;
    match unit {
        Unit::Pt => Value::Length(Length::Abs(v)),
        Unit::Mm => Value::Length(Length::Abs(v * PT_PER_IN / 25.4)),
        Unit::Cm => Value::Length(Length::Abs(v * PT_PER_IN / 2.54)),
        Unit::In => Value::Length(Length::Abs(v * PT_PER_IN)),
        Unit::Em => Value::Length(Length::Em(v)),
        Unit::Fr => Value::Fraction(Fraction(v)),
        Unit::Rad => Value::Angle(Angle(v * 180.0 / std::f64::consts::PI)),
        Unit::Deg => Value::Angle(Angle(v)),
        Unit::Percent => Value::Ratio(Ratio(v / 100.0)),
    }
}

fn eval_binary(vm: &mut Vm, lhs: &Expr, op: quill_syntax::ast::BinOp, rhs: &Expr, span: Span) -> SourceResult<Value> {
    use quill_syntax::ast::BinOp;

    // `and`/`or` short-circuit: the right operand is never evaluated
    // (and so never has side effects) once the outcome is already
    // decided (spec.md §4.2).
    match op {
        BinOp::And => {
            return match eval_expr(vm, lhs)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                left @ Value::Bool(true) => {
                    let right = eval_expr(vm, rhs)?;
                    ops::and(left, right).at(span)
                }
                other => crate::bail!(lhs.span(), "expected boolean, found {}", other.ty()),
            };
        }
        BinOp::Or => {
            return match eval_expr(vm, lhs)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                left @ Value::Bool(false) => {
                    let right = eval_expr(vm, rhs)?;
                    ops::or(left, right).at(span)
                }
                other => crate::bail!(lhs.span(), "expected boolean, found {}", other.ty()),
            };
        }
        _ => {}
    }

    let left = eval_expr(vm, lhs)?;
    let right = eval_expr(vm, rhs)?;
    match op {
        BinOp::Add => ops::add(left, right).at(span),
        BinOp::Sub => ops::sub(left, right).at(span),
        BinOp::Mul => ops::mul(left, right).at(span),
        BinOp::Div => ops::div(left, right).at(span),
        BinOp::Pow => ops::pow(left, right).at(span),
        BinOp::Eq => ops::eq(left, right).at(span),
        BinOp::Neq => ops::neq(left, right).at(span),
        BinOp::Lt => ops::lt(left, right).at(span),
        BinOp::Leq => ops::leq(left, right).at(span),
        BinOp::Gt => ops::gt(left, right).at(span),
        BinOp::Geq => ops::geq(left, right).at(span),
        BinOp::In => ops::in_(left, right).at(span),
        BinOp::NotIn => ops::not_in(left, right).at(span),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn build_closure(vm: &mut Vm, name: Option<EcoString>, params: &[quill_syntax::ast::Param], body: &Expr) -> Func {
    let captured = vm.scopes.snapshot();
    let closure = Closure { name, params: params.to_vec(), body: ClosureBody::Expr(body.clone()), captured };
    Func { element_name: None, captured: Rc::new(IndexMap::new()), repr: FuncRepr::Closure(Rc::new(closure)) }
}

fn field_access(value: Value, field: &str, span: Span) -> SourceResult<Value> {
    match value {
        Value::Symbol(sym) => sym
            .resolve(field)
            .cloned()
            .map(Value::Str)
            .ok_or_else(|| eco_format!("symbol does not have variant {field:?}"))
            .at(span),
        Value::Module(m) => m
            .scope
            .get(field)
            .cloned()
            .ok_or_else(|| eco_format!("module does not contain `{field}`"))
            .at(span),
        Value::Func(f) => f
            .captured
            .get(field)
            .cloned()
            .ok_or_else(|| eco_format!("function does not contain field `{field}`"))
            .at(span),
        Value::Dict(d) => d
            .get(field)
            .cloned()
            .ok_or_else(|| eco_format!("dictionary does not contain key {field:?}"))
            .at(span),
        other => Err(eco_format!("type {} has no field or method `{field}`", other.ty())).at(span),
    }
}

fn mark_conditional_return(vm: &mut Vm) {
    if let Some(FlowEvent::Return(_, _, conditional)) = &mut vm.flow {
        *conditional = true;
    }
}

/// Drain any flow signal set by a loop body. Returns whether the
/// enclosing loop should stop.
fn loop_control(vm: &mut Vm) -> bool {
    match vm.flow.take() {
        Some(FlowEvent::Break(_)) => true,
        Some(FlowEvent::Continue(_)) => false,
        Some(other @ FlowEvent::Return(..)) => {
            vm.flow = Some(other);
            true
        }
        None => false,
    }
}

fn iterate(value: Value, span: Span) -> SourceResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Dict(map) => Ok(map.into_iter().map(|(k, v)| Value::Array(vec![Value::Str(k), v])).collect()),
        // Codepoint-by-codepoint, not grapheme clusters (spec.md §4.2's
        // stated simplification for `for` over a string).
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.into())).collect()),
        other => Err(eco_format!("cannot loop over {}", other.ty())).at(span),
    }
}

fn eval_code_block(vm: &mut Vm, exprs: &[Expr], span: Span) -> SourceResult<Value> {
    vm.scopes.enter(ScopeKind::Block);
    let rules_len = vm.rules.len();
    let styles_mark = vm.styles.mark();

    let mut output = Value::None;
    let mut error = None;
    for stmt in exprs {
        match eval_expr(vm, stmt) {
            Ok(value) => match ops::join(output, value).at(stmt.span()) {
                Ok(joined) => output = joined,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            },
            Err(e) => {
                error = Some(e);
                break;
            }
        }
        if vm.flow.is_some() {
            break;
        }
    }

    let result = match error {
        Some(e) => Err(e),
        None => match output {
            Value::Content(content) => rules::apply_global_show_rules(vm, content, span).map(Value::Content),
            other => Ok(other),
        },
    };

    vm.rules.truncate(rules_len);
    vm.styles.truncate(styles_mark);
    vm.scopes.exit();
    result
}

/// Build an [`Arguments`] value from a call/set argument list,
/// expanding spreads (spec.md §4.2 "Spread").
pub(crate) fn eval_args(vm: &mut Vm, args: &Args) -> SourceResult<Arguments> {
    let mut out = Arguments::new(args.span);
    for item in &args.items {
        match item {
            Arg::Pos(e) => out.push_positional(eval_expr(vm, e)?),
            Arg::Named(ident, e) => out.push_named(ident.name.clone(), eval_expr(vm, e)?),
            Arg::Spread(e) => {
                let value = eval_expr(vm, e)?;
                match value {
                    Value::Array(items) => out.positional.extend(items),
                    Value::Dict(map) => {
                        for (k, v) in map {
                            out.named.insert(k, v);
                        }
                    }
                    Value::Args(a) => {
                        out.positional.extend(a.positional);
                        for (k, v) in a.named {
                            out.named.insert(k, v);
                        }
                    }
                    Value::None => {}
                    other => crate::bail!(e.span(), "cannot spread {} into arguments", other.ty()),
                }
            }
        }
    }
    Ok(out)
}

fn callee_name(expr: &Expr) -> Option<EcoString> {
    match &*expr.kind {
        ExprKind::Ident(ident) => Some(ident.name.clone()),
        ExprKind::FieldAccess { field, .. } => Some(field.name.clone()),
        _ => None,
    }
}

fn eval_call(vm: &mut Vm, callee: &Expr, args: &Args, span: Span) -> SourceResult<Value> {
    if let ExprKind::FieldAccess { target, field } = &*callee.kind {
        if methods::is_mutating(field.as_str()) {
            return eval_mutating_call(vm, target, field.as_str(), args, span);
        }
    }

    let callee_val = eval_expr(vm, callee)?;
    let call_args = eval_args(vm, args)?;
    let name = callee_name(callee);
    let f = || call::invoke(vm, callee_val, call_args, span).trace(|| Tracepoint::Call(name.clone()), span);

    // A deeply recursive closure can blow the native stack before
    // tripping any loop-iteration limit; grow it on demand rather than
    // segfault (stacker is a no-op once the stack is already large
    // enough).
    #[cfg(target_arch = "wasm32")]
    return f();
    #[cfg(not(target_arch = "wasm32"))]
    stacker::maybe_grow(32 * 1024, 2 * 1024 * 1024, f)
}

fn arg_value(args: &mut Arguments, name: &str, span: Span) -> SourceResult<Value> {
    if let Some(value) = args.named.shift_remove(name) {
        return Ok(value);
    }
    if !args.positional.is_empty() {
        return Ok(args.positional.remove(0));
    }
    crate::bail!(span, "missing argument: {name}")
}

fn arg_int(args: &mut Arguments, name: &str, span: Span) -> SourceResult<i64> {
    match arg_value(args, name, span)? {
        Value::Int(i) => Ok(i),
        other => crate::bail!(span, "expected integer, found {}", other.ty()),
    }
}

fn arg_str(args: &mut Arguments, name: &str, span: Span) -> SourceResult<EcoString> {
    match arg_value(args, name, span)? {
        Value::Str(s) => Ok(s),
        other => crate::bail!(span, "expected string, found {}", other.ty()),
    }
}

/// The four mutating Array/Dict methods (spec.md §4.7), handled here
/// rather than in [`crate::methods`] because they need to mutate
/// through the lvalue protocol rather than return a fresh value.
fn eval_mutating_call(vm: &mut Vm, target: &Expr, field: &str, args: &Args, span: Span) -> SourceResult<Value> {
    let mut call_args = eval_args(vm, args)?;
    let slot = access::access(vm, target)?;
    match slot {
        Value::Array(array) => match field {
            "push" => {
                let value = arg_value(&mut call_args, "value", span)?;
                array.push(value);
                Ok(Value::None)
            }
            "pop" => array.pop().ok_or_else(|| eco_format!("array is empty")).at(span),
            "insert" => {
                let idx = arg_int(&mut call_args, "index", span)?;
                let value = arg_value(&mut call_args, "value", span)?;
                let len = array.len() as i64;
                let i = if idx < 0 { idx + len } else { idx };
                if i < 0 || i > len {
                    crate::bail!(span, "array index out of bounds (index: {idx}, len: {len})");
                }
                array.insert(i as usize, value);
                Ok(Value::None)
            }
            "remove" => {
                let idx = arg_int(&mut call_args, "index", span)?;
                let default = call_args.named.shift_remove("default");
                let len = array.len() as i64;
                let i = if idx < 0 { idx + len } else { idx };
                if i < 0 || i >= len {
                    default.ok_or_else(|| eco_format!("array index out of bounds (index: {idx}, len: {len})")).at(span)
                } else {
                    Ok(array.remove(i as usize))
                }
            }
            _ => unreachable!("not a mutating method"),
        },
        Value::Dict(dict) => match field {
            "insert" => {
                let key = arg_str(&mut call_args, "key", span)?;
                let value = arg_value(&mut call_args, "value", span)?;
                dict.insert(key, value);
                Ok(Value::None)
            }
            "remove" => {
                let key = arg_str(&mut call_args, "key", span)?;
                let default = call_args.named.shift_remove("default");
                match dict.shift_remove(&key) {
                    Some(v) => Ok(v),
                    None => default.ok_or_else(|| eco_format!("dictionary does not contain key {key:?}")).at(span),
                }
            }
            _ => unreachable!("not a mutating method"),
        },
        other => crate::bail!(span, "type {} has no method `{field}`", other.ty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::value::values_equal;

    #[test]
    fn test_code_block_leaves_scope_depth_unchanged() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let before = vm.scopes.depth();
        let block = code_block(vec![let_ident("x", lit_int(1)), ident("x")]);
        let result = eval_expr(&mut vm, &block).unwrap();
        assert!(matches!(result, Value::Int(1)));
        assert_eq!(vm.scopes.depth(), before);
        assert!(vm.scopes.get("x").is_none());
    }

    #[test]
    fn test_return_short_circuits_the_rest_of_a_code_block() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_func(
            "f",
            vec![],
            code_block(vec![return_(Some(lit_int(1))), ident("never_bound")]),
        );
        eval_expr(&mut vm, &def).unwrap();
        let result = eval_expr(&mut vm, &call_ident("f", pos_args(vec![]))).unwrap();
        assert!(matches!(result, Value::Int(1)));
    }

    #[test]
    fn test_and_or_short_circuit_the_unevaluated_side() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        // `false and <undefined>` must never evaluate the right side.
        let expr = binary(lit_bool(false), quill_syntax::ast::BinOp::And, ident("never_bound"));
        let result = eval_expr(&mut vm, &expr).unwrap();
        assert!(matches!(result, Value::Bool(false)));

        let expr = binary(lit_bool(true), quill_syntax::ast::BinOp::Or, ident("never_bound"));
        let result = eval_expr(&mut vm, &expr).unwrap();
        assert!(matches!(result, Value::Bool(true)));
    }

    #[test]
    fn test_lvalue_round_trip_through_array_at() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_ident("arr", array(vec![lit_int(1), lit_int(2), lit_int(3)]));
        eval_expr(&mut vm, &def).unwrap();

        let write = assign(call(field(ident("arr"), "at"), pos_args(vec![lit_int(1)])), lit_int(99));
        eval_expr(&mut vm, &write).unwrap();

        let result = eval_expr(&mut vm, &ident("arr")).unwrap();
        let expected = Value::Array(vec![Value::Int(1), Value::Int(99), Value::Int(3)]);
        assert!(values_equal(&result, &expected));
    }

    #[test]
    fn test_field_assignment_inserts_a_new_dict_key() {
        // `d.x = 1` on a dict that has no `x` key inserts it rather than
        // failing (spec.md §4.2's `at(target, String f)` lvalue, §8's
        // insert-or-replace round-trip invariant).
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let def = let_ident("d", dict(vec![]));
        eval_expr(&mut vm, &def).unwrap();

        let write = assign(field(ident("d"), "x"), lit_int(1));
        eval_expr(&mut vm, &write).unwrap();

        let result = eval_expr(&mut vm, &field(ident("d"), "x")).unwrap();
        assert!(matches!(result, Value::Int(1)));
    }

    #[test]
    fn test_for_loop_iterates_in_order_and_joins_results() {
        let mut host = NoHost;
        let mut vm = new_vm(&mut host);
        let loop_expr = for_(
            quill_syntax::ast::Pattern::Normal(id("i")),
            array(vec![lit_int(1), lit_int(2), lit_int(3)]),
            content_block(vec![mcode(ident("i")), mspace()]),
        );
        let result = eval_expr(&mut vm, &loop_expr).unwrap();
        let Value::Content(content) = result else { panic!("expected content") };
        assert_eq!(content.0.len(), 3);
    }

    #[test]
    fn test_numeric_literal_converts_units_to_canonical_representation() {
        let mm = numeric_value(10.0, quill_syntax::ast::Unit::Mm);
        match mm {
            Value::Length(Length::Abs(pt)) => assert!((pt - 28.346456692913385).abs() < 1e-9),
            other => panic!("expected a length, got {}", other.ty()),
        }
        let deg = numeric_value(std::f64::consts::PI, quill_syntax::ast::Unit::Rad);
        match deg {
            Value::Angle(Angle(d)) => assert!((d - 180.0).abs() < 1e-9),
            other => panic!("expected an angle, got {}", other.ty()),
        }
    }
}

fn bind_import(
    vm: &mut Vm,
    module: crate::value::Module,
    imports: &Imports,
    rename: &Option<quill_syntax::ast::Ident>,
    span: Span,
) -> SourceResult<()> {
    match imports {
        Imports::None => {
            let (name, name_span) = match rename {
                Some(ident) => (ident.name.clone(), ident.span),
                None => (module.name.clone(), span),
            };
            vm.define(name, name_span, Value::Module(module));
        }
        Imports::All => {
            for (k, v) in module.scope.iter() {
                vm.define(k.clone(), span, v.clone());
            }
        }
        Imports::Items(items) => {
            for item in items {
                let first = item.path.first().expect("import path is never empty");
                let mut value = module
                    .scope
                    .get(first.as_str())
                    .cloned()
                    .ok_or_else(|| eco_format!("module does not contain `{}`", first.as_str()))
                    .at(first.span)?;
                for seg in &item.path[1..] {
                    value = field_access(value, seg.as_str(), seg.span)?;
                }
                let bound = item.bound_name();
                vm.define(bound.name.clone(), bound.span, value);
            }
        }
    }
    Ok(())
}
