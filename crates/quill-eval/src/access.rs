//! The lvalue protocol, `updateExpression` (spec.md §4.2).

use quill_syntax::ast::{Expr, ExprKind};
use quill_syntax::Span;

use crate::code::eval_expr;
use crate::diag::{At, SourceResult};
use crate::value::Value;
use crate::vm::Vm;

/// Resolve `expr` to a mutable location, the way `p := v` needs to in
/// order to satisfy the round-trip invariant of spec.md §8.
pub fn access<'a>(vm: &'a mut Vm, expr: &Expr) -> SourceResult<&'a mut Value> {
    match &*expr.kind {
        ExprKind::Ident(ident) => {
            vm.scopes.get_mut(ident.as_str()).ok_or_else(|| crate::diag::unknown_variable(ident.as_str())).at(expr.span)
        }
        ExprKind::Parenthesized(inner) => access(vm, inner),
        ExprKind::FieldAccess { target, field } => {
            // `at(target, String f)` (spec.md §4.2's lvalue protocol):
            // insert-or-replace, matching `access_index`'s dict arm.
            let dict = access_dict(vm, target)?;
            Ok(dict.entry(field.as_str().into()).or_insert(Value::None))
        }
        ExprKind::FuncCall { callee, args } => access_call(vm, callee, args, expr.span),
        _ => {
            let _ = eval_expr(vm, expr)?;
            crate::bail!(expr.span, "cannot mutate a temporary value")
        }
    }
}

fn access_dict<'a>(vm: &'a mut Vm, target: &Expr) -> SourceResult<&'a mut crate::value::Dict> {
    match access(vm, target)? {
        Value::Dict(dict) => Ok(dict),
        value => {
            let ty = value.ty();
            crate::bail!(target.span, "cannot mutate fields on {ty}")
        }
    }
}

fn access_call<'a>(vm: &'a mut Vm, callee: &Expr, args: &quill_syntax::ast::Args, span: Span) -> SourceResult<&'a mut Value> {
    let ExprKind::FieldAccess { target, field } = &*callee.kind else {
        let _ = eval_expr(vm, &Expr::new(ExprKind::FuncCall { callee: callee.clone(), args: args.clone() }, span))?;
        crate::bail!(span, "cannot mutate a temporary value");
    };

    match field.as_str() {
        "at" => {
            let index_expr = first_positional(args).ok_or_else(|| ecow::EcoString::from("at() requires one argument")).at(span)?;
            let index = eval_expr(vm, index_expr)?;
            access_index(vm, target, index, span)
        }
        "first" => access_index(vm, target, Value::Int(0), span),
        "last" => access_index(vm, target, Value::Int(-1), span),
        _ => {
            let _ = eval_expr(vm, &Expr::new(ExprKind::FuncCall { callee: callee.clone(), args: args.clone() }, span))?;
            crate::bail!(span, "cannot mutate a temporary value")
        }
    }
}

fn first_positional(args: &quill_syntax::ast::Args) -> Option<&Expr> {
    args.items.iter().find_map(|arg| match arg {
        quill_syntax::ast::Arg::Pos(e) => Some(e),
        _ => None,
    })
}

fn access_index<'a>(vm: &'a mut Vm, target: &Expr, index: Value, span: Span) -> SourceResult<&'a mut Value> {
    match access(vm, target)? {
        Value::Array(array) => {
            let Value::Int(i) = index else {
                crate::bail!(span, "expected integer index, found {}", index.ty());
            };
            let len = array.len() as i64;
            let idx = if i < 0 { i + len } else { i };
            if idx < 0 || idx >= len {
                crate::bail!(span, "array index out of bounds (index: {i}, len: {len})");
            }
            Ok(&mut array[idx as usize])
        }
        Value::Dict(dict) => {
            let Value::Str(key) = index else {
                crate::bail!(span, "expected string key, found {}", index.ty());
            };
            Ok(dict.entry(key).or_insert(Value::None))
        }
        value => crate::bail!(span, "cannot index into {}", value.ty()),
    }
}
