//! Shared AST-builder helpers for unit tests.
//!
//! There is no parser in this crate (spec.md §1), so every test drives
//! the evaluator with a hand-built [`quill_syntax::ast`] tree instead of
//! source text. These constructors keep that hand-building terse; they
//! are not meant to cover every AST shape, only the ones the test
//! suites actually exercise.

#![cfg(test)]

use ecow::EcoString;
use quill_syntax::ast::{
    Arg, Args, BinOp, Block, DestructPart, Expr, ExprKind, Ident, Imports, Literal, MarkupKind,
    MarkupNode, Param, Pattern, Unit,
};
use quill_syntax::Span;

use crate::scope::Scopes;
use crate::vm::{Host, Vm};

pub fn id(name: &str) -> Ident {
    Ident::detached(name)
}

pub fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::detached())
}

pub fn lit_none() -> Expr {
    expr(ExprKind::Lit(Literal::None))
}

pub fn lit_bool(b: bool) -> Expr {
    expr(ExprKind::Lit(Literal::Bool(b)))
}

pub fn lit_int(i: i64) -> Expr {
    expr(ExprKind::Lit(Literal::Int(i)))
}

pub fn lit_float(f: f64) -> Expr {
    expr(ExprKind::Lit(Literal::Float(f)))
}

pub fn lit_str(s: &str) -> Expr {
    expr(ExprKind::Lit(Literal::Str(EcoString::from(s))))
}

pub fn lit_numeric(v: f64, unit: Unit) -> Expr {
    expr(ExprKind::Lit(Literal::Numeric(v, unit)))
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Ident(id(name)))
}

pub fn array(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Array(items))
}

pub fn dict(items: Vec<(&str, Expr)>) -> Expr {
    expr(ExprKind::Dict(items.into_iter().map(|(k, v)| (id(k), v)).collect()))
}

pub fn unary(op: quill_syntax::ast::UnOp, inner: Expr) -> Expr {
    expr(ExprKind::Unary(op, inner))
}

pub fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    expr(ExprKind::Binary(lhs, op, rhs))
}

pub fn let_(pattern: Pattern, init: Option<Expr>) -> Expr {
    expr(ExprKind::Let(pattern, init))
}

pub fn let_ident(name: &str, init: Expr) -> Expr {
    let_(Pattern::Normal(id(name)), Some(init))
}

pub fn let_func(name: &str, params: Vec<Param>, body: Expr) -> Expr {
    expr(ExprKind::LetFunc { name: id(name), params, body })
}

pub fn closure(name: Option<&str>, params: Vec<Param>, body: Expr) -> Expr {
    expr(ExprKind::Closure { name: name.map(id), params, body })
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    expr(ExprKind::Assign(target, value))
}

pub fn field(target: Expr, field_name: &str) -> Expr {
    expr(ExprKind::FieldAccess { target, field: id(field_name) })
}

pub fn pos_args(items: Vec<Expr>) -> Args {
    Args { items: items.into_iter().map(Arg::Pos).collect(), span: Span::detached() }
}

pub fn named_args(items: Vec<(&str, Expr)>) -> Args {
    Args { items: items.into_iter().map(|(k, v)| Arg::Named(id(k), v)).collect(), span: Span::detached() }
}

pub fn call(callee: Expr, args: Args) -> Expr {
    expr(ExprKind::FuncCall { callee, args })
}

pub fn call_ident(name: &str, args: Args) -> Expr {
    call(ident(name), args)
}

pub fn if_(arms: Vec<(Expr, Expr)>) -> Expr {
    expr(ExprKind::If(arms))
}

pub fn while_(condition: Expr, body: Expr) -> Expr {
    expr(ExprKind::While { condition, body })
}

pub fn for_(pattern: Pattern, iterable: Expr, body: Expr) -> Expr {
    expr(ExprKind::For { pattern, iterable, body })
}

pub fn return_(value: Option<Expr>) -> Expr {
    expr(ExprKind::Return(value))
}

pub fn continue_() -> Expr {
    expr(ExprKind::Continue)
}

pub fn break_() -> Expr {
    expr(ExprKind::Break)
}

pub fn code_block(exprs: Vec<Expr>) -> Expr {
    expr(ExprKind::Block(Block::Code(exprs)))
}

pub fn content_block(markup: Vec<MarkupNode>) -> Expr {
    expr(ExprKind::Block(Block::Content(markup)))
}

pub fn set_(target: Expr, args: Args) -> Expr {
    expr(ExprKind::Set { target, args })
}

pub fn show_(selector: Option<Expr>, body: Expr) -> Expr {
    expr(ExprKind::Show { selector, body })
}

pub fn import_(source: Expr, imports: Imports, rename: Option<&str>) -> Expr {
    expr(ExprKind::Import { source, imports, rename: rename.map(id) })
}

pub fn include_(source: Expr) -> Expr {
    expr(ExprKind::Include(source))
}

pub fn destructure(parts: Vec<DestructPart>) -> Pattern {
    Pattern::Destructuring(parts)
}

pub fn part(name: &str) -> DestructPart {
    DestructPart::Pattern(Pattern::Normal(id(name)))
}

pub fn spread(name: Option<&str>) -> DestructPart {
    DestructPart::Spread(name.map(id), Span::detached())
}

// ------------------------------------------------------------- Markup

pub fn mnode(kind: MarkupKind) -> MarkupNode {
    MarkupNode::new(kind, Span::detached())
}

pub fn mtext(s: &str) -> MarkupNode {
    mnode(MarkupKind::Text(EcoString::from(s)))
}

pub fn mspace() -> MarkupNode {
    mnode(MarkupKind::Space)
}

pub fn msoftbreak() -> MarkupNode {
    mnode(MarkupKind::SoftBreak)
}

pub fn mquote(c: char) -> MarkupNode {
    mnode(MarkupKind::Quote(c))
}

pub fn mcode(e: Expr) -> MarkupNode {
    mnode(MarkupKind::Code(Span::detached(), Box::new(e)))
}

pub fn mstrong(body: Vec<MarkupNode>) -> MarkupNode {
    mnode(MarkupKind::Strong(body))
}

pub fn memph(body: Vec<MarkupNode>) -> MarkupNode {
    mnode(MarkupKind::Emph(body))
}

pub fn mparbreak() -> MarkupNode {
    mnode(MarkupKind::ParBreak)
}

pub fn mbullet(body: Vec<MarkupNode>) -> MarkupNode {
    mnode(MarkupKind::BulletListItem(body))
}

// ----------------------------------------------------------------- Host

/// A host with no filesystem and no parser — good enough for any test
/// that never touches `import`/`include`/`eval`.
pub struct NoHost;

impl Host for NoHost {
    fn load_source(&mut self, _base: &str, _path: &str) -> Result<(EcoString, EcoString), EcoString> {
        Err("no filesystem in this test".into())
    }

    fn parse(&mut self, _text: &str) -> Result<quill_syntax::ast::Markup, EcoString> {
        Err("no parser in this test".into())
    }

    fn current_time(&mut self) -> i64 {
        1_700_000_000
    }
}

/// A host whose `parse` is a fixed lookup table keyed by source text,
/// standing in for a real parser in tests that exercise `import`,
/// `include`, or `eval`.
pub struct FixtureHost {
    pub files: Vec<(&'static str, quill_syntax::ast::Markup)>,
}

impl Host for FixtureHost {
    fn load_source(&mut self, base: &str, path: &str) -> Result<(EcoString, EcoString), EcoString> {
        let _ = base;
        Ok((EcoString::from(path), EcoString::from(path)))
    }

    fn parse(&mut self, text: &str) -> Result<quill_syntax::ast::Markup, EcoString> {
        self.files
            .iter()
            .find(|(key, _)| *key == text)
            .map(|(_, markup)| markup.clone())
            .ok_or_else(|| ecow::eco_format!("no fixture registered for {text:?}"))
    }

    fn current_time(&mut self) -> i64 {
        1_700_000_000
    }
}

/// A fresh [`Vm`] with the builtin element set installed, the way
/// [`crate::evaluate_typst`] sets one up before walking the document.
pub fn new_vm(host: &mut dyn Host) -> Vm<'_> {
    let mut vm = Vm::new(host, "test.typ", ".");
    crate::elements::install(&mut vm.scopes);
    vm
}

pub fn scopes_with(bindings: Vec<(&str, crate::value::Value)>) -> Scopes {
    let mut scopes = Scopes::new();
    for (name, value) in bindings {
        scopes.bind(EcoString::from(name), value);
    }
    scopes
}
