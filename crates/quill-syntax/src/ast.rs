//! The AST shape produced by the (external) parser and consumed by the
//! evaluator.
//!
//! This crate does not parse anything — it only fixes the contract
//! between a parser and the evaluator, the way `typst-syntax::ast`
//! fixes the contract between the real parser and `typst-eval`. Every
//! node that carries a source position does so via a `span` field.

use ecow::EcoString;

use crate::span::Span;

/// An identifier, together with the span of its occurrence.
///
/// Equality, ordering and hashing only ever consider the name — the
/// span is provenance, not identity.
#[derive(Debug, Clone)]
pub struct Ident {
    pub name: EcoString,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<EcoString>, span: Span) -> Self {
        Self { name: name.into(), span }
    }

    pub fn detached(name: impl Into<EcoString>) -> Self {
        Self::new(name, Span::detached())
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Ident {}

impl std::hash::Hash for Ident {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A unit attached to a numeric literal (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Pt,
    Mm,
    Cm,
    In,
    Em,
    Fr,
    Rad,
    Deg,
    Percent,
}

// ---------------------------------------------------------------- Markup

/// A sequence of markup nodes (spec.md §3.1).
pub type Markup = Vec<MarkupNode>;

#[derive(Debug, Clone)]
pub struct MarkupNode {
    pub kind: MarkupKind,
    pub span: Span,
}

impl MarkupNode {
    pub fn new(kind: MarkupKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum MarkupKind {
    Text(EcoString),
    Space,
    SoftBreak,
    Nbsp,
    Shy,
    EmDash,
    EnDash,
    Ellipsis,
    /// `'"'` or `'\''`.
    Quote(char),
    ParBreak,
    HardBreak,
    Comment,
    Emph(Markup),
    Strong(Markup),
    Bracketed(Markup),
    RawBlock { lang: EcoString, text: EcoString },
    RawInline(EcoString),
    Heading { level: u32, body: Markup },
    Equation { display: bool, body: Markup },
    MFrac { num: Box<MarkupNode>, den: Box<MarkupNode> },
    MAttach {
        base: Box<MarkupNode>,
        bottom: Option<Box<MarkupNode>>,
        top: Option<Box<MarkupNode>>,
    },
    MGroup { open: Option<char>, close: Option<char>, body: Markup },
    MAlignPoint,
    Ref { ident: EcoString, supplement: Option<Box<Expr>> },
    BulletListItem(Markup),
    EnumListItem { start: Option<u64>, body: Markup },
    DescListItem { term: Markup, descr: Markup },
    Url(EcoString),
    /// Embedded code, carrying the position the expression starts at
    /// (spec.md §3.1 `Code(position, expr)`).
    Code(Span, Box<Expr>),
}

// ------------------------------------------------------------- Patterns

/// A binding target: a single name, a placeholder, or a destructuring
/// shape (spec.md §4.2 `BasicBind`/`DestructuringBind`, §4.6 parts).
#[derive(Debug, Clone)]
pub enum Pattern {
    Normal(Ident),
    Placeholder(Span),
    Destructuring(Vec<DestructPart>),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Normal(ident) => ident.span,
            Pattern::Placeholder(span) => *span,
            // The parser is responsible for handing back a span-bearing
            // wrapper if callers need one; destructuring spans are
            // derived from their parts at the call site.
            Pattern::Destructuring(_) => Span::detached(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DestructPart {
    Pattern(Pattern),
    /// `..name` (or bare `..` to discard the remainder).
    Spread(Option<Ident>, Span),
    /// `name: pattern` inside a dictionary destructuring.
    Named(Ident, Pattern),
}

// ---------------------------------------------------------------- Params

/// A closure parameter (spec.md §4.6).
#[derive(Debug, Clone)]
pub enum Param {
    Normal(Ident),
    Default(Ident, Expr),
    Destructuring(Vec<DestructPart>),
    /// `..rest`: collects the unclaimed remainder into `Arguments`.
    Sink(Option<Ident>),
    /// A placeholder parameter with no binding effect.
    Skip,
}

// ------------------------------------------------------------ Arguments

/// One argument at a call site, before evaluation.
#[derive(Debug, Clone)]
pub enum Arg {
    Pos(Expr),
    Named(Ident, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub struct Args {
    pub items: Vec<Arg>,
    pub span: Span,
}

// -------------------------------------------------------------- Imports

#[derive(Debug, Clone)]
pub enum Imports {
    /// No import list: only the module itself is bound (spec.md §4.2
    /// `Import(e, NoIdentifiers)`).
    None,
    /// `import "x.typ": *`.
    All,
    /// `import "x.typ": a, b as c`.
    Items(Vec<ImportItem>),
}

#[derive(Debug, Clone)]
pub struct ImportItem {
    pub path: Vec<Ident>,
    pub rename: Option<Ident>,
}

impl ImportItem {
    pub fn bound_name(&self) -> &Ident {
        self.rename.as_ref().unwrap_or_else(|| self.path.last().expect("empty path"))
    }
}

// ---------------------------------------------------------------- Exprs

/// Literal values that map directly onto a [`crate::Value`] kind
/// (spec.md §4.2).
#[derive(Debug, Clone)]
pub enum Literal {
    None,
    Auto,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
    /// A number with a unit suffix, e.g. `1.5em`, `90deg`, `3fr`.
    Numeric(f64, Unit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Pos,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
pub enum Block {
    /// `{ .. }`: a sequence of code expressions.
    Code(Vec<Expr>),
    /// `[ .. ]`: embedded markup, evaluated to content.
    Content(Markup),
}

/// An expression, together with the span of the source text it came
/// from (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind: Box::new(kind), span }
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Lit(Literal),
    Ident(Ident),
    Label(EcoString),
    Array(Vec<Expr>),
    Dict(Vec<(Ident, Expr)>),
    Parenthesized(Expr),

    Unary(UnOp, Expr),
    Binary(Expr, BinOp, Expr),

    Let(Pattern, Option<Expr>),
    LetFunc { name: Ident, params: Vec<Param>, body: Expr },
    Closure { name: Option<Ident>, params: Vec<Param>, body: Expr },
    Assign(Expr, Expr),

    FieldAccess { target: Expr, field: Ident },
    FuncCall { callee: Expr, args: Args },

    If(Vec<(Expr, Expr)>),
    While { condition: Expr, body: Expr },
    For { pattern: Pattern, iterable: Expr, body: Expr },
    Return(Option<Expr>),
    Continue,
    Break,

    Block(Block),

    Set { target: Expr, args: Args },
    Show { selector: Option<Expr>, body: Expr },

    Import { source: Expr, imports: Imports, rename: Option<Ident> },
    Include(Expr),
}
