//! The value universe (spec.md §3.3).

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;

use ecow::{eco_format, EcoString};
use indexmap::IndexMap;
use quill_syntax::ast::Param;
use quill_syntax::Span;

use crate::diag::SourceResult;
use crate::scope::{Scope, ScopeKind};
use crate::vm::Vm;

/// A computational value.
#[derive(Clone)]
pub enum Value {
    None,
    Auto,
    Bool(bool),
    Int(i64),
    Float(f64),
    Ratio(Ratio),
    Str(EcoString),
    Regex(regex::Regex),
    Content(Content),
    Array(Array),
    Dict(Dict),
    Func(Func),
    Symbol(Symbol),
    Module(Module),
    Label(Label),
    Selector(Selector),
    Counter(Counter),
    Args(Arguments),
    Color(Color),
    Alignment(Alignment),
    Length(Length),
    Angle(Angle),
    Fraction(Fraction),
    TermItem(TermItem),
}

pub type Array = Vec<Value>;
pub type Dict = IndexMap<EcoString, Value>;

impl Value {
    pub fn ty(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Auto => "auto",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Ratio(_) => "ratio",
            Value::Str(_) => "string",
            Value::Regex(_) => "regex",
            Value::Content(_) => "content",
            Value::Array(_) => "array",
            Value::Dict(_) => "dictionary",
            Value::Func(_) => "function",
            Value::Symbol(_) => "symbol",
            Value::Module(_) => "module",
            Value::Label(_) => "label",
            Value::Selector(_) => "selector",
            Value::Counter(_) => "counter",
            Value::Args(_) => "arguments",
            Value::Color(_) => "color",
            Value::Alignment(_) => "alignment",
            Value::Length(_) => "length",
            Value::Angle(_) => "angle",
            Value::Fraction(_) => "fraction",
            Value::TermItem(_) => "term item",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Canonical textual representation, used by §4.5 value-to-content
    /// coercion and by diagnostics.
    pub fn repr(&self) -> EcoString {
        match self {
            Value::None => "none".into(),
            Value::Auto => "auto".into(),
            Value::Bool(b) => if *b { "true" } else { "false" }.into(),
            Value::Int(i) => eco_format!("{i}"),
            Value::Float(f) => repr_float(*f),
            Value::Ratio(r) => eco_format!("{}%", repr_float(r.0 * 100.0)),
            Value::Str(s) => s.clone(),
            Value::Regex(r) => eco_format!("regex({:?})", r.as_str()),
            Value::Content(_) => "content".into(),
            Value::Array(items) => {
                let mut out = EcoString::from("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&item.repr());
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                out
            }
            Value::Dict(map) => {
                if map.is_empty() {
                    return "(:)".into();
                }
                let mut out = EcoString::from("(");
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{k}: {}", v.repr());
                }
                out.push(')');
                out
            }
            Value::Func(f) => eco_format!("{}", f.name().unwrap_or("anonymous")),
            Value::Symbol(s) => s.text.clone(),
            Value::Module(m) => eco_format!("<module {}>", m.name),
            Value::Label(l) => eco_format!("<{}>", l.0),
            Value::Selector(_) => "selector".into(),
            Value::Counter(c) => eco_format!("counter({:?})", c.key),
            Value::Args(_) => "arguments".into(),
            Value::Color(c) => c.repr(),
            Value::Alignment(a) => a.repr(),
            Value::Length(l) => l.repr(),
            Value::Angle(a) => eco_format!("{}deg", repr_float(a.0)),
            Value::Fraction(f) => eco_format!("{}fr", repr_float(f.0)),
            Value::TermItem(_) => "term item".into(),
        }
    }
}

fn repr_float(f: f64) -> EcoString {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        eco_format!("{}", f as i64)
    } else {
        eco_format!("{f}")
    }
}

/// An exact-ish rational in `[0, ∞)`-or-negative proportion space,
/// e.g. `50%` → `Ratio(0.5)`.
#[derive(Debug, Clone, Copy)]
pub struct Ratio(pub f64);

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// A length: an absolute distance or a font-relative (`em`) one.
/// `Abs` and `Em` stay distinct units; combining them would need a
/// richer relative-length type this evaluator has no use for, since
/// layout is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    /// Stored as points.
    Abs(f64),
    Em(f64),
}

impl Length {
    pub fn repr(&self) -> EcoString {
        match self {
            Length::Abs(pt) => eco_format!("{}pt", repr_float(*pt)),
            Length::Em(em) => eco_format!("{}em", repr_float(*em)),
        }
    }
}

/// An angle, canonically stored in degrees (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angle(pub f64);

/// A fraction, e.g. `1fr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fraction(pub f64);

/// A label, e.g. `<intro>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub EcoString);

/// A counter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Counter {
    pub key: EcoString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Horizon,
    Bottom,
}

/// `left`, `top + right`, … Addition merges componentwise, first
/// value wins per component (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alignment {
    pub horiz: Option<HAlign>,
    pub vert: Option<VAlign>,
}

impl Alignment {
    pub fn merge(self, other: Alignment) -> Alignment {
        Alignment {
            horiz: self.horiz.or(other.horiz),
            vert: self.vert.or(other.vert),
        }
    }

    pub fn repr(&self) -> EcoString {
        let h = self.horiz.map(|h| match h {
            HAlign::Left => "left",
            HAlign::Center => "center",
            HAlign::Right => "right",
        });
        let v = self.vert.map(|v| match v {
            VAlign::Top => "top",
            VAlign::Horizon => "horizon",
            VAlign::Bottom => "bottom",
        });
        match (h, v) {
            (Some(h), Some(v)) => eco_format!("{h} + {v}"),
            (Some(h), None) => h.into(),
            (None, Some(v)) => v.into(),
            (None, None) => "auto".into(),
        }
    }
}

/// A color in one of three native spaces. Method bodies (darken,
/// lighten, negate) operate componentwise in whichever space the
/// value is already in (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Rgb { r: u8, g: u8, b: u8, a: u8 },
    Cmyk { c: f32, m: f32, y: f32, k: f32 },
    Luma(u8),
}

impl Color {
    pub fn repr(&self) -> EcoString {
        match self {
            Color::Rgb { r, g, b, a } => eco_format!("rgb({r}, {g}, {b}, {a})"),
            Color::Cmyk { c, m, y, k } => eco_format!("cmyk({c}, {m}, {y}, {k})"),
            Color::Luma(l) => eco_format!("luma({l})"),
        }
    }

    pub fn darken(self, amount: f64) -> Color {
        let amount = amount.clamp(0.0, 1.0);
        match self {
            Color::Rgb { r, g, b, a } => Color::Rgb {
                r: scale_channel(r, 1.0 - amount),
                g: scale_channel(g, 1.0 - amount),
                b: scale_channel(b, 1.0 - amount),
                a,
            },
            Color::Luma(l) => Color::Luma(scale_channel(l, 1.0 - amount)),
            Color::Cmyk { c, m, y, k } => Color::Cmyk {
                c,
                m,
                y,
                k: (k + (1.0 - k) as f64 * amount) as f32,
            },
        }
    }

    pub fn lighten(self, amount: f64) -> Color {
        let amount = amount.clamp(0.0, 1.0);
        match self {
            Color::Rgb { r, g, b, a } => Color::Rgb {
                r: lighten_channel(r, amount),
                g: lighten_channel(g, amount),
                b: lighten_channel(b, amount),
                a,
            },
            Color::Luma(l) => Color::Luma(lighten_channel(l, amount)),
            Color::Cmyk { c, m, y, k } => Color::Cmyk {
                c: c * (1.0 - amount as f32),
                m: m * (1.0 - amount as f32),
                y: y * (1.0 - amount as f32),
                k,
            },
        }
    }

    pub fn negate(self) -> Color {
        match self {
            Color::Rgb { r, g, b, a } => {
                Color::Rgb { r: 255 - r, g: 255 - g, b: 255 - b, a }
            }
            Color::Luma(l) => Color::Luma(255 - l),
            Color::Cmyk { c, m, y, k } => Color::Cmyk {
                c: 1.0 - c,
                m: 1.0 - m,
                y: 1.0 - y,
                k: 1.0 - k,
            },
        }
    }
}

fn scale_channel(v: u8, factor: f64) -> u8 {
    ((v as f64) * factor).round().clamp(0.0, 255.0) as u8
}

fn lighten_channel(v: u8, amount: f64) -> u8 {
    (v as f64 + (255.0 - v as f64) * amount).round().clamp(0.0, 255.0) as u8
}

/// A symbol with alternate glyph variants keyed by tag sets, e.g.
/// `arrow.l.squiggly` (spec.md §3.3, §4.2 field access resolution).
#[derive(Debug, Clone)]
pub struct Symbol {
    pub text: EcoString,
    pub is_accent: bool,
    pub variants: Vec<(Vec<EcoString>, EcoString)>,
}

impl Symbol {
    pub fn bare(text: impl Into<EcoString>) -> Self {
        Self { text: text.into(), is_accent: false, variants: Vec::new() }
    }

    /// Resolve `.field` against the variant table: the smallest tag
    /// set containing `field` wins, ties broken by source order
    /// (spec.md §3.3, §9).
    pub fn resolve(&self, field: &str) -> Option<&EcoString> {
        self.variants
            .iter()
            .filter(|(tags, _)| tags.iter().any(|t| t == field))
            .min_by_key(|(tags, _)| tags.len())
            .map(|(_, text)| text)
    }
}

/// A module: a named, read-only export scope (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct Module {
    pub name: EcoString,
    pub scope: Rc<IndexMap<EcoString, Value>>,
}

/// A content selector (spec.md §4.4). Matching is implemented in
/// `crate::selector`.
#[derive(Debug, Clone)]
pub enum Selector {
    Element(EcoString, Vec<(EcoString, Value)>),
    Str(EcoString),
    Regex(regex::Regex),
    Label(EcoString),
    Or(Box<Selector>, Box<Selector>),
    And(Box<Selector>, Box<Selector>),
    Before(Box<Selector>, Box<Selector>),
    After(Box<Selector>, Box<Selector>),
}

/// Captured call arguments, the value form of a call's argument list
/// (spec.md §3.3). Positional order matters; named entries form an
/// ordered map with last-write-wins semantics.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: IndexMap<EcoString, Value>,
    pub span: Span,
}

impl Arguments {
    pub fn new(span: Span) -> Self {
        Self { positional: Vec::new(), named: IndexMap::new(), span }
    }

    pub fn push_positional(&mut self, value: Value) {
        self.positional.push(value);
    }

    pub fn push_named(&mut self, name: EcoString, value: Value) {
        self.named.insert(name, value);
    }

    pub fn insert_front(&mut self, value: Value) {
        self.positional.insert(0, value);
    }

    /// Left-biased positional append, right-wins named merge
    /// (spec.md §3.3) — used both for `Arguments + Arguments` and for
    /// merging `set` defaults under call-site arguments (spec.md
    /// §4.3).
    pub fn concat(defaults: Arguments, overrides: Arguments) -> Arguments {
        let mut positional = defaults.positional;
        positional.extend(overrides.positional);
        let mut named = defaults.named;
        for (k, v) in overrides.named {
            named.insert(k, v);
        }
        Arguments { positional, named, span: overrides.span }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// A `term(..)` pair produced by a description-list item (spec.md
/// §3.3, §4.1).
#[derive(Debug, Clone)]
pub struct TermItem {
    pub term: Content,
    pub descr: Content,
}

// --------------------------------------------------------------- Content

/// The output tree: an ordered sequence of content nodes (spec.md
/// §3.2).
#[derive(Debug, Clone, Default)]
pub struct Content(pub Vec<ContentNode>);

#[derive(Debug, Clone)]
pub enum ContentNode {
    Txt(EcoString),
    Elt(Elt),
}

#[derive(Debug, Clone)]
pub struct Elt {
    pub name: EcoString,
    pub label: Option<EcoString>,
    pub fields: IndexMap<EcoString, Value>,
}

// ----------------------------------------------------------------- Func

/// A callable value (spec.md §3.3). `element_name` is set exactly
/// when the function participates in style merging as that element
/// (spec.md §3.3 invariant, §4.3).
#[derive(Clone)]
pub struct Func {
    pub element_name: Option<EcoString>,
    /// The scope a `FieldAccess` on this function resolves against
    /// (spec.md §4.2 "look up f in the function's captured scope
    /// map").
    pub captured: Rc<IndexMap<EcoString, Value>>,
    pub repr: FuncRepr,
}

#[derive(Clone)]
pub enum FuncRepr {
    Native(Rc<NativeFunc>),
    Closure(Rc<Closure>),
}

pub struct NativeFunc {
    pub name: EcoString,
    #[allow(clippy::type_complexity)]
    pub call: Box<dyn Fn(&mut Vm, Arguments, Span) -> SourceResult<Value>>,
}

pub struct Closure {
    pub name: Option<EcoString>,
    pub params: Vec<Param>,
    pub body: ClosureBody,
    /// The environment stack snapshot taken at definition time
    /// (spec.md §4.6).
    pub captured: Vec<(ScopeKind, Scope)>,
}

#[derive(Clone)]
pub enum ClosureBody {
    Expr(quill_syntax::ast::Expr),
}

impl Func {
    pub fn native(
        name: impl Into<EcoString>,
        call: impl Fn(&mut Vm, Arguments, Span) -> SourceResult<Value> + 'static,
    ) -> Self {
        Self {
            element_name: None,
            captured: Rc::new(IndexMap::new()),
            repr: FuncRepr::Native(Rc::new(NativeFunc { name: name.into(), call: Box::new(call) })),
        }
    }

    pub fn element(
        name: impl Into<EcoString>,
        call: impl Fn(&mut Vm, Arguments, Span) -> SourceResult<Value> + 'static,
    ) -> Self {
        let name = name.into();
        let mut f = Self::native(name.clone(), call);
        f.element_name = Some(name);
        f
    }

    pub fn name(&self) -> Option<&str> {
        match &self.repr {
            FuncRepr::Native(native) => Some(native.name.as_str()),
            FuncRepr::Closure(closure) => closure.name.as_deref(),
        }
    }

    pub fn call(&self, vm: &mut Vm, args: Arguments, span: Span) -> SourceResult<Value> {
        match &self.repr {
            FuncRepr::Native(native) => (native.call)(vm, args, span),
            FuncRepr::Closure(closure) => crate::call::call_closure(vm, self, closure, args, span),
        }
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Func({})", self.name().unwrap_or("anonymous"))
    }
}

/// Three-valued comparison (spec.md §4.2). `None` (`Undefined`) means
/// the two values are not comparable at all.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (None, None) => Some(Ordering::Equal),
        (Auto, Auto) => Some(Ordering::Equal),
        (Bool(a), Bool(b)) => a.partial_cmp(b),
        (Int(a), Int(b)) => a.partial_cmp(b),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
        (Ratio(a), Ratio(b)) => a.0.partial_cmp(&b.0),
        (Str(a), Str(b)) => a.partial_cmp(b),
        (Length(Length::Abs(a)), Length(Length::Abs(b))) => a.partial_cmp(b),
        (Length(Length::Em(a)), Length(Length::Em(b))) => a.partial_cmp(b),
        (Angle(a), Angle(b)) => a.0.partial_cmp(&b.0),
        (Fraction(a), Fraction(b)) => a.0.partial_cmp(&b.0),
        (Label(a), Label(b)) if a == b => Some(Ordering::Equal),
        (Color(a), Color(b)) if a == b => Some(Ordering::Equal),
        (Alignment(a), Alignment(b)) if a == b => Some(Ordering::Equal),
        (Array(a), Array(b)) => {
            if a.len() != b.len() {
                return None;
            }
            for (x, y) in a.iter().zip(b.iter()) {
                match compare(x, y) {
                    Some(Ordering::Equal) => continue,
                    _ => return None,
                }
            }
            Some(Ordering::Equal)
        }
        (Symbol(a), Symbol(b)) if a.text == b.text => Some(Ordering::Equal),
        (Regex(a), Regex(b)) if a.as_str() == b.as_str() => Some(Ordering::Equal),
        _ => None,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}
