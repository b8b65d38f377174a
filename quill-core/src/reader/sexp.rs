//! Guest AST: located s-expressions

use crate::location::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SexpKind {
    List(Vec<Sexp>),
    Vector(Vec<Sexp>),
    Map(Vec<Sexp>),
    Symbol(String),
    Keyword(String),
    Str(String),
    /// Numeric literal, kept as written
    Number(String),
    Bool(bool),
    Nil,
}

/// One AST node
///
/// The location is optional so rewrite passes can build nodes first and
/// attach provenance afterwards; `location()` never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Sexp {
    pub kind: SexpKind,
    loc: Option<SourceLocation>,
}

impl Sexp {
    pub fn new(kind: SexpKind) -> Self {
        Self { kind, loc: None }
    }

    pub fn located(kind: SexpKind, loc: SourceLocation) -> Self {
        Self {
            kind,
            loc: Some(loc),
        }
    }

    pub fn symbol(name: &str) -> Self {
        Self::new(SexpKind::Symbol(name.to_string()))
    }

    pub fn list(items: Vec<Sexp>) -> Self {
        Self::new(SexpKind::List(items))
    }

    pub fn nil() -> Self {
        Self::new(SexpKind::Nil)
    }

    /// Build a node derived from `self`, copying its location
    pub fn derive(&self, kind: SexpKind) -> Sexp {
        Sexp {
            kind,
            loc: self.loc.clone(),
        }
    }

    /// Attach a location only if none is present yet
    pub fn attach_location(&mut self, loc: &SourceLocation) {
        if self.loc.is_none() {
            self.loc = Some(loc.clone());
        }
    }

    /// Attach `loc` to this node and every unlocated descendant
    ///
    /// Located descendants pass their own location further down.
    pub fn fill_locations(&mut self, loc: &SourceLocation) {
        self.attach_location(loc);
        let own = self.location();
        if let Some(children) = self.children_mut() {
            for child in children {
                child.fill_locations(&own);
            }
        }
    }

    pub fn has_location(&self) -> bool {
        self.loc.is_some()
    }

    pub fn location(&self) -> SourceLocation {
        self.loc.clone().unwrap_or_default()
    }

    pub fn location_ref(&self) -> Option<&SourceLocation> {
        self.loc.as_ref()
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match &self.kind {
            SexpKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Sexp]> {
        match &self.kind {
            SexpKind::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Head symbol of a non-empty list
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_symbol()
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Sexp>> {
        match &mut self.kind {
            SexpKind::List(items) | SexpKind::Vector(items) | SexpKind::Map(items) => Some(items),
            _ => None,
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Sexp], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SexpKind::List(items) => write_seq(f, "(", items, ")"),
            SexpKind::Vector(items) => write_seq(f, "[", items, "]"),
            SexpKind::Map(items) => write_seq(f, "{", items, "}"),
            SexpKind::Symbol(name) => f.write_str(name),
            SexpKind::Keyword(name) => write!(f, ":{}", name),
            SexpKind::Str(text) => write!(f, "{:?}", text),
            SexpKind::Number(text) => f.write_str(text),
            SexpKind::Bool(b) => write!(f, "{}", b),
            SexpKind::Nil => f.write_str("nil"),
        }
    }
}
