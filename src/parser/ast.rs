//! Abstract Syntax Tree types for the cuff template language

use crate::expr::Expr;
use crate::template::GeomValue;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a catalog of part templates
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub templates: Vec<Spanned<TemplateDecl>>,
}

/// `template Name (params) { items }`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub name: Spanned<Identifier>,
    pub parameters: Vec<ParameterDef>,
    pub body: Vec<TemplateItem>,
}

/// `Name: default`
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub name: Spanned<Identifier>,
    pub default_value: Spanned<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateItem {
    Selection(Spanned<SelectionDecl>),
    Step(Spanned<StepDecl>),
}

/// `selection NAME "display label" [keep, source]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDecl {
    pub name: Spanned<Identifier>,
    pub display: Option<Spanned<String>>,
    pub flags: Vec<Spanned<Identifier>>,
}

/// `key: value` inside a primitive's geometry block
#[derive(Debug, Clone, PartialEq)]
pub struct GeomArg {
    pub key: Spanned<Identifier>,
    pub value: Spanned<GeomValue>,
}

/// A construction step as written in source
#[derive(Debug, Clone, PartialEq)]
pub enum StepDecl {
    /// `shape "label" INPUTS -> TARGET [geometry]`
    Primitive {
        shape: Spanned<Identifier>,
        label: Option<Spanned<String>>,
        inputs: Vec<Spanned<Identifier>>,
        target: Option<Spanned<Identifier>>,
        geometry: Vec<GeomArg>,
    },
    /// `union "label" A, B -> T`
    Union {
        label: Option<Spanned<String>>,
        inputs: Vec<Spanned<Identifier>>,
        target: Spanned<Identifier>,
    },
    /// `difference "label" A - B -> T`
    Difference {
        label: Option<Spanned<String>>,
        primary: Spanned<Identifier>,
        subtract: Spanned<Identifier>,
        target: Spanned<Identifier>,
    },
    /// `partition "label" D by T -> X`
    Partition {
        label: Option<Spanned<String>>,
        domain: Spanned<Identifier>,
        tool: Spanned<Identifier>,
        target: Spanned<Identifier>,
    },
    /// `delete "label" R from T`
    Delete {
        label: Option<Spanned<String>>,
        remove: Spanned<Identifier>,
        target: Spanned<Identifier>,
    },
    /// `if p { .. } elif q { .. } else { .. }`
    Conditional {
        branches: Vec<BranchDecl>,
        otherwise: Option<Vec<Spanned<StepDecl>>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchDecl {
    pub predicate: Spanned<Expr>,
    pub body: Vec<Spanned<StepDecl>>,
}
