//! Parameter expressions
//!
//! Template defaults, instance bindings, design tables and branch
//! predicates all share one small expression language: numbers with an
//! optional `[unit]`, identifiers, arithmetic, comparisons, boolean
//! connectives and a handful of math functions. Expressions are kept as
//! trees so they can be handed back to the host engine verbatim via
//! [`std::fmt::Display`] and evaluated locally when a predicate has to be
//! decided.

mod eval;
mod units;

pub use eval::{Evaluator, ExprError, Resolved, Scope, Value, DEFAULT_TOLERANCE};
pub use units::unit_scale;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
            BinaryOp::Pow => 7,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn is_comparison(self) -> bool {
        self.precedence() == 3
    }
}

/// Precedence of prefix operators, between products and powers
const UNARY_PRECEDENCE: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number { value: f64, unit: Option<String> },
    Ident(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { function: String, args: Vec<Expr> },
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Expr::Number { value, unit: None }
    }

    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Expr::Number {
            value,
            unit: Some(unit.into()),
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Unit of a bare literal such as `340 [deg]`
    pub fn unit(&self) -> Option<&str> {
        match self {
            Expr::Number { unit, .. } => unit.as_deref(),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.unit(),
            _ => None,
        }
    }

    /// Free identifiers referenced by the expression, in first-use order
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Number { .. } => {}
            Expr::Ident(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_identifiers(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_identifiers(names);
                rhs.collect_identifiers(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_identifiers(names);
                }
            }
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        match self {
            Expr::Number { value, unit } => {
                write!(f, "{value}")?;
                if let Some(unit) = unit {
                    write!(f, "[{unit}]")?;
                }
                Ok(())
            }
            Expr::Ident(name) => f.write_str(name),
            Expr::Unary { op, operand } => {
                let open = parent > UNARY_PRECEDENCE;
                if open {
                    f.write_str("(")?;
                }
                f.write_str(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                })?;
                operand.fmt_with(f, UNARY_PRECEDENCE)?;
                if open {
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } => {
                let own = op.precedence();
                let open = own < parent;
                let (left, right) = match op {
                    BinaryOp::Pow => (own + 1, own),
                    _ if op.is_comparison() => (own + 1, own + 1),
                    _ => (own, own + 1),
                };
                if open {
                    f.write_str("(")?;
                }
                lhs.fmt_with(f, left)?;
                write!(f, "{}", op.symbol())?;
                rhs.fmt_with(f, right)?;
                if open {
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt_with(f, 0)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Renders the expression in the host engine's expression syntax
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0)
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_expr(source).map_err(|errors| ExprError::Syntax {
            source_text: source.to_string(),
            message: errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}
