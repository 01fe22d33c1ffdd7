//! Expression evaluation over layered scopes

use std::f64::consts::PI;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use super::units::unit_scale;
use super::{BinaryOp, Expr, UnaryOp};

/// Default relative tolerance for numeric equality
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn type_name(self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
        }
    }

    pub fn as_number(self) -> Result<f64, ExprError> {
        match self {
            Value::Number(n) => Ok(n),
            other => Err(ExprError::TypeMismatch {
                expected: "number",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_bool(self) -> Result<bool, ExprError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::TypeMismatch {
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("unknown identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("unknown unit: [{unit}]")]
    UnknownUnit { unit: String },

    #[error("unknown function: {function}")]
    UnknownFunction { function: String },

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("circular reference: {}", chain.join(" -> "))]
    Circular { chain: Vec<String> },

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot parse expression '{source_text}': {message}")]
    Syntax {
        source_text: String,
        message: String,
    },
}

/// What a scope knows about a name
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// Already evaluated
    Value(Value),
    /// Evaluated on demand, against the same scope stack
    Expr(&'a Expr),
}

/// A table of named values or expressions
pub trait Scope {
    fn resolve(&self, name: &str) -> Option<Resolved<'_>>;
}

impl Scope for IndexMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.get(name).copied().map(Resolved::Value)
    }
}

impl Scope for IndexMap<String, Expr> {
    fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.get(name).map(Resolved::Expr)
    }
}

/// Evaluates expressions; earlier scopes shadow later ones.
pub struct Evaluator<'a> {
    scopes: Vec<&'a dyn Scope>,
    tolerance: f64,
}

impl Default for Evaluator<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(tolerance: f64) -> Self {
        Self {
            scopes: Vec::new(),
            tolerance,
        }
    }

    pub fn with_scope(mut self, scope: &'a dyn Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, ExprError> {
        self.eval_at(expr, &mut Vec::new())
    }

    pub fn eval_number(&self, expr: &Expr) -> Result<f64, ExprError> {
        self.eval(expr)?.as_number()
    }

    pub fn eval_predicate(&self, expr: &Expr) -> Result<bool, ExprError> {
        self.eval(expr)?.as_bool()
    }

    /// Relative equality: |a - b| <= tol * max(1, |a|, |b|)
    pub fn approx_eq(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance * 1f64.max(a.abs()).max(b.abs())
    }

    fn eval_at(&self, expr: &Expr, resolving: &mut Vec<String>) -> Result<Value, ExprError> {
        match expr {
            Expr::Number { value, unit } => match unit {
                None => Ok(Value::Number(*value)),
                Some(unit) => unit_scale(unit)
                    .map(|scale| Value::Number(value * scale))
                    .ok_or_else(|| ExprError::UnknownUnit { unit: unit.clone() }),
            },
            Expr::Ident(name) => self.lookup(name, resolving),
            Expr::Unary { op, operand } => {
                let value = self.eval_at(operand, resolving)?;
                match op {
                    UnaryOp::Neg => Ok(Value::Number(-value.as_number()?)),
                    UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, resolving),
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_at(arg, resolving)?.as_number())
                    .collect::<Result<Vec<_>, _>>()?;
                apply(function, &values).map(Value::Number)
            }
        }
    }

    fn lookup(&self, name: &str, resolving: &mut Vec<String>) -> Result<Value, ExprError> {
        if let Some(start) = resolving.iter().position(|n| n == name) {
            let mut chain = resolving[start..].to_vec();
            chain.push(name.to_string());
            return Err(ExprError::Circular { chain });
        }
        for scope in &self.scopes {
            match scope.resolve(name) {
                Some(Resolved::Value(value)) => return Ok(value),
                Some(Resolved::Expr(expr)) => {
                    resolving.push(name.to_string());
                    let value = self.eval_at(expr, resolving);
                    resolving.pop();
                    return value;
                }
                None => {}
            }
        }
        match name {
            "pi" => Ok(Value::Number(PI)),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ExprError::UnknownIdentifier {
                name: name.to_string(),
            }),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        resolving: &mut Vec<String>,
    ) -> Result<Value, ExprError> {
        // Connectives short-circuit
        match op {
            BinaryOp::And => {
                let left = self.eval_at(lhs, resolving)?.as_bool()?;
                return Ok(Value::Bool(
                    left && self.eval_at(rhs, resolving)?.as_bool()?,
                ));
            }
            BinaryOp::Or => {
                let left = self.eval_at(lhs, resolving)?.as_bool()?;
                return Ok(Value::Bool(
                    left || self.eval_at(rhs, resolving)?.as_bool()?,
                ));
            }
            _ => {}
        }

        let left = self.eval_at(lhs, resolving)?;
        let right = self.eval_at(rhs, resolving)?;

        if let (BinaryOp::Eq | BinaryOp::Ne, Value::Bool(a), Value::Bool(b)) = (op, left, right) {
            return Ok(Value::Bool((a == b) == (op == BinaryOp::Eq)));
        }

        let a = left.as_number()?;
        let b = right.as_number()?;
        let value = match op {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => {
                if b == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                Value::Number(a / b)
            }
            BinaryOp::Pow => Value::Number(a.powf(b)),
            BinaryOp::Eq => Value::Bool(self.approx_eq(a, b)),
            BinaryOp::Ne => Value::Bool(!self.approx_eq(a, b)),
            BinaryOp::Lt => Value::Bool(a < b && !self.approx_eq(a, b)),
            BinaryOp::Le => Value::Bool(a < b || self.approx_eq(a, b)),
            BinaryOp::Gt => Value::Bool(a > b && !self.approx_eq(a, b)),
            BinaryOp::Ge => Value::Bool(a > b || self.approx_eq(a, b)),
            BinaryOp::And | BinaryOp::Or => unreachable!("connectives handled above"),
        };
        Ok(value)
    }
}

/// Trigonometric functions work in degrees, matching the angle base unit
fn apply(function: &str, args: &[f64]) -> Result<f64, ExprError> {
    let expected = match function {
        "min" | "max" | "atan2" => 2,
        "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "sqrt" | "abs" | "exp" | "log"
        | "log10" | "floor" | "ceil" | "round" | "sign" => 1,
        _ => {
            return Err(ExprError::UnknownFunction {
                function: function.to_string(),
            })
        }
    };
    if args.len() != expected {
        return Err(ExprError::Arity {
            function: function.to_string(),
            expected,
            found: args.len(),
        });
    }

    let x = args[0];
    let result = match function {
        "sin" => x.to_radians().sin(),
        "cos" => x.to_radians().cos(),
        "tan" => x.to_radians().tan(),
        "asin" => x.asin().to_degrees(),
        "acos" => x.acos().to_degrees(),
        "atan" => x.atan().to_degrees(),
        "atan2" => x.atan2(args[1]).to_degrees(),
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "exp" => x.exp(),
        "log" => x.ln(),
        "log10" => x.log10(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => x.round(),
        "sign" => {
            if x == 0.0 {
                0.0
            } else {
                x.signum()
            }
        }
        "min" => x.min(args[1]),
        _ => x.max(args[1]),
    };
    Ok(result)
}
