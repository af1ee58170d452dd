//! # Expression algebra
//!
//! Closed sum types for everything the front end hands to the trigger
//! compiler, and the rules that combine and normalize them.
//!
//! ```text
//! Expression ──combine──▶ MemoryAccessor / ModifiedAccessor / MemoryValue
//!            ──compare──▶ Comparison ──normalize──▶ Comparison | Boolean
//! ```
//!
//! - [`MemoryAccessor`] - a typed read of one memory field
//! - [`ModifiedAccessor`] - an accessor scaled, divided or masked by an operand
//! - [`MemoryValue`] - a signed sum of terms plus a constant
//! - [`Comparison`] - two memory values and a relational operator

mod comparison;
mod field;
mod modifier;
mod requirement;
mod value;

pub use comparison::{normalize_comparison, Comparison};
pub use field::{
    decode_bcd, encode_bcd, Field, FieldSize, MemoryAccessor, Temporal, ValueTransform,
};
pub use modifier::{combine, combine_inverse, ModifiedAccessor, ModifierOp, ModifierOperand};
pub use requirement::{ClauseFlag, FlaggedClause, MeasuredClause, MeasuredFormat, Tally};
pub use value::{MemoryValue, RememberedValue, Sign, SignedTerm, Term};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric constant
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Number {
    /// Integer constant
    Integer(i64),
    /// Floating point constant
    Float(f64),
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Number::Integer(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Number::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
        }
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::Integer(0)
    }
}

impl Number {
    /// Whether the value is zero
    pub fn is_zero(&self) -> bool {
        match self {
            Number::Integer(v) => *v == 0,
            Number::Float(v) => *v == 0.0,
        }
    }

    /// Whether the value is one
    pub fn is_one(&self) -> bool {
        match self {
            Number::Integer(v) => *v == 1,
            Number::Float(v) => *v == 1.0,
        }
    }

    /// Whether the constant is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    /// Whether the constant has no fractional part
    pub fn is_integral(&self) -> bool {
        match self {
            Number::Integer(_) => true,
            Number::Float(v) => v.fract() == 0.0,
        }
    }

    /// Value as a float
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(v) => *v as f64,
            Number::Float(v) => *v,
        }
    }

    /// Integer value, if the constant is an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Integer(v) => Some(*v),
            Number::Float(_) => None,
        }
    }

    /// Negated value
    pub fn negate(self) -> Number {
        match self {
            Number::Integer(v) => Number::Integer(v.wrapping_neg()),
            Number::Float(v) => Number::Float(-v),
        }
    }

    /// Whether the value is below zero
    pub fn is_negative(&self) -> bool {
        self.as_f64() < 0.0
    }

    /// Sum, promoting to float when either side is a float
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Number::Integer(a.wrapping_add(b)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Difference, promoting to float when either side is a float
    pub fn sub(self, other: Number) -> Number {
        self.add(other.negate())
    }

    /// Product, promoting to float when either side is a float
    pub fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Number::Integer(a.wrapping_mul(b)),
            (a, b) => Number::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Float copy of the value
    pub fn to_float(self) -> Number {
        Number::Float(self.as_f64())
    }

    /// Expression node for the constant
    pub fn into_expression(self) -> Expression {
        match self {
            Number::Integer(v) => Expression::Integer(v),
            Number::Float(v) => Expression::Float(v),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(v) => write!(f, "{}", v),
            Number::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{:.1}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulus,
    /// `&`
    BitwiseAnd,
    /// `^`
    BitwiseXor,
}

impl MathOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Subtract => "-",
            MathOp::Multiply => "*",
            MathOp::Divide => "/",
            MathOp::Modulus => "%",
            MathOp::BitwiseAnd => "&",
            MathOp::BitwiseXor => "^",
        }
    }

    /// Verb used in error messages
    pub fn verb(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Subtract => "subtract",
            MathOp::Multiply => "multiply",
            MathOp::Divide => "divide",
            MathOp::Modulus => "modulus",
            MathOp::BitwiseAnd | MathOp::BitwiseXor => "mask",
        }
    }

    /// Whether the operator is `&` or `^`
    pub fn is_bitwise(self) -> bool {
        matches!(self, MathOp::BitwiseAnd | MathOp::BitwiseXor)
    }

    fn precedence(self) -> u8 {
        match self {
            MathOp::Add | MathOp::Subtract => 1,
            _ => 2,
        }
    }
}

/// Relational operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl ComparisonOp {
    /// Script symbol
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// Operator to use when the two sides are swapped
    pub fn flip(self) -> ComparisonOp {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Le => ComparisonOp::Ge,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Ge => ComparisonOp::Le,
            op => op,
        }
    }

    /// Operator producing the logical negation
    pub fn invert(self) -> ComparisonOp {
        match self {
            ComparisonOp::Eq => ComparisonOp::Ne,
            ComparisonOp::Ne => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::Ge,
            ComparisonOp::Le => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Le,
            ComparisonOp::Ge => ComparisonOp::Lt,
        }
    }

    /// Whether the operator depends on ordering (and can be broken by wraparound)
    pub fn is_ordered(self) -> bool {
        !matches!(self, ComparisonOp::Eq | ComparisonOp::Ne)
    }

    /// Apply the operator
    pub fn test<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            ComparisonOp::Eq => left == right,
            ComparisonOp::Ne => left != right,
            ComparisonOp::Lt => left < right,
            ComparisonOp::Le => left <= right,
            ComparisonOp::Gt => left > right,
            ComparisonOp::Ge => left >= right,
        }
    }
}

/// Logical connective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}

impl LogicalOp {
    /// Script symbol
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

/// Function call argument, optionally named (`when=...`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Parameter name for `name=value` arguments
    pub name: Option<String>,
    /// Argument expression
    pub value: Expression,
}

/// Call of a named function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// Arguments in call order
    pub args: Vec<Argument>,
}

/// Arithmetic that could not be folded into a memory value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mathematic {
    /// Left operand
    pub left: Box<Expression>,
    /// Operator
    pub op: MathOp,
    /// Right operand
    pub right: Box<Expression>,
}

/// Comparison of two unevaluated expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compare {
    /// Left operand
    pub left: Box<Expression>,
    /// Operator
    pub op: ComparisonOp,
    /// Right operand
    pub right: Box<Expression>,
}

/// `&&` / `||` over two or more operands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    /// Connective
    pub op: LogicalOp,
    /// Operands in source order
    pub operands: Vec<Expression>,
}

impl Conditional {
    /// Build a conditional, flattening nested operands with the same connective
    pub fn flattened(op: LogicalOp, operands: Vec<Expression>) -> Expression {
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Expression::Conditional(inner) if inner.op == op => flat.extend(inner.operands),
                other => flat.push(other),
            }
        }

        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expression::Conditional(Conditional { op, operands: flat })
        }
    }
}

/// Expression tree node
///
/// The front end produces literals, identifiers, calls, [`Mathematic`],
/// [`Compare`], [`Conditional`] and `Not` nodes. Evaluation replaces calls and
/// foldable arithmetic with the algebra variants (accessors, values,
/// comparisons and requirement wrappers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Integer constant
    Integer(i64),
    /// Float constant
    Float(f64),
    /// String constant
    String(String),
    /// Boolean constant; as a requirement, `always_true()` / `always_false()`
    Boolean(bool),
    /// Named constant looked up in the scope
    Identifier(String),
    /// Memory read
    Accessor(MemoryAccessor),
    /// Memory read with a modifier
    Modified(ModifiedAccessor),
    /// Sum of memory terms
    Value(MemoryValue),
    /// Arithmetic node
    Mathematic(Mathematic),
    /// Unevaluated comparison
    Compare(Compare),
    /// Evaluated comparison
    Comparison(Comparison),
    /// Logical connective
    Conditional(Conditional),
    /// Logical negation
    Not(Box<Expression>),
    /// Function call
    Call(FunctionCall),
    /// Hit-counted clause: `once`, `repeated`, `tally`
    Tally(Tally),
    /// `never`, `unless`, `trigger_when`
    Flagged(FlaggedClause),
    /// `measured`
    Measured(MeasuredClause),
}

impl Expression {
    /// Human readable kind name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Expression::Integer(_) => "integer",
            Expression::Float(_) => "float",
            Expression::String(_) => "string",
            Expression::Boolean(_) => "boolean",
            Expression::Identifier(_) => "identifier",
            Expression::Accessor(_) | Expression::Modified(_) | Expression::Value(_) => {
                "memory value"
            }
            Expression::Mathematic(_) => "mathematic",
            Expression::Compare(_) | Expression::Comparison(_) => "comparison",
            Expression::Conditional(_) | Expression::Not(_) => "condition",
            Expression::Call(_) => "function call",
            Expression::Tally(_) | Expression::Flagged(_) | Expression::Measured(_) => {
                "requirement"
            }
        }
    }

    /// Numeric constant held by the node
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Expression::Integer(v) => Some(Number::Integer(*v)),
            Expression::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    /// Whether the node reads memory
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Expression::Accessor(_)
                | Expression::Modified(_)
                | Expression::Value(_)
                | Expression::Mathematic(_)
        )
    }

    /// Whether the node can be compiled into conditions
    pub fn is_requirement(&self) -> bool {
        match self {
            Expression::Boolean(_)
            | Expression::Comparison(_)
            | Expression::Tally(_)
            | Expression::Flagged(_)
            | Expression::Measured(_) => true,
            Expression::Conditional(c) => c.operands.iter().all(Expression::is_requirement),
            Expression::Not(inner) => inner.is_requirement(),
            _ => false,
        }
    }

    /// Whether any part of the clause carries a hit target
    pub fn has_hit_target(&self) -> bool {
        match self {
            Expression::Tally(_) => true,
            Expression::Conditional(c) => c.operands.iter().any(Expression::has_hit_target),
            Expression::Not(inner) => inner.has_hit_target(),
            Expression::Flagged(f) => f.clause.has_hit_target(),
            Expression::Measured(m) => m.clause.has_hit_target(),
            _ => false,
        }
    }

    /// Logical negation of a requirement, pushed down by De Morgan's laws
    pub fn invert(&self) -> Result<Expression> {
        match self {
            Expression::Boolean(b) => Ok(Expression::Boolean(!b)),
            Expression::Comparison(c) => {
                let inverted = c.invert();
                Ok(normalize_comparison(&inverted).unwrap_or(Expression::Comparison(inverted)))
            }
            Expression::Compare(c) => Ok(Expression::Compare(Compare {
                left: c.left.clone(),
                op: c.op.invert(),
                right: c.right.clone(),
            })),
            Expression::Conditional(c) => {
                let op = match c.op {
                    LogicalOp::And => LogicalOp::Or,
                    LogicalOp::Or => LogicalOp::And,
                };
                let operands = c
                    .operands
                    .iter()
                    .map(Expression::invert)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Conditional::flattened(op, operands))
            }
            Expression::Not(inner) => Ok((**inner).clone()),
            other => Err(Error::structural(
                "Cannot negate a clause with flags or hit targets",
                other,
            )),
        }
    }

    fn math_precedence(&self) -> u8 {
        match self {
            Expression::Mathematic(m) => m.op.precedence(),
            Expression::Value(v) if v.terms.len() > 1 || !v.constant.is_zero() => 1,
            _ => 3,
        }
    }
}

impl From<MemoryAccessor> for Expression {
    fn from(accessor: MemoryAccessor) -> Self {
        Expression::Accessor(accessor)
    }
}

impl From<Comparison> for Expression {
    fn from(comparison: Comparison) -> Self {
        Expression::Comparison(comparison)
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Integer(v) => write!(f, "{}", v),
            Expression::Float(v) => write!(f, "{}", Number::Float(*v)),
            Expression::String(s) => write!(f, "\"{}\"", s),
            Expression::Boolean(true) => write!(f, "always_true()"),
            Expression::Boolean(false) => write!(f, "always_false()"),
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Accessor(a) => write!(f, "{}", a),
            Expression::Modified(m) => write!(f, "{}", m),
            Expression::Value(v) => write!(f, "{}", v),
            Expression::Mathematic(m) => {
                let precedence = m.op.precedence();
                write_operand(f, &m.left, m.left.math_precedence() < precedence)?;
                write!(f, " {} ", m.op.symbol())?;
                write_operand(f, &m.right, m.right.math_precedence() <= precedence)
            }
            Expression::Compare(c) => write!(f, "{} {} {}", c.left, c.op.symbol(), c.right),
            Expression::Comparison(c) => write!(f, "{}", c),
            Expression::Conditional(c) => {
                for (i, operand) in c.operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", c.op.symbol())?;
                    }
                    let nested = matches!(operand, Expression::Conditional(inner) if inner.op != c.op);
                    write_operand(f, operand, nested)?;
                }
                Ok(())
            }
            Expression::Not(inner) => {
                let nested = matches!(
                    inner.as_ref(),
                    Expression::Conditional(_) | Expression::Compare(_) | Expression::Comparison(_)
                );
                write!(f, "!")?;
                write_operand(f, inner, nested)
            }
            Expression::Call(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(name) = &arg.name {
                        write!(f, "{}=", name)?;
                    }
                    write!(f, "{}", arg.value)?;
                }
                write!(f, ")")
            }
            Expression::Tally(t) => write!(f, "{}", t),
            Expression::Flagged(c) => write!(f, "{}", c),
            Expression::Measured(m) => write!(f, "{}", m),
        }
    }
}
