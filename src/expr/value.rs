//! Signed sums of memory terms

use super::field::MemoryAccessor;
use super::modifier::{ModifiedAccessor, ModifierOp, ModifierOperand};
use super::{Expression, MathOp, Number};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sign of a term inside a [`MemoryValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    /// Term is added
    Add,
    /// Term is subtracted
    Subtract,
}

impl Sign {
    /// The opposite sign
    pub fn negate(self) -> Sign {
        match self {
            Sign::Add => Sign::Subtract,
            Sign::Subtract => Sign::Add,
        }
    }

    /// Sign of the product of two signs
    pub fn combine(self, other: Sign) -> Sign {
        if self == other {
            Sign::Add
        } else {
            Sign::Subtract
        }
    }

    fn factor(self) -> i64 {
        match self {
            Sign::Add => 1,
            Sign::Subtract => -1,
        }
    }
}

/// Intermediate value that is captured with `Remember` and modified through `{recall}`
///
/// Produced for arithmetic the engine cannot express on a single operand,
/// such as `(byte(1) + byte(2)) / 2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RememberedValue {
    /// Captured sum
    pub value: Box<MemoryValue>,
    /// Operation applied to the recalled value
    pub op: ModifierOp,
    /// Constant operand
    pub operand: Number,
}

/// One operand of a memory sum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Plain memory read
    Accessor(MemoryAccessor),
    /// Memory read with a modifier
    Modified(ModifiedAccessor),
    /// Remembered intermediate value
    Remembered(RememberedValue),
}

impl Term {
    /// Whether the term produces a float
    pub fn is_float(&self) -> bool {
        match self {
            Term::Accessor(a) => a.is_float(),
            Term::Modified(m) => m.is_float(),
            Term::Remembered(r) => r.value.is_float() || r.operand.is_float(),
        }
    }

    /// Pointer base of the term, if indirect
    pub fn pointer(&self) -> Option<&MemoryValue> {
        match self {
            Term::Accessor(a) => a.pointer(),
            Term::Modified(m) => m.accessor.pointer(),
            Term::Remembered(_) => None,
        }
    }

    /// Plain accessor, if the term has no modifier
    pub fn as_accessor(&self) -> Option<&MemoryAccessor> {
        match self {
            Term::Accessor(a) => Some(a),
            _ => None,
        }
    }

    /// Largest value the term can produce, if bounded within 32 bits
    pub fn max_value(&self) -> Option<u64> {
        let max = match self {
            Term::Accessor(a) => a.max_value() as u64,
            Term::Modified(m) => m.max_value()?,
            Term::Remembered(r) => {
                let (min, max) = r.value.range()?;
                if min < 0 {
                    return None;
                }
                let max = max as u64;
                match (r.op, r.operand) {
                    (ModifierOp::Multiply, Number::Integer(k)) if k >= 0 => max.checked_mul(k as u64)?,
                    (ModifierOp::Divide, Number::Integer(k)) if k > 0 => max / k as u64,
                    (ModifierOp::Modulus, Number::Integer(k)) if k > 0 => max.min(k as u64 - 1),
                    (ModifierOp::BitwiseAnd, Number::Integer(k)) if k >= 0 => max.min(k as u64),
                    _ => return None,
                }
            }
        };

        if max > u32::MAX as u64 {
            None
        } else {
            Some(max)
        }
    }

    /// Base accessor and integer multiplier, for merging like terms
    fn coefficient(&self) -> Option<(&MemoryAccessor, i64)> {
        match self {
            Term::Accessor(a) => Some((a, 1)),
            Term::Modified(ModifiedAccessor {
                accessor,
                op: ModifierOp::Multiply,
                operand: ModifierOperand::Constant(Number::Integer(k)),
            }) if *k > 0 => Some((accessor, *k)),
            _ => None,
        }
    }

    /// Term reading `accessor * factor`
    pub fn scaled(accessor: MemoryAccessor, factor: i64) -> Term {
        if factor == 1 {
            Term::Accessor(accessor)
        } else {
            Term::Modified(ModifiedAccessor {
                accessor,
                op: ModifierOp::Multiply,
                operand: ModifierOperand::Constant(Number::Integer(factor)),
            })
        }
    }

    /// Expression node for the term
    pub fn to_expression(&self) -> Expression {
        match self {
            Term::Accessor(a) => Expression::Accessor(a.clone()),
            Term::Modified(m) => Expression::Modified(m.clone()),
            Term::Remembered(r) => Expression::Value(MemoryValue {
                terms: vec![SignedTerm {
                    sign: Sign::Add,
                    term: Term::Remembered(r.clone()),
                }],
                constant: Number::Integer(0),
            }),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Accessor(a) => write!(f, "{}", a),
            Term::Modified(m) => write!(f, "{}", m),
            Term::Remembered(r) => write!(f, "({}) {} {}", r.value, r.op.symbol(), r.operand),
        }
    }
}

/// Term with its sign
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedTerm {
    /// Whether the term is added or subtracted
    pub sign: Sign,
    /// The term
    pub term: Term,
}

/// Ordered sum of signed memory terms plus a constant
///
/// One side of a [`Comparison`](super::Comparison). Terms keep insertion
/// order. Any float term or float constant makes the whole value a float.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemoryValue {
    /// Memory terms in insertion order
    pub terms: Vec<SignedTerm>,
    /// Constant part
    pub constant: Number,
}

impl From<MemoryAccessor> for MemoryValue {
    fn from(accessor: MemoryAccessor) -> Self {
        MemoryValue::from_term(Sign::Add, Term::Accessor(accessor))
    }
}

impl From<Number> for MemoryValue {
    fn from(constant: Number) -> Self {
        MemoryValue {
            terms: Vec::new(),
            constant,
        }
    }
}

impl MemoryValue {
    /// Value holding a single term
    pub fn from_term(sign: Sign, term: Term) -> Self {
        MemoryValue {
            terms: vec![SignedTerm { sign, term }],
            constant: Number::Integer(0),
        }
    }

    /// Convert an evaluated numeric expression into a memory sum
    ///
    /// Arithmetic that was left unfolded becomes a remembered value.
    /// Returns `Ok(None)` for non-numeric expressions.
    pub fn from_expression(expr: &Expression) -> Result<Option<MemoryValue>> {
        let value = match expr {
            Expression::Integer(v) => MemoryValue::from(Number::Integer(*v)),
            Expression::Float(v) => MemoryValue::from(Number::Float(*v)),
            Expression::Accessor(a) => MemoryValue::from(a.clone()),
            Expression::Modified(m) => MemoryValue::from_term(Sign::Add, Term::Modified(m.clone())),
            Expression::Value(v) => v.clone(),
            Expression::Mathematic(m) => {
                let operand = match m.right.as_number() {
                    Some(n) => n,
                    None if m.left.as_number().is_some() => {
                        return Err(Error::illegal(
                            format!("Cannot {} a constant by a runtime value", m.op.verb()),
                            expr,
                        ))
                    }
                    None => {
                        return Err(Error::illegal(
                            format!("Cannot {} by a complex runtime value", m.op.verb()),
                            expr,
                        ))
                    }
                };

                let inner = match MemoryValue::from_expression(&m.left)? {
                    Some(inner) => inner,
                    None => return Ok(None),
                };

                let op = match m.op {
                    MathOp::Add => return Ok(Some(inner.add_constant(operand))),
                    MathOp::Subtract => return Ok(Some(inner.add_constant(operand.negate()))),
                    MathOp::Multiply => ModifierOp::Multiply,
                    MathOp::Divide => ModifierOp::Divide,
                    MathOp::Modulus => ModifierOp::Modulus,
                    MathOp::BitwiseAnd => ModifierOp::BitwiseAnd,
                    MathOp::BitwiseXor => ModifierOp::BitwiseXor,
                };

                MemoryValue::from_term(
                    Sign::Add,
                    Term::Remembered(RememberedValue {
                        value: Box::new(inner),
                        op,
                        operand,
                    }),
                )
            }
            _ => return Ok(None),
        };

        Ok(Some(value))
    }

    /// Simplest expression node for the value
    pub fn into_expression(self) -> Expression {
        if self.terms.is_empty() {
            return self.constant.into_expression();
        }

        if self.terms.len() == 1 && self.constant.is_zero() && self.terms[0].sign == Sign::Add {
            if let Term::Accessor(_) | Term::Modified(_) = self.terms[0].term {
                return self.terms[0].term.to_expression();
            }
        }

        Expression::Value(self)
    }

    /// Whether the value has no memory terms
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether any part of the value is a float
    pub fn is_float(&self) -> bool {
        self.constant.is_float() || self.terms.iter().any(|t| t.term.is_float())
    }

    /// Whether the value has at least one added term
    pub fn has_positive_term(&self) -> bool {
        self.terms.iter().any(|t| t.sign == Sign::Add)
    }

    /// Whether the value has at least one subtracted term
    pub fn has_negative_term(&self) -> bool {
        self.terms.iter().any(|t| t.sign == Sign::Subtract)
    }

    /// The only term, if the value is a single added accessor with no constant
    pub fn single_accessor(&self) -> Option<&MemoryAccessor> {
        match self.terms.as_slice() {
            [SignedTerm {
                sign: Sign::Add,
                term: Term::Accessor(a),
            }] if self.constant.is_zero() => Some(a),
            _ => None,
        }
    }

    /// Append a term, merging it with a like term already present
    pub fn add_term(&mut self, sign: Sign, term: Term) {
        if let Some((accessor, factor)) = term.coefficient() {
            let position = self.terms.iter().position(|existing| {
                existing
                    .term
                    .coefficient()
                    .map_or(false, |(other, _)| other == accessor)
            });

            if let Some(index) = position {
                let existing = &self.terms[index];
                let (_, existing_factor) = existing
                    .term
                    .coefficient()
                    .unwrap_or((accessor, 0));
                let total = existing.sign.factor() * existing_factor + sign.factor() * factor;

                let accessor = accessor.clone();
                if total == 0 {
                    self.terms.remove(index);
                } else {
                    let sign = if total > 0 { Sign::Add } else { Sign::Subtract };
                    self.terms[index] = SignedTerm {
                        sign,
                        term: Term::scaled(accessor, total.abs()),
                    };
                }
                return;
            }
        }

        self.terms.push(SignedTerm { sign, term });
    }

    /// Add or subtract another value
    pub fn add_value(&mut self, sign: Sign, other: &MemoryValue) {
        for term in &other.terms {
            self.add_term(sign.combine(term.sign), term.term.clone());
        }

        self.constant = match sign {
            Sign::Add => self.constant.add(other.constant),
            Sign::Subtract => self.constant.sub(other.constant),
        };
    }

    /// Copy with the constant increased by `n`
    pub fn add_constant(mut self, n: Number) -> MemoryValue {
        self.constant = self.constant.add(n);
        self
    }

    /// Copy with every sign flipped
    pub fn negate(&self) -> MemoryValue {
        MemoryValue {
            terms: self
                .terms
                .iter()
                .map(|t| SignedTerm {
                    sign: t.sign.negate(),
                    term: t.term.clone(),
                })
                .collect(),
            constant: self.constant.negate(),
        }
    }

    /// Copy without the constant
    pub fn without_constant(&self) -> MemoryValue {
        MemoryValue {
            terms: self.terms.clone(),
            constant: Number::Integer(0),
        }
    }

    /// Sum of the maxima of the subtracted terms
    pub fn negative_bound(&self) -> Option<u64> {
        self.terms
            .iter()
            .filter(|t| t.sign == Sign::Subtract)
            .try_fold(0u64, |acc, t| Some(acc + t.term.max_value()?))
    }

    /// Integer range `[min, max]` of the mathematical value
    ///
    /// `None` for floats and for sums whose added terms can exceed 32 bits.
    pub fn range(&self) -> Option<(i64, i64)> {
        let constant = self.constant.as_integer()?;

        let mut positive = 0u64;
        let mut negative = 0u64;
        for t in &self.terms {
            if t.term.is_float() {
                return None;
            }
            let max = t.term.max_value()?;
            match t.sign {
                Sign::Add => positive += max,
                Sign::Subtract => negative += max,
            }
        }

        if positive > u32::MAX as u64 || negative > u32::MAX as u64 {
            return None;
        }

        Some((constant - negative as i64, constant + positive as i64))
    }
}

impl fmt::Display for MemoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            match (i, t.sign) {
                (0, Sign::Add) => {}
                (0, Sign::Subtract) => write!(f, "-")?,
                (_, Sign::Add) => write!(f, " + ")?,
                (_, Sign::Subtract) => write!(f, " - ")?,
            }
            write!(f, "{}", t.term)?;
        }

        if self.terms.is_empty() {
            write!(f, "{}", self.constant)
        } else if self.constant.is_negative() {
            write!(f, " - {}", self.constant.negate())
        } else if !self.constant.is_zero() {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FieldSize;

    fn byte(address: u32) -> MemoryAccessor {
        MemoryAccessor::new(FieldSize::Byte, address)
    }

    #[test]
    fn test_like_terms_merge() {
        let mut value = MemoryValue::from(byte(1));
        value.add_term(Sign::Add, Term::Accessor(byte(1)));
        assert_eq!(value.to_string(), "byte(0x000001) * 2");

        value.add_term(Sign::Subtract, Term::scaled(byte(1), 2));
        assert!(value.terms.is_empty());
        assert_eq!(value.into_expression(), Expression::Integer(0));
    }

    #[test]
    fn test_range_with_subtraction() {
        let mut value = MemoryValue::from(byte(1));
        value.add_term(Sign::Subtract, Term::Accessor(byte(2)));
        let value = value.add_constant(Number::Integer(3));
        assert_eq!(value.range(), Some((-252, 258)));
        assert_eq!(value.negative_bound(), Some(255));
        assert_eq!(value.to_string(), "byte(0x000001) - byte(0x000002) + 3");
    }

    #[test]
    fn test_remembered_from_mathematic() {
        let mut sum = MemoryValue::from(byte(1));
        sum.add_term(Sign::Add, Term::Accessor(byte(2)));
        let expr = Expression::Mathematic(crate::expr::Mathematic {
            left: Box::new(Expression::Value(sum)),
            op: MathOp::Divide,
            right: Box::new(Expression::Integer(2)),
        });

        let value = MemoryValue::from_expression(&expr).unwrap().unwrap();
        assert_eq!(value.terms.len(), 1);
        assert!(matches!(value.terms[0].term, Term::Remembered(_)));
        assert_eq!(value.range(), Some((0, 255)));
    }

    #[test]
    fn test_constant_divided_by_memory_is_rejected() {
        let expr = Expression::Mathematic(crate::expr::Mathematic {
            left: Box::new(Expression::Integer(100)),
            op: MathOp::Divide,
            right: Box::new(Expression::Accessor(byte(1))),
        });
        let err = MemoryValue::from_expression(&expr).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::IllegalOperation);
    }
}
