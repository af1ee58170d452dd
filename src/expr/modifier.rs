//! Modifier algebra
//!
//! [`combine`] folds `left op right` into the simplest equivalent node.
//! `Ok(None)` means no simplification applies and the caller keeps a
//! [`Mathematic`](super::Mathematic) node.

use super::field::MemoryAccessor;
use super::value::{MemoryValue, Sign, Term};
use super::{Expression, Mathematic, MathOp, Number};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation applied to an accessor by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierOp {
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

impl ModifierOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            ModifierOp::Multiply => "*",
            ModifierOp::Divide => "/",
            ModifierOp::Modulus => "%",
            ModifierOp::BitwiseAnd => "&",
            ModifierOp::BitwiseXor => "^",
        }
    }

    /// Whether the operation is bitwise
    pub fn is_bitwise(self) -> bool {
        matches!(self, ModifierOp::BitwiseAnd | ModifierOp::BitwiseXor)
    }

    fn from_math(op: MathOp) -> Option<ModifierOp> {
        match op {
            MathOp::Multiply => Some(ModifierOp::Multiply),
            MathOp::Divide => Some(ModifierOp::Divide),
            MathOp::Modulus => Some(ModifierOp::Modulus),
            MathOp::BitwiseAnd => Some(ModifierOp::BitwiseAnd),
            MathOp::BitwiseXor => Some(ModifierOp::BitwiseXor),
            MathOp::Add | MathOp::Subtract => None,
        }
    }
}

/// Right-hand operand of a modifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierOperand {
    /// Constant operand
    Constant(Number),
    /// Second memory read, sharing the accessor's pointer base
    Memory(MemoryAccessor),
}

/// Memory read combined with an operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifiedAccessor {
    /// Value being modified
    pub accessor: MemoryAccessor,
    /// Operation
    pub op: ModifierOp,
    /// Operand
    pub operand: ModifierOperand,
}

impl ModifiedAccessor {
    /// Whether the result is a float
    pub fn is_float(&self) -> bool {
        self.accessor.is_float()
            || match &self.operand {
                ModifierOperand::Constant(n) => n.is_float(),
                ModifierOperand::Memory(m) => m.is_float(),
            }
    }

    /// Constant operand, if any
    pub fn constant(&self) -> Option<Number> {
        match self.operand {
            ModifierOperand::Constant(n) => Some(n),
            ModifierOperand::Memory(_) => None,
        }
    }

    /// Largest value the modified read can produce
    pub fn max_value(&self) -> Option<u64> {
        let max = self.accessor.max_value() as u64;
        let operand_max = match &self.operand {
            ModifierOperand::Constant(Number::Integer(k)) if *k >= 0 => *k as u64,
            ModifierOperand::Constant(_) => return None,
            ModifierOperand::Memory(m) => m.max_value() as u64,
        };

        let value = match self.op {
            ModifierOp::Multiply => max.checked_mul(operand_max)?,
            ModifierOp::Divide => match &self.operand {
                ModifierOperand::Constant(_) if operand_max == 0 => return None,
                ModifierOperand::Constant(_) => max / operand_max,
                ModifierOperand::Memory(_) => max,
            },
            ModifierOp::Modulus if operand_max == 0 => return None,
            ModifierOp::Modulus => max.min(operand_max - 1),
            ModifierOp::BitwiseAnd => max.min(operand_max),
            ModifierOp::BitwiseXor => {
                let combined = max | operand_max;
                u64::MAX >> combined.leading_zeros()
            }
        };

        Some(value)
    }
}

impl fmt::Display for ModifiedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.accessor, self.op.symbol())?;
        match &self.operand {
            ModifierOperand::Constant(Number::Integer(k)) if self.op.is_bitwise() => {
                write!(f, "0x{:02X}", k)
            }
            ModifierOperand::Constant(n) => write!(f, "{}", n),
            ModifierOperand::Memory(m) => write!(f, "{}", m),
        }
    }
}

fn modified(accessor: MemoryAccessor, op: ModifierOp, operand: Number) -> Expression {
    Expression::Modified(ModifiedAccessor {
        accessor,
        op,
        operand: ModifierOperand::Constant(operand),
    })
}

fn mathematic(left: &Expression, op: MathOp, right: &Expression) -> Expression {
    Expression::Mathematic(Mathematic {
        left: Box::new(left.clone()),
        op,
        right: Box::new(right.clone()),
    })
}

fn numeric_operand(expr: &Expression) -> Result<()> {
    match expr {
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::Accessor(_)
        | Expression::Modified(_)
        | Expression::Value(_)
        | Expression::Mathematic(_) => Ok(()),
        other => Err(Error::TypeError {
            expected: "numeric value".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn fold_constants(left: Number, op: MathOp, right: Number) -> Result<Number> {
    match (left, right) {
        (Number::Integer(a), Number::Integer(b)) => {
            let value = match op {
                MathOp::Add => a.wrapping_add(b),
                MathOp::Subtract => a.wrapping_sub(b),
                MathOp::Multiply => a.wrapping_mul(b),
                MathOp::Divide if b == 0 => return Err(Error::DivisionByZero),
                MathOp::Divide => a / b,
                MathOp::Modulus if b == 0 => return Err(Error::DivisionByZero),
                MathOp::Modulus => a % b,
                MathOp::BitwiseAnd => a & b,
                MathOp::BitwiseXor => a ^ b,
            };
            Ok(Number::Integer(value))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let value = match op {
                MathOp::Add => a + b,
                MathOp::Subtract => a - b,
                MathOp::Multiply => a * b,
                MathOp::Divide if b == 0.0 => return Err(Error::DivisionByZero),
                MathOp::Divide => a / b,
                MathOp::Modulus if b == 0.0 => return Err(Error::DivisionByZero),
                MathOp::Modulus => a % b,
                MathOp::BitwiseAnd | MathOp::BitwiseXor => {
                    return Err(Error::illegal(
                        "Cannot perform bitwise operations on floating point values",
                        format!("{} {} {}", left, op.symbol(), right),
                    ))
                }
            };
            Ok(Number::Float(value))
        }
    }
}

fn is_float_expression(expr: &Expression) -> bool {
    match expr {
        Expression::Float(_) => true,
        Expression::Accessor(a) => a.is_float(),
        Expression::Modified(m) => m.is_float(),
        Expression::Value(v) => v.is_float(),
        Expression::Mathematic(m) => is_float_expression(&m.left) || is_float_expression(&m.right),
        _ => false,
    }
}

/// Combine `left op right` into the simplest equivalent expression
///
/// Returns `Ok(None)` when the operation is legal but cannot be folded.
pub fn combine(left: &Expression, op: MathOp, right: &Expression) -> Result<Option<Expression>> {
    numeric_operand(left)?;
    numeric_operand(right)?;

    if op.is_bitwise() && (is_float_expression(left) || is_float_expression(right)) {
        return Err(Error::illegal(
            "Cannot perform bitwise operations on floating point values",
            mathematic(left, op, right),
        ));
    }

    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok(Some(fold_constants(a, op, b)?.into_expression())),
        (Some(a), None) => combine_inverse(a, op, right),
        (None, Some(b)) => combine_constant(left, op, b),
        (None, None) => combine_memory(left, op, right),
    }
}

/// Combine `constant op term` by rewriting it as `term op' constant`
///
/// `c + t`, `c * t`, `c & t` and `c ^ t` commute; `c - t` becomes `-t + c`.
/// Division of a constant by a runtime value is left unfolded and a modulus
/// by a runtime value is rejected.
pub fn combine_inverse(left: Number, op: MathOp, right: &Expression) -> Result<Option<Expression>> {
    numeric_operand(right)?;
    let constant = left.into_expression();

    match op {
        MathOp::Add | MathOp::Multiply | MathOp::BitwiseAnd | MathOp::BitwiseXor => {
            combine(right, op, &constant)
        }
        MathOp::Subtract => {
            let value = match MemoryValue::from_expression(right)? {
                Some(value) => value,
                None => return Ok(None),
            };
            Ok(Some(value.negate().add_constant(left).into_expression()))
        }
        MathOp::Modulus => Err(Error::illegal(
            "Cannot modulus using a runtime value",
            mathematic(&constant, op, right),
        )),
        MathOp::Divide => Ok(None),
    }
}

fn combine_constant(left: &Expression, op: MathOp, k: Number) -> Result<Option<Expression>> {
    match op {
        MathOp::Add | MathOp::Subtract => {
            if k.is_zero() {
                return Ok(Some(left.clone()));
            }
            let value = match MemoryValue::from_expression(left)? {
                Some(value) => value,
                None => return Ok(None),
            };
            let k = if op == MathOp::Subtract { k.negate() } else { k };
            Ok(Some(value.add_constant(k).into_expression()))
        }
        MathOp::Multiply => multiply_constant(left, k),
        MathOp::Divide => divide_constant(left, k),
        MathOp::Modulus => {
            if k.is_zero() {
                return Err(Error::DivisionByZero);
            }
            match left {
                Expression::Accessor(a) => Ok(Some(modified(a.clone(), ModifierOp::Modulus, k))),
                _ => Ok(None),
            }
        }
        MathOp::BitwiseAnd | MathOp::BitwiseXor => mask_constant(left, op, k),
    }
}

fn multiply_constant(left: &Expression, k: Number) -> Result<Option<Expression>> {
    if k.is_one() {
        return Ok(Some(left.clone()));
    }
    if k.is_zero() && !is_float_expression(left) {
        return Ok(Some(Expression::Integer(0)));
    }
    if k.is_negative() {
        let positive = match multiply_constant(left, k.negate())? {
            Some(expr) => expr,
            None => return Ok(None),
        };
        return Ok(MemoryValue::from_expression(&positive)?.map(|v| v.negate().into_expression()));
    }

    match left {
        Expression::Accessor(a) => Ok(Some(modified(a.clone(), ModifierOp::Multiply, k))),
        Expression::Modified(m) => match (m.op, m.constant()) {
            (ModifierOp::Multiply, Some(existing)) => {
                let factor = existing.mul(k);
                if let Number::Integer(f) = factor {
                    if f > u32::MAX as i64 {
                        return Ok(None);
                    }
                }
                Ok(Some(modified(m.accessor.clone(), ModifierOp::Multiply, factor)))
            }
            _ => Ok(None),
        },
        Expression::Value(v) => {
            let mut result = MemoryValue::from(v.constant.mul(k));
            for t in &v.terms {
                let scaled = match combine(&t.term.to_expression(), MathOp::Multiply, &k.into_expression())? {
                    Some(scaled) => scaled,
                    None => return Ok(None),
                };
                let scaled = match MemoryValue::from_expression(&scaled)? {
                    Some(scaled) => scaled,
                    None => return Ok(None),
                };
                result.add_value(t.sign, &scaled);
            }
            Ok(Some(result.into_expression()))
        }
        _ => Ok(None),
    }
}

fn divide_constant(left: &Expression, k: Number) -> Result<Option<Expression>> {
    if k.is_zero() {
        return Err(Error::DivisionByZero);
    }
    if k.is_one() {
        return Ok(Some(left.clone()));
    }
    if k.is_negative() {
        let positive = match divide_constant(left, k.negate())? {
            Some(expr) => expr,
            None => return Ok(None),
        };
        return Ok(MemoryValue::from_expression(&positive)?.map(|v| v.negate().into_expression()));
    }

    match left {
        Expression::Accessor(a) => Ok(Some(modified(a.clone(), ModifierOp::Divide, k))),
        Expression::Modified(m) => match (m.op, m.constant()) {
            (ModifierOp::Divide, Some(existing)) => {
                let divisor = existing.mul(k);
                if let Number::Integer(d) = divisor {
                    if d > u32::MAX as i64 {
                        return Ok(None);
                    }
                }
                Ok(Some(modified(m.accessor.clone(), ModifierOp::Divide, divisor)))
            }
            (ModifierOp::Multiply, Some(Number::Integer(factor))) => {
                let divisor = match k {
                    Number::Integer(d) if d > 0 => d,
                    _ => return Ok(None),
                };
                let overflows = (m.accessor.max_value() as i64).checked_mul(factor)
                    .map_or(true, |max| max > u32::MAX as i64);
                if factor % divisor != 0 || overflows {
                    return Ok(None);
                }
                let factor = factor / divisor;
                Ok(Some(if factor == 1 {
                    Expression::Accessor(m.accessor.clone())
                } else {
                    modified(m.accessor.clone(), ModifierOp::Multiply, Number::Integer(factor))
                }))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn mask_constant(left: &Expression, op: MathOp, k: Number) -> Result<Option<Expression>> {
    let mask = match k {
        Number::Integer(mask) => mask,
        Number::Float(_) => return Ok(None),
    };

    match (op, left) {
        (MathOp::BitwiseAnd, _) if mask == 0 => Ok(Some(Expression::Integer(0))),
        (MathOp::BitwiseXor, _) if mask == 0 => Ok(Some(left.clone())),
        (MathOp::BitwiseAnd, Expression::Accessor(a)) => {
            let max = a.max_value() as i64;
            if mask & max == max {
                Ok(Some(left.clone()))
            } else {
                Ok(Some(modified(a.clone(), ModifierOp::BitwiseAnd, Number::Integer(mask))))
            }
        }
        (MathOp::BitwiseXor, Expression::Accessor(a)) => Ok(Some(modified(
            a.clone(),
            ModifierOp::BitwiseXor,
            Number::Integer(mask),
        ))),
        (MathOp::BitwiseAnd, Expression::Modified(m)) => match (m.op, m.constant()) {
            (ModifierOp::BitwiseAnd, Some(Number::Integer(existing))) => {
                let combined = existing & mask;
                if combined == 0 {
                    Ok(Some(Expression::Integer(0)))
                } else {
                    Ok(Some(modified(m.accessor.clone(), ModifierOp::BitwiseAnd, Number::Integer(combined))))
                }
            }
            _ => Ok(None),
        },
        (MathOp::BitwiseXor, Expression::Modified(m)) => match (m.op, m.constant()) {
            (ModifierOp::BitwiseXor, Some(Number::Integer(existing))) => {
                let combined = existing ^ mask;
                if combined == 0 {
                    Ok(Some(Expression::Accessor(m.accessor.clone())))
                } else {
                    Ok(Some(modified(m.accessor.clone(), ModifierOp::BitwiseXor, Number::Integer(combined))))
                }
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn combine_memory(left: &Expression, op: MathOp, right: &Expression) -> Result<Option<Expression>> {
    if op == MathOp::Add || op == MathOp::Subtract {
        let (mut value, other) = match (
            MemoryValue::from_expression(left)?,
            MemoryValue::from_expression(right)?,
        ) {
            (Some(value), Some(other)) => (value, other),
            _ => return Ok(None),
        };
        let sign = if op == MathOp::Add { Sign::Add } else { Sign::Subtract };
        value.add_value(sign, &other);
        return Ok(Some(value.into_expression()));
    }

    if op == MathOp::Modulus {
        return Err(Error::illegal(
            "Cannot modulus using a runtime value",
            mathematic(left, op, right),
        ));
    }

    let modifier = match ModifierOp::from_math(op) {
        Some(modifier) => modifier,
        None => return Ok(None),
    };

    match (left, right) {
        (Expression::Accessor(a), Expression::Accessor(b)) => {
            if !a.same_base(b) {
                return Err(Error::illegal(
                    format!("Cannot {} two values with differing pointers", op.verb()),
                    mathematic(left, op, right),
                ));
            }
            Ok(Some(Expression::Modified(ModifiedAccessor {
                accessor: a.clone(),
                op: modifier,
                operand: ModifierOperand::Memory(b.clone()),
            })))
        }
        (_, Expression::Accessor(_)) if op != MathOp::Divide => combine_memory(right, op, left),
        _ => Err(Error::illegal(
            format!("Cannot {} by a complex runtime value", op.verb()),
            mathematic(left, op, right),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::expr::FieldSize;

    fn byte(address: u32) -> Expression {
        Expression::Accessor(MemoryAccessor::new(FieldSize::Byte, address))
    }

    fn int(v: i64) -> Expression {
        Expression::Integer(v)
    }

    fn fold(left: &Expression, op: MathOp, right: &Expression) -> Expression {
        combine(left, op, right).unwrap().unwrap()
    }

    #[test]
    fn test_identities() {
        let x = byte(0x1234);
        assert_eq!(fold(&x, MathOp::Add, &int(0)), x);
        assert_eq!(fold(&x, MathOp::Multiply, &int(1)), x);
        assert_eq!(fold(&x, MathOp::Multiply, &int(0)), int(0));
        assert_eq!(fold(&x, MathOp::Divide, &int(1)), x);
        assert_eq!(fold(&x, MathOp::BitwiseXor, &int(0)), x);
        assert_eq!(fold(&x, MathOp::BitwiseAnd, &int(0xFF)), x);
        assert_eq!(fold(&x, MathOp::BitwiseAnd, &int(0)), int(0));
    }

    #[test]
    fn test_float_multiply_by_zero_is_kept() {
        let x = Expression::Accessor(MemoryAccessor::new(FieldSize::Float, 0x10));
        let result = fold(&x, MathOp::Multiply, &int(0));
        assert!(matches!(result, Expression::Modified(_)));
    }

    #[test]
    fn test_multiplier_folding() {
        let x = fold(&byte(1), MathOp::Multiply, &int(4));
        assert_eq!(fold(&x, MathOp::Multiply, &int(2)).to_string(), "byte(0x000001) * 8");

        let d = fold(&byte(1), MathOp::Divide, &int(4));
        assert_eq!(fold(&d, MathOp::Divide, &int(2)).to_string(), "byte(0x000001) / 8");

        let m = fold(&byte(1), MathOp::Multiply, &int(6));
        assert_eq!(fold(&m, MathOp::Divide, &int(3)).to_string(), "byte(0x000001) * 2");
        assert_eq!(combine(&m, MathOp::Divide, &int(4)).unwrap(), None);
    }

    #[test]
    fn test_multiply_overflow_not_folded_by_divide() {
        let dword = Expression::Accessor(MemoryAccessor::new(FieldSize::DWord, 4));
        let m = fold(&dword, MathOp::Multiply, &int(4));
        assert_eq!(combine(&m, MathOp::Divide, &int(2)).unwrap(), None);
    }

    #[test]
    fn test_negative_multiplier_negates() {
        let result = fold(&byte(1), MathOp::Multiply, &int(-2));
        assert_eq!(result.to_string(), "-byte(0x000001) * 2");
    }

    #[test]
    fn test_negative_divisor_negates() {
        let result = fold(&byte(1), MathOp::Divide, &int(-2));
        assert_eq!(result.to_string(), "-byte(0x000001) / 2");

        let Expression::Value(value) = result else {
            panic!("expected a negated sum, got {:?}", result);
        };
        let [term] = value.terms.as_slice() else {
            panic!("expected one term");
        };
        assert_eq!(term.sign, Sign::Subtract);
        let Term::Modified(m) = &term.term else {
            panic!("expected a divided accessor");
        };
        assert_eq!((m.op, m.constant()), (ModifierOp::Divide, Some(Number::Integer(2))));
    }

    #[test]
    fn test_masks_fold() {
        let m = fold(&byte(1), MathOp::BitwiseAnd, &int(0x3C));
        assert_eq!(fold(&m, MathOp::BitwiseAnd, &int(0x0F)).to_string(), "byte(0x000001) & 0x0C");
        assert_eq!(fold(&m, MathOp::BitwiseAnd, &int(0xC0)), int(0));

        let x = fold(&byte(1), MathOp::BitwiseXor, &int(0x0F));
        assert_eq!(combine(&x, MathOp::BitwiseAnd, &int(0x03)).unwrap(), None);
        assert_eq!(fold(&x, MathOp::BitwiseXor, &int(0x0F)), byte(1));
    }

    #[test]
    fn test_addition_builds_value() {
        let sum = fold(&byte(1), MathOp::Add, &byte(2));
        assert_eq!(sum.to_string(), "byte(0x000001) + byte(0x000002)");
        let back = fold(&sum, MathOp::Subtract, &byte(2));
        assert_eq!(back, byte(1));
    }

    #[test]
    fn test_multiply_distributes_over_value() {
        let sum = fold(&byte(1), MathOp::Add, &byte(2));
        let scaled = fold(&sum, MathOp::Multiply, &int(3));
        assert_eq!(scaled.to_string(), "byte(0x000001) * 3 + byte(0x000002) * 3");
    }

    #[test]
    fn test_illegal_operations() {
        let err = combine(&byte(1), MathOp::Modulus, &byte(2)).unwrap_err();
        assert!(err.to_string().starts_with("Cannot modulus using a runtime value"));

        let float = Expression::Accessor(MemoryAccessor::new(FieldSize::Float, 4));
        let err = combine(&float, MathOp::BitwiseAnd, &int(3)).unwrap_err();
        assert!(err.to_string().starts_with("Cannot perform bitwise operations on floating point values"));

        let pointer = MemoryValue::from(MemoryAccessor::new(FieldSize::DWord, 0x10));
        let indirect = Expression::Accessor(MemoryAccessor::with_pointer(FieldSize::Byte, pointer, 4));
        let err = combine(&byte(1), MathOp::Multiply, &indirect).unwrap_err();
        assert!(err.to_string().starts_with("Cannot multiply two values with differing pointers"));
        let err = combine(&byte(1), MathOp::Divide, &indirect).unwrap_err();
        assert!(err.to_string().starts_with("Cannot divide two values with differing pointers"));

        let sum = fold(&byte(2), MathOp::Add, &byte(3));
        let err = combine(&byte(1), MathOp::Divide, &sum).unwrap_err();
        assert!(err.to_string().starts_with("Cannot divide by a complex runtime value"));
        assert_eq!(err.class(), ErrorClass::IllegalOperation);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(combine(&int(1), MathOp::Divide, &int(0)), Err(Error::DivisionByZero));
        assert_eq!(combine(&byte(1), MathOp::Modulus, &int(0)), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_inverse() {
        assert_eq!(fold(&int(10), MathOp::Subtract, &byte(1)).to_string(), "-byte(0x000001) + 10");
        assert_eq!(fold(&int(3), MathOp::Multiply, &byte(1)).to_string(), "byte(0x000001) * 3");
        assert_eq!(combine(&int(10), MathOp::Divide, &byte(1)).unwrap(), None);
        assert!(combine(&int(10), MathOp::Modulus, &byte(1)).is_err());
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(fold(&int(7), MathOp::Divide, &int(2)), int(3));
        assert_eq!(fold(&int(7), MathOp::Add, &Expression::Float(0.5)), Expression::Float(7.5));
        assert!(combine(&Expression::Float(1.0), MathOp::BitwiseXor, &int(1)).is_err());
    }
}
