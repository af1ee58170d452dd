//! Comparison normalization
//!
//! Rewrites `left op right` into the canonical shape the trigger builder
//! expects:
//!
//! - memory terms on the left, a constant (or one plain accessor) on the right
//! - transforms stripped where they can be moved onto the constant
//! - shared terms and common factors removed
//! - comparisons that cannot change at runtime folded into booleans
//! - unsigned subtraction guarded against wraparound

use super::field::{encode_bcd, MemoryAccessor, ValueTransform};
use super::value::{MemoryValue, Sign, SignedTerm, Term};
use super::{ComparisonOp, Expression, Number};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on rewrite steps for a single comparison
const MAX_STEPS: usize = 32;

/// Two memory values joined by a relational operator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Comparison {
    /// Left side
    pub left: MemoryValue,
    /// Operator
    pub op: ComparisonOp,
    /// Right side
    pub right: MemoryValue,
}

impl Comparison {
    /// Create a comparison
    pub fn new(left: MemoryValue, op: ComparisonOp, right: MemoryValue) -> Self {
        Comparison { left, op, right }
    }

    /// Logical negation of the comparison
    pub fn invert(&self) -> Comparison {
        Comparison {
            left: self.left.clone(),
            op: self.op.invert(),
            right: self.right.clone(),
        }
    }

    /// Same comparison with the sides swapped
    pub fn swap(&self) -> Comparison {
        Comparison {
            left: self.right.clone(),
            op: self.op.flip(),
            right: self.left.clone(),
        }
    }

    /// Whether either side is a float
    pub fn is_float(&self) -> bool {
        self.left.is_float() || self.right.is_float()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

enum Outcome {
    Rewrite(Comparison),
    Decided(bool),
}

type Step = fn(&Comparison) -> Option<Outcome>;

const STEPS: &[Step] = &[
    factor_transforms,
    consolidate_constants,
    cancel_terms,
    float_boundary,
    factor_common,
    clamp_limits,
    layout,
];

/// Normalize a comparison
///
/// Returns `None` if the comparison is already canonical, otherwise the
/// rewritten [`Comparison`] or a [`Boolean`](Expression::Boolean) when the
/// result can be decided at compile time.
pub fn normalize_comparison(comparison: &Comparison) -> Option<Expression> {
    let mut current = comparison.clone();

    for _ in 0..MAX_STEPS {
        match STEPS.iter().find_map(|step| step(&current)) {
            Some(Outcome::Decided(result)) => return Some(Expression::Boolean(result)),
            Some(Outcome::Rewrite(next)) => current = next,
            None => break,
        }
    }

    let current = guard_underflow(&current).unwrap_or(current);
    if &current == comparison {
        None
    } else {
        tracing::trace!(from = %comparison, to = %current, "normalized comparison");
        Some(Expression::Comparison(current))
    }
}

fn constant(n: Number) -> MemoryValue {
    MemoryValue::from(n)
}

fn rewrite(left: MemoryValue, op: ComparisonOp, right: MemoryValue) -> Option<Outcome> {
    Some(Outcome::Rewrite(Comparison { left, op, right }))
}

fn decide(left: Number, op: ComparisonOp, right: Number) -> bool {
    match (left, right) {
        (Number::Integer(a), Number::Integer(b)) => op.test(a, b),
        (a, b) => op.test(a.as_f64(), b.as_f64()),
    }
}

/// Negate both sides, keeping added terms ahead of subtracted ones
fn negated(value: &MemoryValue) -> MemoryValue {
    let mut negated = value.negate();
    let (positive, negative): (Vec<SignedTerm>, Vec<SignedTerm>) = negated
        .terms
        .drain(..)
        .partition(|t| t.sign == Sign::Add);
    negated.terms = positive.into_iter().chain(negative).collect();
    negated
}

fn last_positive(value: &MemoryValue) -> Option<&Term> {
    value
        .terms
        .iter()
        .rev()
        .find(|t| t.sign == Sign::Add)
        .map(|t| &t.term)
}

fn factor_transforms(c: &Comparison) -> Option<Outcome> {
    let left = c.left.single_accessor()?;
    if left.transform == ValueTransform::None {
        return None;
    }

    if let Some(right) = c.right.single_accessor() {
        if right.transform != left.transform {
            return None;
        }
        let op = match left.transform {
            ValueTransform::Bcd => c.op,
            ValueTransform::Invert if left.size() == right.size() => c.op.flip(),
            _ => return None,
        };
        return rewrite(
            MemoryValue::from(left.untransformed()),
            op,
            MemoryValue::from(right.untransformed()),
        );
    }

    if !c.right.is_constant() {
        return None;
    }

    let k = c.right.constant.as_integer()?;
    let k = u32::try_from(k).ok()?;
    match left.transform {
        ValueTransform::Bcd => {
            let encoded = encode_bcd(k)?;
            rewrite(
                MemoryValue::from(left.untransformed()),
                c.op,
                constant(Number::Integer(encoded as i64)),
            )
        }
        ValueTransform::Invert => {
            let max = left.size().max_value();
            if k > max {
                return None;
            }
            rewrite(
                MemoryValue::from(left.untransformed()),
                c.op.flip(),
                constant(Number::Integer((max - k) as i64)),
            )
        }
        ValueTransform::None => None,
    }
}

fn consolidate_constants(c: &Comparison) -> Option<Outcome> {
    if c.left.is_constant() {
        if c.right.is_constant() {
            return Some(Outcome::Decided(decide(c.left.constant, c.op, c.right.constant)));
        }
        return Some(Outcome::Rewrite(c.swap()));
    }

    if c.left.constant.is_zero() {
        return None;
    }

    let right = c.right.clone().add_constant(c.left.constant.negate());
    rewrite(c.left.without_constant(), c.op, right)
}

fn cancel_terms(c: &Comparison) -> Option<Outcome> {
    for (i, term) in c.left.terms.iter().enumerate() {
        if let Some(j) = c.right.terms.iter().position(|t| t == term) {
            let mut left = c.left.clone();
            let mut right = c.right.clone();
            left.terms.remove(i);
            right.terms.remove(j);
            return rewrite(left, c.op, right);
        }
    }
    None
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

/// Accessor and positive integer multiplier of a single added term
fn scaled_term(value: &MemoryValue) -> Option<(&MemoryAccessor, i64)> {
    if !value.constant.is_zero() {
        return None;
    }
    match value.terms.as_slice() {
        [SignedTerm {
            sign: Sign::Add,
            term,
        }] => match term {
            Term::Accessor(a) => Some((a, 1)),
            Term::Modified(m) => match (m.op, m.constant()) {
                (super::ModifierOp::Multiply, Some(Number::Integer(k))) if k > 0 => {
                    Some((&m.accessor, k))
                }
                _ => None,
            },
            Term::Remembered(_) => None,
        },
        _ => None,
    }
}

fn factor_common(c: &Comparison) -> Option<Outcome> {
    let (a, m) = scaled_term(&c.left)?;

    if let Some((b, n)) = scaled_term(&c.right) {
        let g = gcd(m, n);
        if g <= 1 {
            return None;
        }
        return rewrite(
            MemoryValue::from_term(Sign::Add, Term::scaled(a.clone(), m / g)),
            c.op,
            MemoryValue::from_term(Sign::Add, Term::scaled(b.clone(), n / g)),
        );
    }

    if m == 1 || !c.right.is_constant() {
        return None;
    }
    let k = c.right.constant.as_integer()?;
    if (a.max_value() as i64).checked_mul(m)? > u32::MAX as i64 {
        return None;
    }

    let floor = k.div_euclid(m);
    let ceil = -(-k).div_euclid(m);
    let exact = k.rem_euclid(m) == 0;
    let (op, bound) = match c.op {
        ComparisonOp::Eq if !exact => return Some(Outcome::Decided(false)),
        ComparisonOp::Ne if !exact => return Some(Outcome::Decided(true)),
        ComparisonOp::Eq | ComparisonOp::Ne => (c.op, floor),
        ComparisonOp::Lt | ComparisonOp::Ge => (c.op, ceil),
        ComparisonOp::Le | ComparisonOp::Gt => (c.op, floor),
    };

    rewrite(MemoryValue::from(a.clone()), op, constant(Number::Integer(bound)))
}

fn float_boundary(c: &Comparison) -> Option<Outcome> {
    if !c.right.is_constant() {
        return None;
    }
    if c.left.is_float() {
        // compared as floats at runtime; an integer constant would be read unsigned
        return match c.right.constant {
            Number::Integer(k) => rewrite(c.left.clone(), c.op, constant(Number::Float(k as f64))),
            Number::Float(_) => None,
        };
    }
    let f = match c.right.constant {
        Number::Float(f) => f,
        Number::Integer(_) => return None,
    };

    if f.fract() == 0.0 {
        return rewrite(c.left.clone(), c.op, constant(Number::Integer(f as i64)));
    }

    let floor = Number::Integer(f.floor() as i64);
    match c.op {
        ComparisonOp::Eq => Some(Outcome::Decided(false)),
        ComparisonOp::Ne => Some(Outcome::Decided(true)),
        ComparisonOp::Lt | ComparisonOp::Le => rewrite(c.left.clone(), ComparisonOp::Le, constant(floor)),
        ComparisonOp::Gt | ComparisonOp::Ge => rewrite(c.left.clone(), ComparisonOp::Gt, constant(floor)),
    }
}

fn clamp_limits(c: &Comparison) -> Option<Outcome> {
    if !c.right.is_constant() {
        return None;
    }
    let k = c.right.constant.as_integer()?;
    let (min, max) = c.left.range()?;

    let decided = match c.op {
        ComparisonOp::Eq if k < min || k > max => Some(false),
        ComparisonOp::Ne if k < min || k > max => Some(true),
        ComparisonOp::Lt if k <= min => Some(false),
        ComparisonOp::Lt if k > max => Some(true),
        ComparisonOp::Le if k < min => Some(false),
        ComparisonOp::Le if k >= max => Some(true),
        ComparisonOp::Gt if k >= max => Some(false),
        ComparisonOp::Gt if k < min => Some(true),
        ComparisonOp::Ge if k > max => Some(false),
        ComparisonOp::Ge if k <= min => Some(true),
        _ => None,
    };
    if let Some(result) = decided {
        return Some(Outcome::Decided(result));
    }

    let tightened = match c.op {
        ComparisonOp::Le if k == min => Some(min),
        ComparisonOp::Lt if k == min + 1 => Some(min),
        ComparisonOp::Ge if k == max => Some(max),
        ComparisonOp::Gt if k == max - 1 => Some(max),
        _ => None,
    }?;

    rewrite(c.left.clone(), ComparisonOp::Eq, constant(Number::Integer(tightened)))
}

/// Whether a right-hand accessor can stay on the right of the final condition
fn shares_final_pointer(left: &MemoryValue, right: &MemoryAccessor) -> bool {
    last_positive(left).map_or(false, |t| t.pointer() == right.pointer())
}

fn layout(c: &Comparison) -> Option<Outcome> {
    if !c.right.is_constant() {
        if let Some(right) = c.right.single_accessor() {
            if shares_final_pointer(&c.left, right) {
                return sign_layout(c);
            }
        }

        if let Some(left) = c.left.single_accessor() {
            if c.right.constant.is_zero() && shares_final_pointer(&c.right, left) {
                return Some(Outcome::Rewrite(c.swap()));
            }
        }

        let mut left = c.left.clone();
        left.add_value(Sign::Subtract, &c.right.without_constant());
        return rewrite(left, c.op, constant(c.right.constant));
    }

    sign_layout(c)
}

fn sign_layout(c: &Comparison) -> Option<Outcome> {
    if !c.right.is_constant() {
        return None;
    }

    let equality = matches!(c.op, ComparisonOp::Eq | ComparisonOp::Ne);
    if equality && c.right.constant.is_negative() && !c.left.is_float() {
        return rewrite(negated(&c.left), c.op, c.right.negate());
    }

    if !c.left.terms.is_empty() && !c.left.has_positive_term() {
        return rewrite(negated(&c.left), c.op.flip(), c.right.negate());
    }

    None
}

/// Keep an ordered comparison with subtracted terms from wrapping below zero
fn guard_underflow(c: &Comparison) -> Option<Comparison> {
    if !c.op.is_ordered() || c.is_float() || !c.left.has_negative_term() {
        return None;
    }
    if !c.left.constant.is_zero() {
        return None;
    }

    let mut left = c.left.clone();
    if !c.right.is_constant() {
        left.add_value(Sign::Subtract, &c.right.without_constant());
    }
    let k = c.right.constant.as_integer()?;

    if let Some(rearranged) = rearrange(&left, c.op, k) {
        return Some(rearranged);
    }

    let bound = left.negative_bound()? as i64;
    let positive: u64 = left
        .terms
        .iter()
        .filter(|t| t.sign == Sign::Add)
        .try_fold(0u64, |acc, t| Some(acc + t.term.max_value()?))?;
    if k + bound < 0 {
        return None;
    }
    if positive + bound as u64 > u32::MAX as u64 {
        tracing::debug!(comparison = %c, "underflow guard can wrap near the field maximum");
    }

    left.constant = Number::Integer(bound);
    Some(Comparison::new(left, c.op, constant(Number::Integer(k + bound))))
}

/// Rewrite `a - b op k` as pure addition when one side is a plain accessor
fn rearrange(left: &MemoryValue, op: ComparisonOp, k: i64) -> Option<Comparison> {
    let (positive, negative) = match left.terms.as_slice() {
        [first, second] if first.sign == Sign::Add && second.sign == Sign::Subtract => {
            (&first.term, &second.term)
        }
        [first, second] if first.sign == Sign::Subtract && second.sign == Sign::Add => {
            (&second.term, &first.term)
        }
        _ => return None,
    };

    if positive.pointer() != negative.pointer() {
        return None;
    }

    // a - b op k  =>  b + k flip(op) a
    // a - b op k  =>  a + |k| op b
    let (kept, moved, offset, op) = if k >= 0 {
        (negative, positive.as_accessor()?, k, op.flip())
    } else {
        (positive, negative.as_accessor()?, -k, op)
    };

    let kept_max = kept.max_value()?;
    if kept_max > u32::MAX as u64 {
        return None;
    }
    if kept_max + offset as u64 > u32::MAX as u64 {
        // only wrong where the kept side plus the offset wraps
        tracing::debug!(offset, "rearranged subtraction can wrap near the field maximum");
    }

    let mut value = MemoryValue::from_term(Sign::Add, kept.clone());
    value.constant = Number::Integer(offset);
    Some(Comparison::new(value, op, MemoryValue::from(moved.clone())))
}
