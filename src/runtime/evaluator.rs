use crate::error::{Error, Result};
use crate::expr::{
    combine, normalize_comparison, Argument, Compare, Comparison, Conditional, Expression,
    FunctionCall, LogicalOp, Mathematic, MemoryValue, Number,
};
use crate::runtime::builtins::{self, Builtin, DEDUCT};
use crate::runtime::Scope;

/// Reduces parsed expressions to the algebra the trigger builder consumes
///
/// - identifiers resolve through the [`Scope`]
/// - arithmetic folds through [`combine`]
/// - calls dispatch to the built-in table
/// - comparisons are built from memory values and normalized
/// - `!` is pushed down by De Morgan's laws
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    scope: Scope,
}

impl Evaluator {
    /// Creates an evaluator with no constants
    pub fn new() -> Self {
        Evaluator::default()
    }

    /// Creates an evaluator over a scope of constants
    pub fn with_scope(scope: Scope) -> Self {
        Evaluator { scope }
    }

    /// Constants visible to the evaluator
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Evaluates an expression
    pub fn evaluate(&self, expr: &Expression) -> Result<Expression> {
        match expr {
            Expression::Identifier(name) => {
                self.scope
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UndefinedIdentifier { name: name.clone() })
            }
            Expression::Mathematic(m) => self.eval_math(m),
            Expression::Compare(c) => self.eval_compare(c),
            Expression::Conditional(c) => self.eval_conditional(c),
            Expression::Not(inner) => {
                let inner = self.evaluate(inner)?;
                if !inner.is_requirement() {
                    return Err(Error::not_requirement(&inner));
                }
                inner.invert()
            }
            Expression::Call(call) => self.eval_call(call),
            other => Ok(other.clone()),
        }
    }

    fn eval_math(&self, math: &Mathematic) -> Result<Expression> {
        let left = self.evaluate(&math.left)?;
        let right = self.evaluate(&math.right)?;
        match combine(&left, math.op, &right)? {
            Some(folded) => Ok(folded),
            None => Ok(Expression::Mathematic(Mathematic {
                left: Box::new(left),
                op: math.op,
                right: Box::new(right),
            })),
        }
    }

    fn eval_compare(&self, compare: &Compare) -> Result<Expression> {
        let left = self.evaluate(&compare.left)?;
        let right = self.evaluate(&compare.right)?;

        match (left.as_number(), right.as_number()) {
            (Some(Number::Integer(a)), Some(Number::Integer(b))) => {
                return Ok(Expression::Boolean(compare.op.test(a, b)))
            }
            (Some(a), Some(b)) => {
                return Ok(Expression::Boolean(compare.op.test(a.as_f64(), b.as_f64())))
            }
            _ => {}
        }

        let comparison = Comparison::new(
            memory_value(&left)?,
            compare.op,
            memory_value(&right)?,
        );
        let normalized = normalize_comparison(&comparison);
        tracing::trace!(
            comparison = %comparison,
            normalized = normalized.is_some(),
            "built comparison"
        );
        Ok(normalized.unwrap_or(Expression::Comparison(comparison)))
    }

    fn eval_conditional(&self, conditional: &Conditional) -> Result<Expression> {
        // `true` is the identity of `&&` and absorbs `||`; `false` the reverse
        let identity = conditional.op == LogicalOp::And;

        let mut operands = Vec::with_capacity(conditional.operands.len());
        for operand in &conditional.operands {
            match self.evaluate(operand)? {
                Expression::Boolean(b) if b == identity => {}
                Expression::Boolean(b) => return Ok(Expression::Boolean(b)),
                clause if clause.is_requirement() => operands.push(clause),
                other => return Err(Error::not_requirement(&other)),
            }
        }

        if operands.is_empty() {
            return Ok(Expression::Boolean(identity));
        }
        Ok(Conditional::flattened(conditional.op, operands))
    }

    fn eval_call(&self, call: &FunctionCall) -> Result<Expression> {
        let builtin = builtins::lookup(&call.name).ok_or_else(|| Error::UndefinedFunction {
            name: call.name.clone(),
        })?;

        let args = call
            .args
            .iter()
            .map(|arg| self.eval_argument(builtin, arg))
            .collect::<Result<Vec<_>>>()?;
        builtin.call(&call.name, &args)
    }

    /// `deduct(...)` stays a marker inside `tally(...)` with its clause evaluated
    fn eval_argument(&self, builtin: Builtin, arg: &Argument) -> Result<Argument> {
        let value = match &arg.value {
            Expression::Call(inner) if builtin == Builtin::Tally && inner.name == DEDUCT => {
                let args = inner
                    .args
                    .iter()
                    .map(|a| {
                        Ok(Argument {
                            name: a.name.clone(),
                            value: self.evaluate(&a.value)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Expression::Call(FunctionCall {
                    name: inner.name.clone(),
                    args,
                })
            }
            other => self.evaluate(other)?,
        };
        Ok(Argument {
            name: arg.name.clone(),
            value,
        })
    }
}

fn memory_value(expr: &Expression) -> Result<MemoryValue> {
    MemoryValue::from_expression(expr)?.ok_or_else(|| Error::TypeError {
        expected: "numeric value".to_string(),
        got: expr.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn eval(source: &str) -> Result<Expression> {
        Evaluator::new().evaluate(&parse_expression(source)?)
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), Expression::Integer(14));
        assert_eq!(eval("1 + 1 == 2").unwrap(), Expression::Boolean(true));
        assert_eq!(eval("1.5 < 1").unwrap(), Expression::Boolean(false));
    }

    #[test]
    fn test_comparison_is_normalized() {
        assert_eq!(
            eval("byte(0x1234) > 256").unwrap(),
            Expression::Boolean(false)
        );
        assert_eq!(
            eval("bcd(byte(1)) == 24").unwrap().to_string(),
            "byte(0x000001) == 36"
        );
    }

    #[test]
    fn test_logical_folding() {
        assert_eq!(
            eval("byte(1) == 1 && always_true()").unwrap().to_string(),
            "byte(0x000001) == 1"
        );
        assert_eq!(
            eval("byte(1) == 1 || always_true()").unwrap(),
            Expression::Boolean(true)
        );
        assert_eq!(
            eval("always_false() && byte(1) == 1").unwrap(),
            Expression::Boolean(false)
        );
    }

    #[test]
    fn test_not_uses_de_morgan() {
        let Expression::Conditional(or) = eval("!(byte(1) == 1 && byte(2) < 3)").unwrap() else {
            panic!("expected ||");
        };
        assert_eq!(or.op, LogicalOp::Or);
        let ops: Vec<_> = or
            .operands
            .iter()
            .map(|o| match o {
                Expression::Comparison(c) => c.op,
                other => panic!("unexpected {}", other),
            })
            .collect();
        assert_eq!(ops, vec![crate::expr::ComparisonOp::Ne, crate::expr::ComparisonOp::Ge]);
    }

    #[test]
    fn test_scope_constants() {
        let health = parse_expression("health == 5").unwrap();
        assert!(matches!(
            Evaluator::new().evaluate(&health),
            Err(Error::UndefinedIdentifier { .. })
        ));

        let mut scope = Scope::new();
        scope.define("health", eval("byte(0x10)").unwrap());
        let evaluator = Evaluator::with_scope(scope);
        assert!(matches!(
            evaluator.evaluate(&health).unwrap(),
            Expression::Comparison(_)
        ));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(eval("nope(1)"), Err(Error::UndefinedFunction { .. })));
        assert!(matches!(eval("byte(1) && byte(2) == 1"), Err(Error::NotRequirement { .. })));
        assert!(matches!(eval("byte(1) == always_true()"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_tally_deduct() {
        let Expression::Tally(tally) =
            eval("tally(3, byte(1) == 1, deduct(byte(2) == 2))").unwrap()
        else {
            panic!("expected tally");
        };
        assert_eq!(tally.deducted.len(), 1);
        assert!(matches!(tally.deducted[0], Expression::Comparison(_)));
    }
}
