//! Requirement expression to condition list
//!
//! The first top-level `||` becomes alternate groups. Every other `||`
//! compiles to an `OrNext` chain and every nested `&&` to an `AndNext`
//! chain. Memory sums compile to `AddSource`/`SubSource` prefixes ending in
//! the condition that carries the comparison.

use super::condition::{Condition, ConditionFlag, Operand, RequirementGroup, Trigger, Unit};
use crate::error::{Error, Result};
use crate::expr::{
    ClauseFlag, Comparison, Conditional, Expression, FlaggedClause, LogicalOp, MeasuredClause,
    MeasuredFormat, MemoryAccessor, MemoryValue, ModifierOperand, Number, Sign, SignedTerm, Tally,
    Term,
};

/// Compile a requirement expression into a trigger
pub fn build_trigger(expr: &Expression) -> Result<Trigger> {
    TriggerBuilder::new().build(expr)
}

/// Walks requirement expressions and emits conditions
#[derive(Debug, Default)]
pub struct TriggerBuilder;

fn conjuncts(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Conditional(Conditional {
            op: LogicalOp::And,
            operands,
        }) => operands.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

fn is_disjunction(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Conditional(Conditional {
            op: LogicalOp::Or,
            ..
        })
    )
}

fn constant_operand(n: Number) -> Result<Operand> {
    match n {
        Number::Integer(v) => u32::try_from(v).map(Operand::Value).map_err(|_| {
            Error::illegal("Constant is outside the unsigned 32-bit range", v)
        }),
        Number::Float(v) => Ok(Operand::Float(v)),
    }
}

fn flag_name(flag: ConditionFlag) -> &'static str {
    match flag {
        ConditionFlag::ResetIf => "ResetIf",
        ConditionFlag::PauseIf => "PauseIf",
        ConditionFlag::ResetNextIf => "ResetNextIf",
        ConditionFlag::AndNext => "AndNext",
        ConditionFlag::OrNext => "OrNext",
        ConditionFlag::Measured => "Measured",
        ConditionFlag::MeasuredPercent => "MeasuredPercent",
        ConditionFlag::MeasuredIf => "MeasuredIf",
        ConditionFlag::Trigger => "Trigger",
        ConditionFlag::AddHits => "AddHits",
        ConditionFlag::SubHits => "SubHits",
        _ => "a value flag",
    }
}

fn function_name(flag: ConditionFlag) -> &'static str {
    match flag {
        ConditionFlag::ResetIf | ConditionFlag::ResetNextIf => "never",
        ConditionFlag::PauseIf => "unless",
        ConditionFlag::Trigger => "trigger_when",
        ConditionFlag::Measured | ConditionFlag::MeasuredPercent => "measured",
        ConditionFlag::MeasuredIf => "when",
        ConditionFlag::AddHits | ConditionFlag::SubHits => "tally",
        _ => "flag",
    }
}

fn set_flag(unit: &mut Unit, flag: ConditionFlag, expr: &Expression) -> Result<()> {
    let last = unit
        .last_mut()
        .ok_or_else(|| Error::not_requirement(expr))?;
    if last.flag != ConditionFlag::None {
        return Err(Error::structural(
            format!(
                "Cannot apply '{}' to condition already flagged with {}",
                function_name(flag),
                flag_name(last.flag)
            ),
            expr,
        ));
    }
    last.flag = flag;
    Ok(())
}

fn set_hits(unit: &mut Unit, target: u32, expr: &Expression) -> Result<()> {
    let last = unit
        .last_mut()
        .ok_or_else(|| Error::not_requirement(expr))?;
    if last.hit_target != 0 {
        return Err(Error::structural(
            "Cannot apply a hit target to a clause that already has one",
            expr,
        ));
    }
    last.hit_target = target;
    Ok(())
}

/// Operands of a chained clause, with the nested sub-chain moved to the front.
///
/// The engine folds chains left to right, so a nested `&&`/`||` only keeps
/// its grouping as the first link. More than one nested sub-chain cannot be
/// expressed.
fn chain_order(conditional: &Conditional, expr: &Expression) -> Result<Vec<Expression>> {
    let mut nested = Vec::new();
    let mut plain = Vec::new();
    for operand in &conditional.operands {
        let operand = match operand {
            Expression::Not(inner) => inner.invert()?,
            other => other.clone(),
        };
        match operand {
            Expression::Conditional(_) => nested.push(operand),
            other => plain.push(other),
        }
    }

    if nested.len() > 1 {
        return Err(Error::structural(
            format!(
                "Cannot join more than one nested clause with '{}'",
                conditional.op.symbol()
            ),
            expr,
        ));
    }
    nested.extend(plain);
    Ok(nested)
}

/// Split `never(...)` clauses out of a conjunction
fn split_resets(expr: &Expression) -> (Vec<&Expression>, Expression) {
    let mut resets = Vec::new();
    let mut rest = Vec::new();
    for conjunct in conjuncts(expr) {
        match conjunct {
            Expression::Flagged(FlaggedClause {
                flag: ClauseFlag::ResetIf,
                clause,
            }) => resets.push(clause.as_ref()),
            other => rest.push(other.clone()),
        }
    }

    let rest = if rest.is_empty() {
        Expression::Boolean(true)
    } else {
        Conditional::flattened(LogicalOp::And, rest)
    };
    (resets, rest)
}

impl TriggerBuilder {
    /// Create a builder
    pub fn new() -> Self {
        TriggerBuilder
    }

    /// Compile an expression into core and alternate groups
    pub fn build(&self, expr: &Expression) -> Result<Trigger> {
        if !expr.is_requirement() {
            return Err(Error::not_requirement(expr));
        }

        let parts = conjuncts(expr);
        let alt_index = parts.iter().position(|part| is_disjunction(part));

        let mut core = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if Some(i) != alt_index {
                self.requirement(part, &mut core)?;
            }
        }

        let mut alts = Vec::new();
        if let Some(Expression::Conditional(disjunction)) = alt_index.map(|i| parts[i]) {
            for operand in &disjunction.operands {
                let mut group = Vec::new();
                for part in conjuncts(operand) {
                    self.requirement(part, &mut group)?;
                }
                alts.push(RequirementGroup::new(group));
            }
        }

        tracing::debug!(
            core = core.len(),
            alts = alts.len(),
            "built trigger"
        );

        Ok(Trigger {
            core: RequirementGroup::new(core),
            alts,
        })
    }

    /// Append one group-level requirement
    fn requirement(&self, expr: &Expression, out: &mut Vec<Condition>) -> Result<()> {
        match expr {
            Expression::Conditional(Conditional {
                op: LogicalOp::And,
                operands,
            }) => {
                for operand in operands {
                    self.requirement(operand, out)?;
                }
                Ok(())
            }
            Expression::Tally(tally) => self.tally(tally, expr, out),
            Expression::Flagged(flagged) => self.flagged(flagged, expr, out),
            Expression::Measured(measured) => self.measured(measured, expr, out),
            _ => {
                out.extend(self.unit(expr)?);
                Ok(())
            }
        }
    }

    /// Compile an expression into a single logical unit with an unflagged terminal condition
    fn unit(&self, expr: &Expression) -> Result<Unit> {
        match expr {
            Expression::Boolean(true) => Ok(vec![Condition::always_true()]),
            Expression::Boolean(false) => Ok(vec![Condition::always_false()]),
            Expression::Comparison(comparison) => self.comparison(comparison),
            Expression::Not(inner) => self.unit(&inner.invert()?),
            Expression::Conditional(conditional) => {
                let link = match conditional.op {
                    LogicalOp::And => ConditionFlag::AndNext,
                    LogicalOp::Or => ConditionFlag::OrNext,
                };
                let operands = chain_order(conditional, expr)?;
                let mut chain = Vec::new();
                let count = operands.len();
                for (i, operand) in operands.iter().enumerate() {
                    let mut unit = self.unit(operand)?;
                    if i + 1 < count {
                        set_flag(&mut unit, link, operand)?;
                    }
                    chain.extend(unit);
                }
                Ok(chain)
            }
            Expression::Tally(tally) if tally.is_single() => {
                let mut unit = self.unit(&tally.clauses[0])?;
                set_hits(&mut unit, tally.target, expr)?;
                Ok(unit)
            }
            Expression::Tally(_) => Err(Error::structural(
                "Cannot use tally inside a chained clause",
                expr,
            )),
            Expression::Flagged(flagged) => Err(Error::structural(
                format!(
                    "Cannot apply '{}' inside a chained clause",
                    flagged.flag.function_name()
                ),
                expr,
            )),
            Expression::Measured(_) => Err(Error::structural(
                "Cannot apply 'measured' inside a chained clause",
                expr,
            )),
            other => Err(Error::not_requirement(other)),
        }
    }

    fn tally(&self, tally: &Tally, expr: &Expression, out: &mut Vec<Condition>) -> Result<()> {
        if tally.is_single() {
            let (resets, rest) = split_resets(&tally.clauses[0]);
            self.reset_next(&resets, out)?;
            let mut unit = self.unit(&rest)?;
            set_hits(&mut unit, tally.target, expr)?;
            out.extend(unit);
            return Ok(());
        }

        let (last, added) = tally.clauses.split_last().ok_or_else(|| {
            Error::structural("tally requires at least one clause that is not deducted", expr)
        })?;

        for clause in added {
            self.tally_clause(clause, ConditionFlag::AddHits, out)?;
        }
        for clause in &tally.deducted {
            self.tally_clause(clause, ConditionFlag::SubHits, out)?;
        }

        let (resets, rest) = split_resets(last);
        self.reset_next(&resets, out)?;
        let mut unit = self.unit(&rest)?;
        if unit.last().map_or(false, |c| c.hit_target > 0) {
            set_flag(&mut unit, ConditionFlag::AddHits, last)?;
            out.extend(unit);
            unit = vec![Condition::always_false()];
        }
        set_hits(&mut unit, tally.target, expr)?;
        out.extend(unit);
        Ok(())
    }

    fn tally_clause(&self, clause: &Expression, flag: ConditionFlag, out: &mut Vec<Condition>) -> Result<()> {
        let (resets, rest) = split_resets(clause);
        self.reset_next(&resets, out)?;
        let mut unit = self.unit(&rest)?;
        set_flag(&mut unit, flag, clause)?;
        out.extend(unit);
        Ok(())
    }

    fn reset_next(&self, resets: &[&Expression], out: &mut Vec<Condition>) -> Result<()> {
        for reset in resets {
            let mut unit = self.unit(reset)?;
            set_flag(&mut unit, ConditionFlag::ResetNextIf, reset)?;
            out.extend(unit);
        }
        Ok(())
    }

    fn flagged(&self, flagged: &FlaggedClause, expr: &Expression, out: &mut Vec<Condition>) -> Result<()> {
        let clause = flagged.clause.as_ref();

        if let Expression::Flagged(inner) = clause {
            if flagged.flag == ClauseFlag::ResetIf && inner.flag == ClauseFlag::ResetIf {
                if inner.clause.has_hit_target() {
                    return Err(Error::structural(
                        "Cannot apply 'never' to condition already flagged with ResetIf",
                        expr,
                    ));
                }
                let inverted = FlaggedClause {
                    flag: ClauseFlag::ResetIf,
                    clause: Box::new(inner.clause.invert()?),
                };
                return self.flagged(&inverted, expr, out);
            }

            return Err(Error::structural(
                format!(
                    "Cannot apply '{}' to condition already flagged with {}",
                    flagged.flag.function_name(),
                    inner.flag.flag_name()
                ),
                expr,
            ));
        }

        let flag = match flagged.flag {
            ClauseFlag::ResetIf => ConditionFlag::ResetIf,
            ClauseFlag::PauseIf => ConditionFlag::PauseIf,
            ClauseFlag::Trigger => ConditionFlag::Trigger,
        };

        // reset and pause fire if any disjunct holds; trigger distributes over conjuncts
        let distribute = match flagged.flag {
            ClauseFlag::ResetIf | ClauseFlag::PauseIf => is_disjunction(clause),
            ClauseFlag::Trigger => conjuncts(clause).len() > 1,
        };
        if distribute {
            let parts: Vec<&Expression> = match clause {
                Expression::Conditional(c) if flagged.flag != ClauseFlag::Trigger => c.operands.iter().collect(),
                _ => conjuncts(clause),
            };
            for part in parts {
                let part_flagged = FlaggedClause {
                    flag: flagged.flag,
                    clause: Box::new(part.clone()),
                };
                self.flagged(&part_flagged, part, out)?;
            }
            return Ok(());
        }

        if let Expression::Tally(tally) = clause {
            if !tally.is_single() {
                let mut conditions = Vec::new();
                self.tally(tally, clause, &mut conditions)?;
                set_flag(&mut conditions, flag, expr)?;
                out.extend(conditions);
                return Ok(());
            }
        }

        let mut unit = self.unit(clause)?;
        set_flag(&mut unit, flag, expr)?;
        out.extend(unit);
        Ok(())
    }

    fn measured(&self, measured: &MeasuredClause, expr: &Expression, out: &mut Vec<Condition>) -> Result<()> {
        let flag = match measured.format {
            MeasuredFormat::Raw => ConditionFlag::Measured,
            MeasuredFormat::Percent => ConditionFlag::MeasuredPercent,
        };

        let mut conditions = Vec::new();
        match measured.clause.as_ref() {
            Expression::Tally(tally) => self.tally(tally, &measured.clause, &mut conditions)?,
            clause => conditions = self.unit(clause)?,
        }
        set_flag(&mut conditions, flag, expr)?;
        out.extend(conditions);

        if let Some(when) = &measured.when {
            for part in conjuncts(when) {
                let mut unit = self.unit(part)?;
                set_flag(&mut unit, ConditionFlag::MeasuredIf, part)?;
                out.extend(unit);
            }
        }
        Ok(())
    }

    /// Emit the `AddAddress` chain that establishes an accessor's pointer base
    fn pointer_chain(&self, accessor: &MemoryAccessor, out: &mut Vec<Condition>) -> Result<()> {
        let pointer = match accessor.pointer() {
            Some(pointer) => pointer,
            None => return Ok(()),
        };

        match pointer.terms.as_slice() {
            [SignedTerm {
                sign: Sign::Add,
                term,
            }] if pointer.constant.is_zero() => match term {
                Term::Accessor(_) | Term::Modified(_) => self.term(term, ConditionFlag::AddAddress, out),
                Term::Remembered(_) => Err(Error::structural(
                    "Cannot use a remembered value as a pointer",
                    pointer,
                )),
            },
            _ => Err(Error::structural(
                "Cannot use a pointer built from more than one value",
                pointer,
            )),
        }
    }

    /// Emit one term as a value condition with the given flag
    fn term(&self, term: &Term, flag: ConditionFlag, out: &mut Vec<Condition>) -> Result<()> {
        match term {
            Term::Accessor(a) => {
                self.pointer_chain(a, out)?;
                out.push(Condition::value(flag, Operand::memory(a)));
            }
            Term::Modified(m) => {
                self.pointer_chain(&m.accessor, out)?;
                let right = match &m.operand {
                    ModifierOperand::Constant(n) => constant_operand(*n)?,
                    ModifierOperand::Memory(b) => Operand::memory(b),
                };
                out.push(Condition::modified(flag, Operand::memory(&m.accessor), m.op, right));
            }
            Term::Remembered(r) => {
                out.push(Condition::modified(
                    flag,
                    Operand::Recall,
                    r.op,
                    constant_operand(r.operand)?,
                ));
            }
        }
        Ok(())
    }

    /// Emit the `Remember` chain for a remembered sum
    fn remember(&self, value: &MemoryValue, out: &mut Vec<Condition>) -> Result<()> {
        let last = value.terms.iter().rposition(|t| t.sign == Sign::Add);

        if last.is_some() && !value.constant.is_zero() {
            self.constant(value.constant, out)?;
        }
        for (i, t) in value.terms.iter().enumerate() {
            if matches!(t.term, Term::Remembered(_)) {
                return Err(Error::structural("Cannot nest remembered values", value));
            }
            if Some(i) != last {
                self.term(&t.term, source_flag(t.sign), out)?;
            }
        }

        match last {
            Some(i) => self.term(&value.terms[i].term, ConditionFlag::Remember, out),
            None => {
                out.push(Condition::value(ConditionFlag::Remember, constant_operand(value.constant)?));
                Ok(())
            }
        }
    }

    fn constant(&self, n: Number, out: &mut Vec<Condition>) -> Result<()> {
        let condition = if n.is_negative() {
            Condition::value(ConditionFlag::SubSource, constant_operand(n.negate())?)
        } else {
            Condition::value(ConditionFlag::AddSource, constant_operand(n)?)
        };
        out.push(condition);
        Ok(())
    }

    /// Emit a normalized comparison
    fn comparison(&self, comparison: &Comparison) -> Result<Unit> {
        let mut out = Vec::new();
        let left = &comparison.left;
        let expr = Expression::Comparison(comparison.clone());

        let remembered: Vec<&MemoryValue> = left
            .terms
            .iter()
            .filter_map(|t| match &t.term {
                Term::Remembered(r) => Some(r.value.as_ref()),
                _ => None,
            })
            .collect();
        match remembered.as_slice() {
            [] => {}
            [value] => self.remember(value, &mut out)?,
            _ => {
                return Err(Error::structural(
                    "Cannot combine more than one remembered value",
                    &expr,
                ))
            }
        }

        let last = left.terms.iter().rposition(|t| t.sign == Sign::Add);
        if last.is_some() && !left.constant.is_zero() {
            self.constant(left.constant, &mut out)?;
        }
        for (i, t) in left.terms.iter().enumerate() {
            if Some(i) != last {
                self.term(&t.term, source_flag(t.sign), &mut out)?;
            }
        }

        let (final_left, final_pointer) = match last.map(|i| &left.terms[i].term) {
            None => (constant_operand(left.constant)?, None),
            Some(Term::Accessor(a)) => {
                self.pointer_chain(a, &mut out)?;
                (Operand::memory(a), Some(a.pointer()))
            }
            Some(term) => {
                self.term(term, ConditionFlag::AddSource, &mut out)?;
                (Operand::Value(0), None)
            }
        };

        let right = if comparison.right.is_constant() {
            constant_operand(comparison.right.constant)?
        } else if let Some(r) = comparison.right.single_accessor() {
            match final_pointer {
                Some(pointer) if pointer == r.pointer() => {}
                Some(_) => {
                    return Err(Error::structural(
                        "Cannot compare values read through different pointers",
                        &expr,
                    ))
                }
                None => self.pointer_chain(r, &mut out)?,
            }
            Operand::memory(r)
        } else {
            return Err(Error::structural(
                "Cannot compare against a complex runtime value",
                &expr,
            ));
        };

        out.push(Condition::compare(final_left, comparison.op, right));
        tracing::trace!(comparison = %comparison, conditions = out.len(), "compiled comparison");
        Ok(out)
    }
}

fn source_flag(sign: Sign) -> ConditionFlag {
    match sign {
        Sign::Add => ConditionFlag::AddSource,
        Sign::Subtract => ConditionFlag::SubSource,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{normalize_comparison, ComparisonOp, FieldSize};

    fn byte(address: u32) -> MemoryAccessor {
        MemoryAccessor::new(FieldSize::Byte, address)
    }

    fn eq(accessor: MemoryAccessor, k: i64) -> Expression {
        let comparison = Comparison::new(
            MemoryValue::from(accessor),
            ComparisonOp::Eq,
            MemoryValue::from(Number::Integer(k)),
        );
        normalize_comparison(&comparison).unwrap_or(Expression::Comparison(comparison))
    }

    fn serialize(expr: &Expression) -> String {
        build_trigger(expr).unwrap().serialize()
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(serialize(&eq(byte(0x1234), 3)), "0xH001234=3");
    }

    #[test]
    fn test_constant_outside_u32_is_rejected() {
        for k in [-5, u32::MAX as i64 + 1] {
            let comparison = Comparison::new(
                MemoryValue::from(MemoryAccessor::new(FieldSize::DWord, 0x10)),
                ComparisonOp::Lt,
                MemoryValue::from(Number::Integer(k)),
            );
            let err = build_trigger(&Expression::Comparison(comparison)).unwrap_err();
            assert_eq!(err.class(), crate::error::ErrorClass::IllegalOperation);
        }
    }

    #[test]
    fn test_negative_constant_sum() {
        let mut left = MemoryValue::from(byte(1));
        left.add_term(Sign::Subtract, Term::Accessor(byte(2)));
        let comparison = Comparison::new(left, ComparisonOp::Eq, MemoryValue::from(Number::Integer(-1)));
        let expr = normalize_comparison(&comparison).unwrap();
        assert_eq!(serialize(&expr), "B:0xH000001_0xH000002=1");
    }

    #[test]
    fn test_pointer_shared_between_operands() {
        let pointer = MemoryValue::from(MemoryAccessor::new(FieldSize::DWord, 0x10));
        let a = MemoryAccessor::with_pointer(FieldSize::Byte, pointer.clone(), 4);
        let b = MemoryAccessor::with_pointer(FieldSize::Byte, pointer, 8);
        let comparison = Comparison::new(MemoryValue::from(a), ComparisonOp::Lt, MemoryValue::from(b));
        let expr = Expression::Comparison(comparison);
        assert_eq!(serialize(&expr), "I:0xX000010_0xH000004<0xH000008");
    }

    #[test]
    fn test_boolean_constants() {
        assert_eq!(serialize(&Expression::Boolean(true)), "1=1");
        assert_eq!(serialize(&Expression::Boolean(false)), "0=1");
    }

    #[test]
    fn test_alternates_from_first_disjunction() {
        let expr = Conditional::flattened(
            LogicalOp::And,
            vec![
                eq(byte(1), 1),
                Conditional::flattened(LogicalOp::Or, vec![eq(byte(2), 2), eq(byte(3), 3)]),
                Conditional::flattened(LogicalOp::Or, vec![eq(byte(4), 4), eq(byte(5), 5)]),
            ],
        );
        assert_eq!(
            serialize(&expr),
            "0xH000001=1_O:0xH000004=4_0xH000005=5S0xH000002=2S0xH000003=3"
        );
    }

    #[test]
    fn test_nested_chain_leads() {
        let or = |a, b| Conditional::flattened(LogicalOp::Or, vec![a, b]);
        let and = |a, b| Conditional::flattened(LogicalOp::And, vec![a, b]);

        let expr = and(
            or(eq(byte(1), 1), eq(byte(2), 2)),
            or(eq(byte(3), 3), and(eq(byte(4), 4), eq(byte(5), 5))),
        );
        assert_eq!(
            serialize(&expr),
            "N:0xH000004=4_O:0xH000005=5_0xH000003=3S0xH000001=1S0xH000002=2"
        );

        let expr = and(
            eq(byte(9), 9),
            or(
                and(eq(byte(1), 1), eq(byte(2), 2)),
                and(eq(byte(3), 3), eq(byte(4), 4)),
            ),
        );
        assert!(build_trigger(&expr).is_ok());

        let expr = and(
            or(eq(byte(8), 8), eq(byte(9), 9)),
            or(
                and(eq(byte(1), 1), eq(byte(2), 2)),
                and(eq(byte(3), 3), eq(byte(4), 4)),
            ),
        );
        assert!(matches!(
            build_trigger(&expr),
            Err(Error::Structural { .. })
        ));
    }

    #[test]
    fn test_wrappers() {
        let once = Expression::Tally(Tally::repeated(1, eq(byte(1), 1)));
        assert_eq!(serialize(&once), "0xH000001=1.1.");

        let never = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::ResetIf,
            clause: Box::new(eq(byte(2), 0)),
        });
        assert_eq!(serialize(&never), "R:0xH000002=0");

        let guarded = Expression::Tally(Tally::repeated(
            10,
            Conditional::flattened(LogicalOp::And, vec![eq(byte(1), 1), never.clone()]),
        ));
        assert_eq!(serialize(&guarded), "Z:0xH000002=0_0xH000001=1.10.");
    }

    #[test]
    fn test_trigger_when_distribution() {
        let both = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::Trigger,
            clause: Box::new(Conditional::flattened(LogicalOp::And, vec![eq(byte(1), 1), eq(byte(2), 2)])),
        });
        assert_eq!(serialize(&both), "T:0xH000001=1_T:0xH000002=2");

        let either = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::Trigger,
            clause: Box::new(Conditional::flattened(LogicalOp::Or, vec![eq(byte(1), 1), eq(byte(2), 2)])),
        });
        assert_eq!(serialize(&either), "O:0xH000001=1_T:0xH000002=2");
    }

    #[test]
    fn test_double_never() {
        let inner = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::ResetIf,
            clause: Box::new(eq(byte(1), 1)),
        });
        let outer = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::ResetIf,
            clause: Box::new(inner),
        });
        assert_eq!(serialize(&outer), "R:0xH000001!=1");

        let counted = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::ResetIf,
            clause: Box::new(Expression::Tally(Tally::repeated(1, eq(byte(1), 1)))),
        });
        let outer = Expression::Flagged(FlaggedClause {
            flag: ClauseFlag::ResetIf,
            clause: Box::new(counted),
        });
        let err = build_trigger(&outer).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Cannot apply 'never' to condition already flagged with ResetIf"));
    }

    #[test]
    fn test_not_requirement() {
        let err = build_trigger(&Expression::Accessor(byte(1))).unwrap_err();
        assert!(err.to_string().ends_with("expression is not a requirement expression"));
    }
}
