//! Built-in function table
//!
//! Memory readers, frame and transform wrappers, and the requirement
//! wrappers that attach flags and hit targets to clauses.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::expr::{
    Argument, ClauseFlag, Expression, FieldSize, FlaggedClause, MeasuredClause, MeasuredFormat,
    MemoryAccessor, MemoryValue, ModifiedAccessor, ModifierOperand, Tally, Temporal,
    ValueTransform,
};

/// Name of the marker accepted inside `tally(...)`
pub const DEDUCT: &str = "deduct";

/// A built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `byte(address)`, `word(address)`, ...
    Memory(FieldSize),
    /// `bit(index, address)`
    Bit,
    /// `prev(accessor)`, `prior(accessor)`
    Temporal(Temporal),
    /// `bcd(accessor)`, `invert(accessor)`
    Transform(ValueTransform),
    /// `once(clause)`
    Once,
    /// `repeated(count, clause)`
    Repeated,
    /// `tally(count, clause, ..., deduct(clause), ...)`
    Tally,
    /// `deduct(clause)`, only valid as a `tally` argument
    Deduct,
    /// `never`, `unless`, `trigger_when`
    Flag(ClauseFlag),
    /// `measured(clause, when=..., format=...)`
    Measured,
    /// `always_true()`, `always_false()`
    Constant(bool),
}

lazy_static::lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin> = {
        let mut table = HashMap::new();
        for size in FieldSize::ALL {
            table.insert(size.function_name(), Builtin::Memory(size));
        }
        table.insert("bit", Builtin::Bit);
        table.insert("prev", Builtin::Temporal(Temporal::Prev));
        table.insert("prior", Builtin::Temporal(Temporal::Prior));
        table.insert("bcd", Builtin::Transform(ValueTransform::Bcd));
        table.insert("invert", Builtin::Transform(ValueTransform::Invert));
        table.insert("once", Builtin::Once);
        table.insert("repeated", Builtin::Repeated);
        table.insert("tally", Builtin::Tally);
        table.insert(DEDUCT, Builtin::Deduct);
        table.insert("never", Builtin::Flag(ClauseFlag::ResetIf));
        table.insert("unless", Builtin::Flag(ClauseFlag::PauseIf));
        table.insert("trigger_when", Builtin::Flag(ClauseFlag::Trigger));
        table.insert("measured", Builtin::Measured);
        table.insert("always_true", Builtin::Constant(true));
        table.insert("always_false", Builtin::Constant(false));
        table
    };
}

/// Look up a built-in by name
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.get(name).copied()
}

impl Builtin {
    /// Apply the built-in to already evaluated arguments
    pub fn call(self, name: &str, args: &[Argument]) -> Result<Expression> {
        match self {
            Builtin::Memory(size) => {
                let [address] = positional::<1>(name, args)?;
                accessor(name, size, address)
            }
            Builtin::Bit => {
                let [index, address] = positional::<2>(name, args)?;
                let size = match index {
                    Expression::Integer(i) => u32::try_from(*i).ok().and_then(FieldSize::bit),
                    _ => None,
                }
                .ok_or_else(|| Error::arguments(name, "bit index must be between 0 and 7"))?;
                accessor(name, size, address)
            }
            Builtin::Temporal(temporal) => {
                let [value] = positional::<1>(name, args)?;
                with_temporal(name, temporal, value)
            }
            Builtin::Transform(transform) => {
                let [value] = positional::<1>(name, args)?;
                with_transform(name, transform, value)
            }
            Builtin::Once => {
                let [clause] = positional::<1>(name, args)?;
                Ok(Expression::Tally(Tally::repeated(1, requirement(name, clause)?)))
            }
            Builtin::Repeated => {
                let [count, clause] = positional::<2>(name, args)?;
                Ok(Expression::Tally(Tally::repeated(
                    hit_target(name, count)?,
                    requirement(name, clause)?,
                )))
            }
            Builtin::Tally => tally(name, args),
            Builtin::Deduct => Err(Error::arguments(
                name,
                "only valid as an argument of tally()",
            )),
            Builtin::Flag(flag) => {
                let [clause] = positional::<1>(name, args)?;
                Ok(Expression::Flagged(FlaggedClause {
                    flag,
                    clause: Box::new(requirement(name, clause)?),
                }))
            }
            Builtin::Measured => measured(name, args),
            Builtin::Constant(value) => {
                positional::<0>(name, args)?;
                Ok(Expression::Boolean(value))
            }
        }
    }
}

fn positional<'a, const N: usize>(name: &str, args: &'a [Argument]) -> Result<[&'a Expression; N]> {
    if let Some(named) = args.iter().find_map(|a| a.name.as_deref()) {
        return Err(Error::arguments(
            name,
            format!("unknown parameter '{}'", named),
        ));
    }
    let values: Vec<&Expression> = args.iter().map(|a| &a.value).collect();
    values.try_into().map_err(|values: Vec<&Expression>| {
        Error::arguments(
            name,
            format!("expected {} argument(s), got {}", N, values.len()),
        )
    })
}

fn requirement(name: &str, clause: &Expression) -> Result<Expression> {
    if !clause.is_requirement() {
        return Err(Error::arguments(
            name,
            format!("expected a requirement, got {} '{}'", clause.type_name(), clause),
        ));
    }
    Ok(clause.clone())
}

fn hit_target(name: &str, count: &Expression) -> Result<u32> {
    match count {
        Expression::Integer(n) if *n > 0 => u32::try_from(*n)
            .map_err(|_| Error::arguments(name, format!("hit target {} is too large", n))),
        other => Err(Error::arguments(
            name,
            format!("hit target must be a positive integer, got '{}'", other),
        )),
    }
}

/// Build an accessor; a non-constant address becomes a pointer plus offset
fn accessor(name: &str, size: FieldSize, address: &Expression) -> Result<Expression> {
    if let Expression::Integer(n) = address {
        let address = u32::try_from(*n)
            .map_err(|_| Error::arguments(name, format!("address {} is out of range", n)))?;
        return Ok(Expression::Accessor(MemoryAccessor::new(size, address)));
    }

    let value = MemoryValue::from_expression(address)?
        .filter(|v| !v.is_float())
        .ok_or_else(|| Error::TypeError {
            expected: "integer address".to_string(),
            got: address.type_name().to_string(),
        })?;
    let offset = value
        .constant
        .as_integer()
        .ok_or_else(|| Error::arguments(name, "address offset must be an integer"))?;

    tracing::trace!(function = name, offset, "indirect memory read");
    Ok(Expression::Accessor(MemoryAccessor::with_pointer(
        size,
        value.without_constant(),
        offset as u32,
    )))
}

fn retimed(name: &str, temporal: Temporal, accessor: &MemoryAccessor) -> Result<MemoryAccessor> {
    if accessor.temporal != Temporal::Current {
        return Err(Error::arguments(
            name,
            format!("'{}' already reads an earlier frame", accessor),
        ));
    }
    Ok(accessor.clone().with_temporal(temporal))
}

fn with_temporal(name: &str, temporal: Temporal, value: &Expression) -> Result<Expression> {
    match value {
        Expression::Accessor(a) => Ok(Expression::Accessor(retimed(name, temporal, a)?)),
        Expression::Modified(m) => {
            let operand = match &m.operand {
                ModifierOperand::Memory(a) => ModifierOperand::Memory(retimed(name, temporal, a)?),
                constant => constant.clone(),
            };
            Ok(Expression::Modified(ModifiedAccessor {
                accessor: retimed(name, temporal, &m.accessor)?,
                op: m.op,
                operand,
            }))
        }
        other => Err(Error::arguments(
            name,
            format!("expected a memory accessor, got {} '{}'", other.type_name(), other),
        )),
    }
}

fn with_transform(name: &str, transform: ValueTransform, value: &Expression) -> Result<Expression> {
    let Expression::Accessor(accessor) = value else {
        return Err(Error::arguments(
            name,
            format!("expected a memory accessor, got {} '{}'", value.type_name(), value),
        ));
    };
    if accessor.is_float() {
        return Err(Error::illegal(
            format!("Cannot apply {}() to a floating point value", name),
            value,
        ));
    }
    if accessor.transform != ValueTransform::None {
        return Err(Error::arguments(
            name,
            format!("'{}' is already transformed", accessor),
        ));
    }
    Ok(Expression::Accessor(accessor.clone().with_transform(transform)))
}

fn tally(name: &str, args: &[Argument]) -> Result<Expression> {
    let (count, clauses) = args
        .split_first()
        .ok_or_else(|| Error::arguments(name, "expected a hit target"))?;
    if let Some(named) = args.iter().find_map(|a| a.name.as_deref()) {
        return Err(Error::arguments(name, format!("unknown parameter '{}'", named)));
    }

    let mut tally = Tally {
        target: hit_target(name, &count.value)?,
        clauses: Vec::new(),
        deducted: Vec::new(),
    };
    for arg in clauses {
        match &arg.value {
            Expression::Call(call) if call.name == DEDUCT => {
                let [clause] = positional::<1>(DEDUCT, &call.args)?;
                tally.deducted.push(requirement(DEDUCT, clause)?);
            }
            clause => tally.clauses.push(requirement(name, clause)?),
        }
    }

    if tally.clauses.is_empty() {
        return Err(Error::arguments(name, "expected at least one counted clause"));
    }
    Ok(Expression::Tally(tally))
}

fn measured(name: &str, args: &[Argument]) -> Result<Expression> {
    let mut clause = None;
    let mut when = None;
    let mut format = MeasuredFormat::Raw;

    for arg in args {
        match arg.name.as_deref() {
            None if clause.is_none() => clause = Some(requirement(name, &arg.value)?),
            None => return Err(Error::arguments(name, "expected a single measured clause")),
            Some("when") => when = Some(Box::new(requirement(name, &arg.value)?)),
            Some("format") => {
                format = match &arg.value {
                    Expression::String(s) if s == "raw" => MeasuredFormat::Raw,
                    Expression::String(s) if s == "percent" => MeasuredFormat::Percent,
                    other => {
                        return Err(Error::arguments(
                            name,
                            format!("format must be \"raw\" or \"percent\", got '{}'", other),
                        ))
                    }
                }
            }
            Some(other) => {
                return Err(Error::arguments(name, format!("unknown parameter '{}'", other)))
            }
        }
    }

    let clause = clause.ok_or_else(|| Error::arguments(name, "expected a measured clause"))?;
    Ok(Expression::Measured(MeasuredClause {
        clause: Box::new(clause),
        when,
        format,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Comparison, ComparisonOp};

    fn arg(value: Expression) -> Argument {
        Argument { name: None, value }
    }

    fn named(name: &str, value: Expression) -> Argument {
        Argument {
            name: Some(name.to_string()),
            value,
        }
    }

    fn call(name: &str, args: Vec<Argument>) -> Result<Expression> {
        lookup(name)
            .ok_or_else(|| Error::UndefinedFunction {
                name: name.to_string(),
            })?
            .call(name, &args)
    }

    fn byte(address: u32) -> Expression {
        Expression::Accessor(MemoryAccessor::new(FieldSize::Byte, address))
    }

    fn clause() -> Expression {
        Expression::Comparison(Comparison::new(
            MemoryAccessor::new(FieldSize::Byte, 1).into(),
            ComparisonOp::Eq,
            MemoryValue::default(),
        ))
    }

    #[test]
    fn test_every_field_size_is_callable() {
        for size in FieldSize::ALL {
            assert_eq!(lookup(size.function_name()), Some(Builtin::Memory(size)));
        }
    }

    #[test]
    fn test_memory_reader() {
        assert_eq!(call("byte", vec![arg(Expression::Integer(0x1234))]).unwrap(), byte(0x1234));
        assert!(matches!(
            call("byte", vec![arg(Expression::Integer(-1))]),
            Err(Error::InvalidArguments { .. })
        ));
        assert!(matches!(
            call("word", vec![]),
            Err(Error::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_pointer_address() {
        let pointer = MemoryValue::from(MemoryAccessor::new(FieldSize::DWord, 0x10));
        let address = Expression::Value(pointer.add_constant(crate::expr::Number::Integer(8)));
        let Expression::Accessor(accessor) = call("byte", vec![arg(address)]).unwrap() else {
            panic!("expected accessor");
        };
        assert_eq!(accessor.field.address, 8);
        assert_eq!(
            accessor.pointer().and_then(MemoryValue::single_accessor),
            Some(&MemoryAccessor::new(FieldSize::DWord, 0x10))
        );
    }

    #[test]
    fn test_bit() {
        let Expression::Accessor(accessor) =
            call("bit", vec![arg(Expression::Integer(3)), arg(Expression::Integer(4))]).unwrap()
        else {
            panic!("expected accessor");
        };
        assert_eq!(accessor.size(), FieldSize::Bit3);
        assert!(call("bit", vec![arg(Expression::Integer(8)), arg(Expression::Integer(4))]).is_err());
    }

    #[test]
    fn test_wrappers() {
        let prev = call("prev", vec![arg(byte(1))]).unwrap();
        assert!(matches!(&prev, Expression::Accessor(a) if a.temporal == Temporal::Prev));
        assert!(call("prior", vec![arg(prev)]).is_err());

        let bcd = call("bcd", vec![arg(byte(1))]).unwrap();
        assert!(matches!(bcd, Expression::Accessor(a) if a.transform == ValueTransform::Bcd));
        let float = Expression::Accessor(MemoryAccessor::new(FieldSize::Float, 1));
        assert!(matches!(
            call("invert", vec![arg(float)]),
            Err(Error::IllegalOperation { .. })
        ));
    }

    #[test]
    fn test_requirement_wrappers() {
        let once = call("once", vec![arg(clause())]).unwrap();
        assert!(matches!(once, Expression::Tally(t) if t.target == 1));
        assert!(call("repeated", vec![arg(Expression::Integer(0)), arg(clause())]).is_err());
        assert!(call("never", vec![arg(byte(1))]).is_err());
        assert_eq!(call("always_false", vec![]).unwrap(), Expression::Boolean(false));
    }

    #[test]
    fn test_tally_with_deduct() {
        let deduct = Expression::Call(crate::expr::FunctionCall {
            name: DEDUCT.to_string(),
            args: vec![arg(clause())],
        });
        let tally = call(
            "tally",
            vec![arg(Expression::Integer(5)), arg(clause()), arg(deduct)],
        )
        .unwrap();
        let Expression::Tally(tally) = tally else {
            panic!("expected tally");
        };
        assert_eq!((tally.target, tally.clauses.len(), tally.deducted.len()), (5, 1, 1));
        assert!(call(DEDUCT, vec![arg(clause())]).is_err());
    }

    #[test]
    fn test_measured_named_arguments() {
        let measured = call(
            "measured",
            vec![
                arg(clause()),
                named("when", clause()),
                named("format", Expression::String("percent".to_string())),
            ],
        )
        .unwrap();
        let Expression::Measured(measured) = measured else {
            panic!("expected measured");
        };
        assert_eq!(measured.format, MeasuredFormat::Percent);
        assert!(measured.when.is_some());

        assert!(call("measured", vec![arg(clause()), named("unit", clause())]).is_err());
    }
}
