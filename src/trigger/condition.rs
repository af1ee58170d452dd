//! Compiled conditions

use crate::expr::{ComparisonOp, FieldSize, MemoryAccessor, ModifierOp, Temporal, ValueTransform};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Condition flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionFlag {
    /// Plain condition
    #[default]
    None,
    /// `A:` add to the accumulator
    AddSource,
    /// `B:` subtract from the accumulator
    SubSource,
    /// `I:` use the value as the base address of the next condition
    AddAddress,
    /// `C:` add this condition's hits to the next condition
    AddHits,
    /// `D:` subtract this condition's hits from the next condition
    SubHits,
    /// `R:` reset all hit counts while true
    ResetIf,
    /// `P:` pause the group while true
    PauseIf,
    /// `Z:` reset the hits of the next condition while true
    ResetNextIf,
    /// `N:` AND with the next condition
    AndNext,
    /// `O:` OR with the next condition
    OrNext,
    /// `M:` measured value
    Measured,
    /// `G:` measured value reported as a percentage
    MeasuredPercent,
    /// `Q:` only measure while true
    MeasuredIf,
    /// `T:` trigger condition
    Trigger,
    /// `K:` store the accumulated value for `{recall}`
    Remember,
}

impl ConditionFlag {
    /// All flags
    pub const ALL: [ConditionFlag; 16] = [
        ConditionFlag::None,
        ConditionFlag::AddSource,
        ConditionFlag::SubSource,
        ConditionFlag::AddAddress,
        ConditionFlag::AddHits,
        ConditionFlag::SubHits,
        ConditionFlag::ResetIf,
        ConditionFlag::PauseIf,
        ConditionFlag::ResetNextIf,
        ConditionFlag::AndNext,
        ConditionFlag::OrNext,
        ConditionFlag::Measured,
        ConditionFlag::MeasuredPercent,
        ConditionFlag::MeasuredIf,
        ConditionFlag::Trigger,
        ConditionFlag::Remember,
    ];

    /// Serialization prefix letter
    pub fn prefix(self) -> Option<char> {
        match self {
            ConditionFlag::None => None,
            ConditionFlag::AddSource => Some('A'),
            ConditionFlag::SubSource => Some('B'),
            ConditionFlag::AddAddress => Some('I'),
            ConditionFlag::AddHits => Some('C'),
            ConditionFlag::SubHits => Some('D'),
            ConditionFlag::ResetIf => Some('R'),
            ConditionFlag::PauseIf => Some('P'),
            ConditionFlag::ResetNextIf => Some('Z'),
            ConditionFlag::AndNext => Some('N'),
            ConditionFlag::OrNext => Some('O'),
            ConditionFlag::Measured => Some('M'),
            ConditionFlag::MeasuredPercent => Some('G'),
            ConditionFlag::MeasuredIf => Some('Q'),
            ConditionFlag::Trigger => Some('T'),
            ConditionFlag::Remember => Some('K'),
        }
    }

    /// Flag for a prefix letter
    pub fn from_prefix(c: char) -> Option<ConditionFlag> {
        let c = c.to_ascii_uppercase();
        ConditionFlag::ALL
            .iter()
            .copied()
            .find(|f| f.prefix() == Some(c))
    }

    /// Whether the condition feeds into the following condition
    pub fn is_chaining(self) -> bool {
        matches!(
            self,
            ConditionFlag::AddSource
                | ConditionFlag::SubSource
                | ConditionFlag::AddAddress
                | ConditionFlag::AddHits
                | ConditionFlag::SubHits
                | ConditionFlag::ResetNextIf
                | ConditionFlag::AndNext
                | ConditionFlag::OrNext
                | ConditionFlag::Remember
        )
    }

    /// Whether the condition produces a value instead of a comparison
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            ConditionFlag::AddSource
                | ConditionFlag::SubSource
                | ConditionFlag::AddAddress
                | ConditionFlag::Remember
        )
    }
}

/// Operand of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Operand {
    /// Memory read
    Memory {
        /// Field size
        size: FieldSize,
        /// Address, relative to the `AddAddress` base if one precedes
        address: u32,
        /// Frame the value is read from
        temporal: Temporal,
        /// Transform applied to the raw value
        transform: ValueTransform,
    },
    /// Unsigned constant
    Value(u32),
    /// Float constant
    Float(f64),
    /// Value stored by the last `Remember`
    Recall,
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Operand::Memory { size, address, temporal, transform },
                Operand::Memory {
                    size: s,
                    address: a,
                    temporal: t,
                    transform: x,
                },
            ) => size == s && address == a && temporal == t && transform == x,
            (Operand::Value(a), Operand::Value(b)) => a == b,
            (Operand::Float(a), Operand::Float(b)) => a.to_bits() == b.to_bits(),
            (Operand::Recall, Operand::Recall) => true,
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl Hash for Operand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Operand::Memory { size, address, temporal, transform } => {
                size.hash(state);
                address.hash(state);
                temporal.hash(state);
                transform.hash(state);
            }
            Operand::Value(v) => v.hash(state),
            Operand::Float(v) => v.to_bits().hash(state),
            Operand::Recall => {}
        }
    }
}

impl Operand {
    /// Operand reading an accessor's field (pointer handled by the caller)
    pub fn memory(accessor: &MemoryAccessor) -> Operand {
        Operand::Memory {
            size: accessor.size(),
            address: accessor.field.address,
            temporal: accessor.temporal,
            transform: accessor.transform,
        }
    }

    /// Whether the operand reads memory
    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Memory { .. })
    }

    /// Largest value the operand can produce
    pub fn max_value(&self) -> Option<u32> {
        match self {
            Operand::Memory { size, .. } if size.is_float() => None,
            Operand::Memory { size, .. } => Some(size.max_value()),
            Operand::Value(v) => Some(*v),
            Operand::Float(_) | Operand::Recall => None,
        }
    }
}

/// Operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// No right operand
    None,
    /// Comparison
    Compare(ComparisonOp),
    /// Arithmetic modifier on a value condition
    Modify(ModifierOp),
}

impl Operator {
    /// Serialization symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Compare(ComparisonOp::Eq) => "=",
            Operator::Compare(op) => op.symbol(),
            Operator::Modify(op) => op.symbol(),
        }
    }
}

/// One flagged condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    /// Flag
    pub flag: ConditionFlag,
    /// Left operand
    pub left: Operand,
    /// Operator
    pub op: Operator,
    /// Right operand, `Value(0)` when `op` is `None`
    pub right: Operand,
    /// Required hit count, 0 for none
    pub hit_target: u32,
}

impl Condition {
    /// Comparison condition
    pub fn compare(left: Operand, op: ComparisonOp, right: Operand) -> Self {
        Condition {
            flag: ConditionFlag::None,
            left,
            op: Operator::Compare(op),
            right,
            hit_target: 0,
        }
    }

    /// Value condition with no operator
    pub fn value(flag: ConditionFlag, left: Operand) -> Self {
        Condition {
            flag,
            left,
            op: Operator::None,
            right: Operand::Value(0),
            hit_target: 0,
        }
    }

    /// Value condition with a modifier
    pub fn modified(flag: ConditionFlag, left: Operand, op: ModifierOp, right: Operand) -> Self {
        Condition {
            flag,
            left,
            op: Operator::Modify(op),
            right,
            hit_target: 0,
        }
    }

    /// `1=1`
    pub fn always_true() -> Self {
        Condition::compare(Operand::Value(1), ComparisonOp::Eq, Operand::Value(1))
    }

    /// `0=1`
    pub fn always_false() -> Self {
        Condition::compare(Operand::Value(0), ComparisonOp::Eq, Operand::Value(1))
    }

    /// Copy with a different flag
    pub fn with_flag(mut self, flag: ConditionFlag) -> Self {
        self.flag = flag;
        self
    }

    /// Copy with a hit target
    pub fn with_hits(mut self, hit_target: u32) -> Self {
        self.hit_target = hit_target;
        self
    }

    /// Comparison operator, if the condition compares
    pub fn comparison(&self) -> Option<ComparisonOp> {
        match self.op {
            Operator::Compare(op) => Some(op),
            _ => None,
        }
    }

    /// Truth value when both operands are constants
    pub fn constant_truth(&self) -> Option<bool> {
        let op = self.comparison()?;
        match (self.left, self.right) {
            (Operand::Value(a), Operand::Value(b)) => Some(op.test(a, b)),
            (Operand::Float(a), Operand::Float(b)) => Some(op.test(a, b)),
            (Operand::Value(a), Operand::Float(b)) => Some(op.test(a as f64, b)),
            (Operand::Float(a), Operand::Value(b)) => Some(op.test(a, b as f64)),
            _ => None,
        }
    }
}

/// One unit of a group: chaining conditions followed by their terminal condition
pub type Unit = Vec<Condition>;

/// Ordered list of conditions that must all hold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequirementGroup {
    /// Conditions in evaluation order
    pub conditions: Vec<Condition>,
}

impl RequirementGroup {
    /// Group from conditions
    pub fn new(conditions: Vec<Condition>) -> Self {
        RequirementGroup { conditions }
    }

    /// Group from units
    pub fn from_units(units: Vec<Unit>) -> Self {
        RequirementGroup {
            conditions: units.into_iter().flatten().collect(),
        }
    }

    /// Whether the group has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Split the group into units
    pub fn units(&self) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut current = Vec::new();
        for condition in &self.conditions {
            current.push(*condition);
            if !condition.flag.is_chaining() {
                units.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            units.push(current);
        }
        units
    }

    /// Whether any condition carries the flag
    pub fn has_flag(&self, flag: ConditionFlag) -> bool {
        self.conditions.iter().any(|c| c.flag == flag)
    }

    /// Whether any condition carries a hit target
    pub fn has_hit_targets(&self) -> bool {
        self.conditions.iter().any(|c| c.hit_target > 0)
    }
}

/// Compiled trigger: every core condition and at least one alternate must hold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Trigger {
    /// Core group
    pub core: RequirementGroup,
    /// Alternate groups
    pub alts: Vec<RequirementGroup>,
}

impl Trigger {
    /// Trigger with only a core group
    pub fn new(core: RequirementGroup) -> Self {
        Trigger {
            core,
            alts: Vec::new(),
        }
    }

    /// Core followed by every alternate
    pub fn groups(&self) -> impl Iterator<Item = &RequirementGroup> {
        std::iter::once(&self.core).chain(self.alts.iter())
    }

    /// Total number of conditions
    pub fn condition_count(&self) -> usize {
        self.groups().map(|g| g.conditions.len()).sum()
    }

    /// Whether any group contains the flag
    pub fn has_flag(&self, flag: ConditionFlag) -> bool {
        self.groups().any(|g| g.has_flag(flag))
    }
}

/// Whether a unit has no flags, hit targets or side effects
pub fn is_pure(unit: &[Condition]) -> bool {
    unit.iter().all(|c| {
        c.hit_target == 0
            && matches!(
                c.flag,
                ConditionFlag::None
                    | ConditionFlag::AddSource
                    | ConditionFlag::SubSource
                    | ConditionFlag::AddAddress
                    | ConditionFlag::AndNext
                    | ConditionFlag::OrNext
                    | ConditionFlag::Remember
            )
    })
}

/// Flag of the unit's terminal condition
pub fn unit_flag(unit: &[Condition]) -> ConditionFlag {
    unit.last().map_or(ConditionFlag::None, |c| c.flag)
}
