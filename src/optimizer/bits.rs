//! Bit merging
//!
//! Equality tests on all four bits of a nibble pin the nibble to a single
//! value, and equality tests on both nibbles of a byte pin the byte.

use super::{changed, rebuild, split, OptimizerOptions};
use crate::expr::{ComparisonOp, FieldSize, Temporal, ValueTransform};
use crate::trigger::{Condition, ConditionFlag, Operand, Trigger, Unit};

/// Read of a sub-byte field at a fixed address tested for equality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldTest {
    size: FieldSize,
    address: u32,
    temporal: Temporal,
    value: u32,
}

fn field_test(unit: &[Condition]) -> Option<FieldTest> {
    let [condition] = unit else {
        return None;
    };
    if condition.flag != ConditionFlag::None
        || condition.hit_target != 0
        || condition.comparison() != Some(ComparisonOp::Eq)
    {
        return None;
    }
    match (condition.left, condition.right) {
        (
            Operand::Memory {
                size,
                address,
                temporal,
                transform: ValueTransform::None,
            },
            Operand::Value(value),
        ) if value <= size.max_value() => Some(FieldTest {
            size,
            address,
            temporal,
            value,
        }),
        _ => None,
    }
}

/// Fields that combine into `target`, with each one's shift inside it
fn parts(target: FieldSize) -> Vec<(FieldSize, u32)> {
    match target {
        FieldSize::LowNibble => (0..4).filter_map(|i| FieldSize::bit(i).map(|s| (s, i))).collect(),
        FieldSize::HighNibble => (4..8)
            .filter_map(|i| FieldSize::bit(i).map(|s| (s, i - 4)))
            .collect(),
        FieldSize::Byte => vec![(FieldSize::LowNibble, 0), (FieldSize::HighNibble, 4)],
        _ => Vec::new(),
    }
}

/// Merge bit and nibble equalities into wider fields
pub fn merge_bits(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    let (core, alts) = split(trigger);
    let core = merge_group(core);
    let alts = alts.into_iter().map(merge_group).collect();
    changed(trigger, rebuild(core, alts))
}

fn merge_group(mut units: Vec<Unit>) -> Vec<Unit> {
    for target in [FieldSize::LowNibble, FieldSize::HighNibble, FieldSize::Byte] {
        while let Some(merged) = merge_once(&units, target) {
            units = merged;
        }
    }
    units
}

fn merge_once(units: &[Unit], target: FieldSize) -> Option<Vec<Unit>> {
    let pieces = parts(target);
    let anchors: Vec<FieldTest> = units
        .iter()
        .filter_map(|u| field_test(u))
        .filter(|t| t.size == pieces[0].0)
        .collect();

    for anchor in anchors {
        let mut positions = Vec::with_capacity(pieces.len());
        let mut value = 0;
        for &(size, shift) in &pieces {
            let found = units.iter().position(|u| {
                field_test(u).is_some_and(|t| {
                    t.size == size && t.address == anchor.address && t.temporal == anchor.temporal
                })
            });
            let Some(position) = found else {
                break;
            };
            let test = field_test(&units[position])?;
            value |= test.value << shift;
            positions.push(position);
        }
        if positions.len() != pieces.len() {
            continue;
        }

        tracing::trace!(address = anchor.address, size = ?target, value, "merged bit tests");
        let merged = Condition::compare(
            Operand::Memory {
                size: target,
                address: anchor.address,
                temporal: anchor.temporal,
                transform: ValueTransform::None,
            },
            ComparisonOp::Eq,
            Operand::Value(value),
        );
        let first = positions.iter().copied().min().unwrap_or(0);
        let mut result = Vec::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            if i == first {
                result.push(vec![merged]);
            } else if !positions.contains(&i) {
                result.push(unit.clone());
            }
        }
        return Some(result);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(text: &str) -> String {
        let trigger = Trigger::parse(text).unwrap();
        merge_bits(&trigger, &OptimizerOptions::default())
            .unwrap_or(trigger)
            .serialize()
    }

    #[test]
    fn test_low_bits_to_nibble() {
        assert_eq!(
            merged("0xM000010=1_0xN000010=1_0xH000001=5_0xO000010=1_0xP000010=1"),
            "0xL000010=15_0xH000001=5"
        );
    }

    #[test]
    fn test_mixed_pattern() {
        assert_eq!(
            merged("0xQ000010=1_0xR000010=0_0xS000010=1_0xT000010=0"),
            "0xU000010=5"
        );
    }

    #[test]
    fn test_all_bits_to_byte() {
        assert_eq!(
            merged("0xM000010=0_0xN000010=0_0xO000010=0_0xP000010=0_0xQ000010=0_0xR000010=0_0xS000010=0_0xT000010=0"),
            "0xH000010=0"
        );
    }

    #[test]
    fn test_incomplete_or_mixed_frames_stay() {
        let text = "0xM000010=1_0xN000010=1_0xO000010=1";
        assert_eq!(merged(text), text);
        let text = "0xM000010=1_0xN000010=1_0xO000010=1_d0xP000010=1";
        assert_eq!(merged(text), text);
    }
}
