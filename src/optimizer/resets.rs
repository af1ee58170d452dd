//! ResetNextIf promotion
//!
//! `Z:x_y.n.` resets only `y`, while `R:x` resets every hit count in the
//! trigger and fails the frame. They agree when `y` is the only hit-counting
//! condition anywhere and `y` sits in an unpaused core: either way the core
//! fails for the frame and the only counter returns to zero.

use super::{changed, pauses, rebuild, segments, split, uses_recall, OptimizerOptions};
use crate::trigger::{Condition, ConditionFlag, Trigger, Unit};

/// Turn the ResetNextIf guards of the only counted core unit into ResetIf units
pub fn promote_reset_next(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    let counted = trigger
        .groups()
        .flat_map(|g| g.conditions.iter())
        .filter(|c| c.hit_target > 0)
        .count();
    if counted != 1 {
        return None;
    }

    let (core, alts) = split(trigger);
    if pauses(&core) {
        return None;
    }

    let position = core.iter().position(|unit| guarded(unit).is_some())?;
    let parts = guarded(&core[position])?;

    tracing::trace!(guards = parts.len() - 1, "promoting ResetNextIf to ResetIf");
    let mut promoted: Vec<Unit> = Vec::with_capacity(core.len() + parts.len());
    for (i, unit) in core.into_iter().enumerate() {
        if i != position {
            promoted.push(unit);
            continue;
        }
        let count = parts.len();
        for (j, mut segment) in parts.iter().cloned().enumerate() {
            if j + 1 < count {
                if let Some(last) = segment.last_mut() {
                    last.flag = ConditionFlag::ResetIf;
                }
            }
            promoted.push(segment);
        }
    }
    changed(trigger, rebuild(promoted, alts))
}

/// Segments of `Z:..._Z:..._y.n.` when `y` is the unit's only counted condition
fn guarded(unit: &[Condition]) -> Option<Vec<Unit>> {
    if uses_recall(unit) {
        return None;
    }
    let parts = segments(unit);
    let (last, guards) = parts.split_last()?;
    let terminal = last.last()?;
    if guards.is_empty() || terminal.hit_target == 0 || !requires(terminal.flag) {
        return None;
    }
    let all_reset_next = guards.iter().all(|s| {
        s.last()
            .is_some_and(|c| c.flag == ConditionFlag::ResetNextIf && c.hit_target == 0)
    });
    all_reset_next.then_some(parts)
}

/// Flags whose condition must hold for the group to be true
fn requires(flag: ConditionFlag) -> bool {
    matches!(
        flag,
        ConditionFlag::None
            | ConditionFlag::Trigger
            | ConditionFlag::Measured
            | ConditionFlag::MeasuredPercent
            | ConditionFlag::MeasuredIf
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Engine, Memory};

    fn promoted(text: &str) -> String {
        let trigger = Trigger::parse(text).unwrap();
        promote_reset_next(&trigger, &OptimizerOptions::default())
            .unwrap_or(trigger)
            .serialize()
    }

    #[test]
    fn test_single_counter_promotes() {
        assert_eq!(
            promoted("0xH000003=3_Z:0xH000002=0_0xH000001=1.10."),
            "0xH000003=3_R:0xH000002=0_0xH000001=1.10."
        );
    }

    #[test]
    fn test_other_counter_blocks() {
        let text = "0xH000003=3.2._Z:0xH000002=0_0xH000001=1.10.";
        assert_eq!(promoted(text), text);
    }

    #[test]
    fn test_pause_blocks() {
        let text = "P:0xH000003=3_Z:0xH000002=0_0xH000001=1.10.";
        assert_eq!(promoted(text), text);
    }

    #[test]
    fn test_reset_terminal_stays() {
        let text = "Z:0xH000002=0_R:0xH000001=1.10._0xH000003=3";
        assert_eq!(promoted(text), text);

        // x resets only the ResetIf counter, so the core still fires
        let trigger = crate::optimizer::optimize(&Trigger::parse(text).unwrap()).unwrap();
        let memory = Memory::from_bytes(vec![0, 1, 0, 3]);
        let mut engine = Engine::new(trigger);
        for _ in 0..3 {
            assert!(engine.do_frame(&memory));
        }
    }

    #[test]
    fn test_alternate_guard_stays() {
        let text = "0xH000003=3SZ:0xH000002=0_0xH000001=1.10.S0xH000004=4";
        assert_eq!(promoted(text), text);
    }
}
