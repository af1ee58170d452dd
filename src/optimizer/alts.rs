//! Alternate group rewrites

use super::{changed, pauses, rebuild, segments, split, uses_recall, OptimizerOptions};
use crate::trigger::{is_pure, unit_flag, Condition, ConditionFlag, Trigger, Unit};

/// Remove side-effect free alternate units that the core already requires
pub fn remove_core_units(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    if trigger.alts.is_empty() {
        return None;
    }
    let (core, mut alts) = split(trigger);
    for alt in &mut alts {
        alt.retain(|unit| !(is_pure(unit) && core.contains(unit)));
    }
    changed(trigger, rebuild(core, alts))
}

/// Hoist units present in every alternate into the core.
///
/// Hit counts and resets behave the same in the core only while no group can
/// pause, and a PauseIf never moves.
pub fn promote_common_units(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    if trigger.alts.len() < 2 {
        return None;
    }
    let (mut core, mut alts) = split(trigger);
    let pausing = pauses(&core) || alts.iter().any(|a| pauses(a));

    let common: Vec<Unit> = alts[0]
        .iter()
        .filter(|unit| alts[1..].iter().all(|alt| alt.contains(*unit)))
        .filter(|unit| {
            is_pure(unit) || (!pausing && unit_flag(unit) != ConditionFlag::PauseIf)
        })
        .filter(|unit| **unit != [Condition::always_true()])
        .cloned()
        .collect();
    if common.is_empty() {
        return None;
    }

    tracing::trace!(count = common.len(), "promoting units shared by every alternate");
    for alt in &mut alts {
        alt.retain(|unit| !common.contains(unit));
    }
    for unit in common {
        if !core.contains(&unit) {
            core.push(unit);
        }
    }
    changed(trigger, rebuild(core, alts))
}

/// Drop alternates that are implied by another alternate
pub fn absorb_alternates(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    if trigger.alts.len() < 2 {
        return None;
    }
    let (core, alts) = split(trigger);
    let pure: Vec<bool> = alts
        .iter()
        .map(|alt| alt.iter().all(|u| is_pure(u)))
        .collect();

    let mut removed = vec![false; alts.len()];
    for i in 0..alts.len() {
        if removed[i] || !pure[i] {
            continue;
        }
        for j in 0..alts.len() {
            if i == j || removed[j] || !pure[j] {
                continue;
            }
            let subset = alts[i].iter().all(|u| alts[j].contains(u));
            let equal = subset && alts[j].iter().all(|u| alts[i].contains(u));
            if subset && (!equal || j > i) {
                removed[j] = true;
            }
        }
    }
    if !removed.contains(&true) {
        return None;
    }

    let alts = alts
        .into_iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(alt, _)| alt)
        .collect();
    changed(trigger, rebuild(core, alts))
}

/// Disjuncts of a side-effect free OrNext chain
fn or_branches(unit: &[Condition]) -> Option<Vec<Unit>> {
    if !is_pure(unit) || uses_recall(unit) || unit_flag(unit) != ConditionFlag::None {
        return None;
    }
    let parts = segments(unit);
    let (_, links) = parts.split_last()?;
    let uniform = links
        .iter()
        .all(|s| s.last().is_some_and(|c| c.flag == ConditionFlag::OrNext));
    if links.is_empty() || !uniform {
        return None;
    }
    Some(
        parts
            .into_iter()
            .map(|mut segment| {
                if let Some(last) = segment.last_mut() {
                    last.flag = ConditionFlag::None;
                }
                segment
            })
            .collect(),
    )
}

/// Distribute a core OrNext chain over the alternates.
///
/// Skipped when the product would exceed `max_alternates`; the chain then
/// stays as an OrNext unit.
pub fn expand_or_chains(trigger: &Trigger, options: &OptimizerOptions) -> Option<Trigger> {
    let (core, alts) = split(trigger);
    if alts.iter().any(|a| pauses(a)) {
        return None;
    }

    let width = alts.len().max(1);
    let (index, branches) = core.iter().enumerate().find_map(|(i, unit)| {
        let branches = or_branches(unit)?;
        if branches.len() * width > options.max_alternates {
            tracing::warn!(
                branches = branches.len(),
                alternates = alts.len(),
                max_alternates = options.max_alternates,
                "OrNext chain left unexpanded, alternate limit reached"
            );
            return None;
        }
        Some((i, branches))
    })?;

    tracing::trace!(branches = branches.len(), alternates = alts.len(), "expanding OrNext chain");
    let mut core = core;
    core.remove(index);

    let alts = if alts.is_empty() {
        branches.into_iter().map(|b| vec![b]).collect()
    } else {
        alts.iter()
            .flat_map(|alt| {
                branches.iter().map(move |branch| {
                    let mut expanded = alt.clone();
                    expanded.push(branch.clone());
                    expanded
                })
            })
            .collect()
    };
    changed(trigger, rebuild(core, alts))
}

/// Fold a lone alternate into the core when neither group pauses
pub fn merge_single_alternate(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    if trigger.alts.len() != 1 {
        return None;
    }
    let (mut core, mut alts) = split(trigger);
    let alt = alts.pop()?;
    if pauses(&core) || pauses(&alt) {
        return None;
    }
    core.extend(alt.into_iter().filter(|u| *u != [Condition::always_true()]));
    if core.is_empty() {
        core.push(vec![Condition::always_true()]);
    }
    changed(trigger, rebuild(core, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pass: super::super::Pass, text: &str) -> String {
        let trigger = Trigger::parse(text).unwrap();
        pass(&trigger, &OptimizerOptions::default())
            .unwrap_or(trigger)
            .serialize()
    }

    #[test]
    fn test_remove_core_units() {
        assert_eq!(
            run(remove_core_units, "0xH000001=1S0xH000001=1_0xH000002=2S0xH000001=1"),
            "0xH000001=1S0xH000002=2S1=1"
        );
    }

    #[test]
    fn test_promote_pure_units() {
        assert_eq!(
            run(promote_common_units, "0xH000009=9S0xH000001=1_0xH000002=2S0xH000003=3_0xH000001=1"),
            "0xH000009=9_0xH000001=1S0xH000002=2S0xH000003=3"
        );
    }

    #[test]
    fn test_promote_reset_without_pause() {
        assert_eq!(
            run(promote_common_units, "S0xH000002=2_R:0xH000009=1S0xH000003=3_R:0xH000009=1"),
            "R:0xH000009=1S0xH000002=2S0xH000003=3"
        );
    }

    #[test]
    fn test_paused_alternate_keeps_reset() {
        let text = "S0xH000002=2_R:0xH000009=1_P:0xH000008=1S0xH000003=3_R:0xH000009=1";
        assert_eq!(run(promote_common_units, text), text);
    }

    #[test]
    fn test_absorb() {
        assert_eq!(
            run(absorb_alternates, "S0xH000001=1_0xH000002=2S0xH000001=1S0xH000001=1"),
            "S0xH000001=1"
        );
    }

    #[test]
    fn test_expand_or_chain_without_alternates() {
        assert_eq!(
            run(expand_or_chains, "0xH000009=9_O:0xH000001=1_A:0xH000003_0xH000002=2"),
            "0xH000009=9S0xH000001=1SA:0xH000003_0xH000002=2"
        );
    }

    #[test]
    fn test_expand_respects_limit() {
        let trigger = Trigger::parse("O:0xH000001=1_O:0xH000002=2_0xH000003=3").unwrap();
        let options = OptimizerOptions {
            max_alternates: 2,
            ..OptimizerOptions::default()
        };
        assert_eq!(expand_or_chains(&trigger, &options), None);
    }

    #[test]
    fn test_merge_single_alternate() {
        assert_eq!(
            run(merge_single_alternate, "0xH000001=1S0xH000002=2"),
            "0xH000001=1_0xH000002=2"
        );
        let text = "0xH000001=1S0xH000002=2_P:0xH000003=3";
        assert_eq!(run(merge_single_alternate, text), text);
    }
}
