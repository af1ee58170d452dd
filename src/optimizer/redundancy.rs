//! Duplicate removal and constant propagation

use super::{
    changed, constant_unit, join_chain, pauses, rebuild, segment_key, segments, split,
    uses_recall, OptimizerOptions,
};
use crate::trigger::{is_pure, unit_flag, Condition, ConditionFlag, Trigger, Unit};

/// Drop repeated units and repeated AndNext links.
///
/// ResetIf units that appear in both an alternate and an unpaused core only
/// need the core copy.
pub fn remove_duplicates(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    let (core, alts) = split(trigger);
    let core = dedupe_group(core);
    let mut alts: Vec<Vec<Unit>> = alts.into_iter().map(dedupe_group).collect();

    if !pauses(&core) {
        for alt in &mut alts {
            alt.retain(|unit| !(unit_flag(unit) == ConditionFlag::ResetIf && core.contains(unit)));
        }
    }

    changed(trigger, rebuild(core, alts))
}

fn dedupe_group(units: Vec<Unit>) -> Vec<Unit> {
    let mut kept: Vec<Unit> = Vec::with_capacity(units.len());
    for unit in units {
        let unit = dedupe_links(unit);
        let counts_into_next = unit
            .iter()
            .any(|c| matches!(c.flag, ConditionFlag::AddHits | ConditionFlag::SubHits));
        if counts_into_next || !kept.contains(&unit) {
            kept.push(unit);
        }
    }
    kept
}

fn dedupe_links(unit: Unit) -> Unit {
    if uses_recall(&unit) {
        return unit;
    }
    let parts = segments(&unit);
    let Some((last, links)) = parts.split_last() else {
        return unit;
    };
    let all_and = links.iter().all(|s| {
        s.last()
            .is_some_and(|c| c.flag == ConditionFlag::AndNext && c.hit_target == 0)
    });
    if links.is_empty() || !all_and {
        return unit;
    }
    let Some(terminal) = last.last().copied() else {
        return unit;
    };

    let mut terminal_key = segment_key(last);
    if let Some(c) = terminal_key.last_mut() {
        c.hit_target = 0;
    }

    let mut keys: Vec<Unit> = Vec::new();
    let mut kept: Vec<Unit> = Vec::new();
    for link in links {
        let key = segment_key(link);
        if key != terminal_key && !keys.contains(&key) {
            keys.push(key);
            kept.push(link.clone());
        }
    }
    if kept.len() == links.len() {
        return unit;
    }

    tracing::trace!(removed = links.len() - kept.len(), "dropping repeated AndNext links");
    kept.push(last.clone());
    join_chain(kept, ConditionFlag::AndNext, terminal.flag, terminal.hit_target)
}

/// Fold `always_true` and `always_false` through chains, groups and alternates
pub fn propagate_constants(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    let (core, alts) = split(trigger);
    let mut core = fold_group(core);
    let mut alts: Vec<Vec<Unit>> = alts.into_iter().map(fold_group).collect();

    let always_false = vec![vec![Condition::always_false()]];
    if alts.len() > 1 && alts.iter().any(|a| *a == always_false) {
        alts.retain(|a| *a != always_false);
        if alts.is_empty() {
            alts.push(always_false.clone());
        }
    }

    let satisfied = alts
        .iter()
        .any(|a| a.is_empty() || *a == [vec![Condition::always_true()]]);
    if satisfied && alts.iter().all(|a| a.iter().all(|u| is_pure(u))) {
        alts.clear();
    }

    if core.is_empty() && alts.is_empty() {
        core.push(vec![Condition::always_true()]);
    }

    changed(trigger, rebuild(core, alts))
}

fn constant_segment(segment: &[Condition]) -> Option<bool> {
    match segment {
        [condition] => condition.constant_truth(),
        _ => None,
    }
}

/// Fold constant links out of a pure AndNext or OrNext chain
fn fold_chain(unit: Unit) -> Unit {
    if uses_recall(&unit) {
        return unit;
    }
    let parts = segments(&unit);
    let (Some(last), Some(first)) = (parts.last(), parts.first()) else {
        return unit;
    };
    if parts.len() < 2 {
        return unit;
    }
    let Some(link) = first.last().map(|c| c.flag) else {
        return unit;
    };
    let Some(terminal) = last.last().copied() else {
        return unit;
    };
    let uniform = parts[..parts.len() - 1]
        .iter()
        .all(|s| s.last().is_some_and(|c| c.flag == link && c.hit_target == 0));
    if !uniform || !matches!(link, ConditionFlag::AndNext | ConditionFlag::OrNext) {
        return unit;
    }

    let absorbing = link == ConditionFlag::OrNext;
    if parts.iter().any(|s| constant_segment(s) == Some(absorbing)) {
        let condition = if absorbing {
            Condition::always_true()
        } else {
            Condition::always_false()
        };
        return vec![condition.with_flag(terminal.flag).with_hits(terminal.hit_target)];
    }

    let count = parts.len();
    let kept: Vec<Unit> = parts
        .into_iter()
        .filter(|s| constant_segment(s) != Some(!absorbing))
        .collect();
    if kept.len() == count {
        return unit;
    }
    if kept.is_empty() {
        let condition = if absorbing {
            Condition::always_false()
        } else {
            Condition::always_true()
        };
        return vec![condition.with_flag(terminal.flag).with_hits(terminal.hit_target)];
    }
    join_chain(kept, link, terminal.flag, terminal.hit_target)
}

fn fold_group(units: Vec<Unit>) -> Vec<Unit> {
    let mut units: Vec<Unit> = units.into_iter().map(fold_chain).collect();

    let observed = units.iter().flatten().any(|c| {
        matches!(
            c.flag,
            ConditionFlag::ResetIf
                | ConditionFlag::Measured
                | ConditionFlag::MeasuredPercent
                | ConditionFlag::MeasuredIf
        )
    });
    let never_true = units.iter().any(|u| {
        constant_unit(u) == Some(false)
            && matches!(unit_flag(u), ConditionFlag::None | ConditionFlag::Trigger)
    });
    if never_true && !observed {
        return vec![vec![Condition::always_false()]];
    }

    units.retain(|u| {
        !matches!(
            (constant_unit(u), unit_flag(u)),
            (Some(true), ConditionFlag::None | ConditionFlag::Trigger)
                | (Some(false), ConditionFlag::ResetIf | ConditionFlag::PauseIf)
        )
    });
    units
}
