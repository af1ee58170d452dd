//! # Requirements optimizer
//!
//! Rewrites a compiled [`Trigger`] into an equivalent, smaller one. Every
//! pass is a pure function from a trigger to `Some(rewritten)` or `None`
//! when it has nothing to do; [`Optimizer::optimize`] runs them in order
//! until a whole round leaves the trigger unchanged.
//!
//! Passes:
//! - Duplicate removal (units, AndNext links, alternate units already in the core)
//! - `always_true` / `always_false` propagation
//! - Range narrowing by interval arithmetic
//! - Bit merging into nibbles and bytes
//! - Promotion of units common to every alternate
//! - Absorption of alternates implied by others
//! - OrNext expansion into alternates, bounded by `max_alternates`
//! - ResetNextIf promotion to ResetIf
//! - Merging a lone alternate into the core

mod alts;
mod bits;
mod ranges;
mod redundancy;
mod resets;

use crate::error::{Error, Result};
use crate::trigger::{Condition, ConditionFlag, RequirementGroup, Trigger, Unit};
use serde::{Deserialize, Serialize};

/// Optimizer limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Largest alternate count an OrNext expansion may produce
    pub max_alternates: usize,
    /// Rounds before the optimizer gives up
    pub max_passes: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_alternates: 20,
            max_passes: 64,
        }
    }
}

/// A rewrite over the whole trigger
pub type Pass = fn(&Trigger, &OptimizerOptions) -> Option<Trigger>;

const PASSES: &[(&str, Pass)] = &[
    ("remove_duplicates", redundancy::remove_duplicates),
    ("propagate_constants", redundancy::propagate_constants),
    ("narrow_ranges", ranges::narrow_ranges),
    ("merge_bits", bits::merge_bits),
    ("remove_core_units", alts::remove_core_units),
    ("promote_common_units", alts::promote_common_units),
    ("absorb_alternates", alts::absorb_alternates),
    ("expand_or_chains", alts::expand_or_chains),
    ("merge_single_alternate", alts::merge_single_alternate),
    ("promote_reset_next", resets::promote_reset_next),
];

/// Fixed-point driver for the optimization passes
pub struct Optimizer {
    options: OptimizerOptions,
}

impl Optimizer {
    /// Create an optimizer with the given limits
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Limits in use
    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Run every pass until none fires
    pub fn optimize(&self, trigger: &Trigger) -> Result<Trigger> {
        let mut current = trigger.clone();

        for round in 0..self.options.max_passes {
            let mut changed = false;

            for (name, pass) in PASSES {
                if let Some(next) = pass(&current, &self.options) {
                    if next != current {
                        tracing::debug!(
                            pass = *name,
                            round,
                            before = current.condition_count(),
                            after = next.condition_count(),
                            "optimizer pass fired"
                        );
                        current = next;
                        changed = true;
                    }
                }
            }

            if !changed {
                return Ok(current);
            }
        }

        tracing::warn!(passes = self.options.max_passes, "optimizer did not converge");
        Err(Error::OptimizerDiverged {
            passes: self.options.max_passes,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerOptions::default())
    }
}

/// Optimize with default limits
pub fn optimize(trigger: &Trigger) -> Result<Trigger> {
    Optimizer::default().optimize(trigger)
}

/// Units of the core followed by the units of each alternate
pub(crate) fn split(trigger: &Trigger) -> (Vec<Unit>, Vec<Vec<Unit>>) {
    (
        trigger.core.units(),
        trigger.alts.iter().map(RequirementGroup::units).collect(),
    )
}

/// Reassemble a trigger, giving emptied alternates an `always_true` unit
pub(crate) fn rebuild(core: Vec<Unit>, alts: Vec<Vec<Unit>>) -> Trigger {
    Trigger {
        core: RequirementGroup::from_units(core),
        alts: alts
            .into_iter()
            .map(|units| {
                if units.is_empty() {
                    RequirementGroup::new(vec![Condition::always_true()])
                } else {
                    RequirementGroup::from_units(units)
                }
            })
            .collect(),
    }
}

/// `Some` only if the rewrite changed something
pub(crate) fn changed(original: &Trigger, rewritten: Trigger) -> Option<Trigger> {
    if &rewritten == original {
        None
    } else {
        Some(rewritten)
    }
}

/// Split a unit after every condition that is not a value modifier.
///
/// Each segment is a self-contained comparison: modifiers never carry state
/// across a comparison, so a segment can be evaluated on its own.
pub(crate) fn segments(unit: &[Condition]) -> Vec<Unit> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for condition in unit {
        current.push(*condition);
        if !condition.flag.is_modifier() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Join segments with `link` and give the last one the terminal flag and hits
pub(crate) fn join_chain(
    segments: Vec<Unit>,
    link: ConditionFlag,
    terminal: ConditionFlag,
    hit_target: u32,
) -> Unit {
    let count = segments.len();
    let mut unit = Vec::new();
    for (i, mut segment) in segments.into_iter().enumerate() {
        if let Some(last) = segment.last_mut() {
            if i + 1 == count {
                last.flag = terminal;
                last.hit_target = hit_target;
            } else {
                last.flag = link;
            }
        }
        unit.extend(segment);
    }
    unit
}

/// A segment compared independently of the flag on its last condition
pub(crate) fn segment_key(segment: &[Condition]) -> Unit {
    let mut key = segment.to_vec();
    if let Some(last) = key.last_mut() {
        last.flag = ConditionFlag::None;
    }
    key
}

/// Whether any condition stores or reads a remembered value
pub(crate) fn uses_recall(unit: &[Condition]) -> bool {
    use crate::trigger::Operand;
    unit.iter().any(|c| {
        c.flag == ConditionFlag::Remember || c.left == Operand::Recall || c.right == Operand::Recall
    })
}

/// Whether a single-condition unit is a constant comparison with no side effects
pub(crate) fn constant_unit(unit: &[Condition]) -> Option<bool> {
    match unit {
        [condition] if condition.hit_target == 0 => condition.constant_truth(),
        _ => None,
    }
}

/// Whether the group has any PauseIf
pub(crate) fn pauses(units: &[Unit]) -> bool {
    units
        .iter()
        .any(|u| u.iter().any(|c| c.flag == ConditionFlag::PauseIf))
}
