//! Range narrowing
//!
//! Comparisons of one field against constants describe intervals of the
//! field's domain. Several of them ANDed in a group, ORed in an OrNext chain
//! or spread over single-condition alternates fold into the fewest
//! comparisons describing the same interval.

use super::{changed, join_chain, rebuild, segments, split, OptimizerOptions};
use crate::expr::ComparisonOp;
use crate::trigger::{Condition, ConditionFlag, Operand, Trigger, Unit};

/// Closed interval of field values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lo: u32,
    hi: u32,
}

impl Interval {
    fn of(op: ComparisonOp, value: u32, max: u32) -> Option<Interval> {
        let interval = match op {
            ComparisonOp::Eq => Interval { lo: value, hi: value },
            ComparisonOp::Lt => Interval {
                lo: 0,
                hi: value.checked_sub(1)?.min(max),
            },
            ComparisonOp::Le => Interval {
                lo: 0,
                hi: value.min(max),
            },
            ComparisonOp::Gt => Interval {
                lo: value.checked_add(1)?,
                hi: max,
            },
            ComparisonOp::Ge => Interval { lo: value, hi: max },
            ComparisonOp::Ne => return None,
        };
        (interval.lo <= interval.hi).then_some(interval)
    }

    fn intersect(self, other: Interval) -> Option<Interval> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        (lo <= hi).then_some(Interval { lo, hi })
    }

    fn union(self, other: Interval) -> Option<Interval> {
        let (first, second) = if self.lo <= other.lo {
            (self, other)
        } else {
            (other, self)
        };
        (second.lo <= first.hi.saturating_add(1)).then_some(Interval {
            lo: first.lo,
            hi: first.hi.max(second.hi),
        })
    }

    fn contains(self, value: u32) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Comparisons selecting exactly this interval
    fn conditions(self, left: Operand, max: u32) -> Vec<Condition> {
        let compare = |op, value| Condition::compare(left, op, Operand::Value(value));
        if self.lo == self.hi {
            return vec![compare(ComparisonOp::Eq, self.lo)];
        }
        let mut conditions = Vec::new();
        if self.lo > 0 {
            conditions.push(compare(ComparisonOp::Gt, self.lo - 1));
        }
        if self.hi < max {
            conditions.push(compare(ComparisonOp::Lt, self.hi + 1));
        }
        if conditions.is_empty() {
            conditions.push(Condition::always_true());
        }
        conditions
    }
}

/// Field compared against a constant, with the field's largest value
fn bounded(condition: &Condition) -> Option<(Operand, ComparisonOp, u32, u32)> {
    let op = condition.comparison()?;
    match (condition.left, condition.right) {
        (left @ Operand::Memory { .. }, Operand::Value(value)) if condition.hit_target == 0 => {
            Some((left, op, value, left.max_value()?))
        }
        _ => None,
    }
}

/// Plain unit of one comparison that can take part in narrowing
fn simple(unit: &[Condition]) -> Option<(Operand, ComparisonOp, u32, u32)> {
    match unit {
        [condition] if condition.flag == ConditionFlag::None => bounded(condition),
        _ => None,
    }
}

/// Narrow ANDed ranges in groups, ORed ranges in chains and alternates
pub fn narrow_ranges(trigger: &Trigger, _options: &OptimizerOptions) -> Option<Trigger> {
    let (core, alts) = split(trigger);
    let core = narrow_group(core);
    let alts: Vec<Vec<Unit>> = alts.into_iter().map(narrow_group).collect();
    let alts = merge_alternates(alts);
    changed(trigger, rebuild(core, alts))
}

fn narrow_group(units: Vec<Unit>) -> Vec<Unit> {
    let units: Vec<Unit> = units.into_iter().map(merge_or_chain).collect();

    let mut fields: Vec<Operand> = Vec::new();
    for unit in &units {
        if let Some((left, ..)) = simple(unit) {
            if !fields.contains(&left) {
                fields.push(left);
            }
        }
    }

    let mut units = units;
    for field in fields {
        units = narrow_field(units, field);
    }
    units
}

fn narrow_field(units: Vec<Unit>, field: Operand) -> Vec<Unit> {
    let mut range: Option<Interval> = None;
    let mut excluded: Vec<u32> = Vec::new();
    let mut count = 0;
    let mut max = 0;
    let mut empty = false;

    for unit in &units {
        let Some((left, op, value, field_max)) = simple(unit) else {
            continue;
        };
        if left != field {
            continue;
        }
        count += 1;
        max = field_max;
        if op == ComparisonOp::Ne {
            excluded.push(value);
            continue;
        }
        let full = Interval { lo: 0, hi: max };
        match Interval::of(op, value, max).and_then(|i| range.unwrap_or(full).intersect(i)) {
            Some(interval) => range = Some(interval),
            None => empty = true,
        }
    }
    if count < 2 {
        return units;
    }

    let range = range.unwrap_or(Interval { lo: 0, hi: max });
    let exclusions: Vec<u32> = excluded.into_iter().filter(|v| range.contains(*v)).collect();
    let replacement: Vec<Condition> = if empty || (range.lo == range.hi && !exclusions.is_empty()) {
        vec![Condition::always_false()]
    } else {
        let full = Interval { lo: 0, hi: max };
        let mut conditions = if range == full && !exclusions.is_empty() {
            Vec::new()
        } else {
            range.conditions(field, max)
        };
        let mut seen = Vec::new();
        for value in exclusions {
            if !seen.contains(&value) {
                seen.push(value);
                conditions.push(Condition::compare(field, ComparisonOp::Ne, Operand::Value(value)));
            }
        }
        conditions
    };
    if replacement.len() >= count {
        return units;
    }

    tracing::trace!(before = count, after = replacement.len(), "narrowed field range");
    let mut result = Vec::with_capacity(units.len());
    let mut replacement = Some(replacement);
    for unit in units {
        match simple(&unit) {
            Some((left, ..)) if left == field => {
                if let Some(conditions) = replacement.take() {
                    result.extend(conditions.into_iter().map(|c| vec![c]));
                }
            }
            _ => result.push(unit),
        }
    }
    result
}

/// Union overlapping comparisons of one field inside a pure OrNext chain
fn merge_or_chain(unit: Unit) -> Unit {
    let parts = segments(&unit);
    let Some((last, links)) = parts.split_last() else {
        return unit;
    };
    let Some(terminal) = last.last().copied() else {
        return unit;
    };
    let uniform = links
        .iter()
        .all(|s| s.last().is_some_and(|c| c.flag == ConditionFlag::OrNext && c.hit_target == 0));
    if links.is_empty() || !uniform {
        return unit;
    }

    let comparison = |segment: &Unit| match segment.as_slice() {
        [condition] => bounded(&condition.with_hits(0)),
        _ => None,
    };

    let mut merged: Vec<(Option<(Operand, Interval, u32)>, Unit, bool)> = Vec::new();
    for segment in &parts {
        let entry = comparison(segment).and_then(|(left, op, value, max)| {
            Interval::of(op, value, max).map(|interval| (left, interval, max))
        });
        let Some((left, interval, max)) = entry else {
            merged.push((None, segment.clone(), false));
            continue;
        };
        let slot = merged.iter_mut().find_map(|(existing, _, folded)| match existing {
            Some((l, i, _)) if *l == left => i.union(interval).map(|u| (i, u, folded)),
            _ => None,
        });
        match slot {
            Some((range, union, folded)) => {
                *range = union;
                *folded = true;
            }
            None => merged.push((Some((left, interval, max)), segment.clone(), false)),
        }
    }
    if !merged.iter().any(|(_, _, folded)| *folded) {
        return unit;
    }

    let mut rebuilt = Vec::with_capacity(merged.len());
    for (range, segment, folded) in merged {
        match range {
            Some((left, interval, max)) if folded => {
                let conditions = interval.conditions(left, max);
                if conditions.len() != 1 {
                    return unit;
                }
                rebuilt.push(conditions);
            }
            _ => rebuilt.push(segment),
        }
    }
    join_chain(rebuilt, ConditionFlag::OrNext, terminal.flag, terminal.hit_target)
}

/// Union single-comparison alternates over the same field
fn merge_alternates(mut alts: Vec<Vec<Unit>>) -> Vec<Vec<Unit>> {
    let single = |alt: &Vec<Unit>| match alt.as_slice() {
        [unit] => simple(unit).and_then(|(left, op, value, max)| {
            Interval::of(op, value, max).map(|interval| (left, interval, max))
        }),
        _ => None,
    };

    let mut i = 0;
    while i < alts.len() {
        let mut j = i + 1;
        while j < alts.len() {
            let merged = match (single(&alts[i]), single(&alts[j])) {
                (Some((left, a, max)), Some((other, b, _))) if left == other => a
                    .union(b)
                    .map(|u| u.conditions(left, max))
                    .filter(|c| c.len() == 1),
                _ => None,
            };
            match merged {
                Some(conditions) => {
                    alts[i] = conditions.into_iter().map(|c| vec![c]).collect();
                    alts.remove(j);
                }
                None => j += 1,
            }
        }
        i += 1;
    }
    alts
}
