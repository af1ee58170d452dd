//! Requirement wrappers produced by `once`, `repeated`, `tally`, `never`,
//! `unless`, `trigger_when` and `measured`

use super::Expression;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clause that must hold for a number of frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Required hit count
    pub target: u32,
    /// Clauses whose hits are added together
    pub clauses: Vec<Expression>,
    /// Clauses whose hits are subtracted
    pub deducted: Vec<Expression>,
}

impl Tally {
    /// `repeated(target, clause)`
    pub fn repeated(target: u32, clause: Expression) -> Self {
        Tally {
            target,
            clauses: vec![clause],
            deducted: Vec::new(),
        }
    }

    /// Whether the tally wraps a single clause
    pub fn is_single(&self) -> bool {
        self.clauses.len() == 1 && self.deducted.is_empty()
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            return match self.target {
                1 => write!(f, "once({})", self.clauses[0]),
                n => write!(f, "repeated({}, {})", n, self.clauses[0]),
            };
        }

        write!(f, "tally({}", self.target)?;
        for clause in &self.clauses {
            write!(f, ", {}", clause)?;
        }
        for clause in &self.deducted {
            write!(f, ", deduct({})", clause)?;
        }
        write!(f, ")")
    }
}

/// Flag wrapper kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseFlag {
    /// `never(x)`: reset hit counts when x is true
    ResetIf,
    /// `unless(x)`: pause the group while x is true
    PauseIf,
    /// `trigger_when(x)`: mark the conditions that fire the trigger
    Trigger,
}

impl ClauseFlag {
    /// Script function name
    pub fn function_name(self) -> &'static str {
        match self {
            ClauseFlag::ResetIf => "never",
            ClauseFlag::PauseIf => "unless",
            ClauseFlag::Trigger => "trigger_when",
        }
    }

    /// Name used in error messages
    pub fn flag_name(self) -> &'static str {
        match self {
            ClauseFlag::ResetIf => "ResetIf",
            ClauseFlag::PauseIf => "PauseIf",
            ClauseFlag::Trigger => "Trigger",
        }
    }
}

/// Clause wrapped in a flag function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedClause {
    /// Flag applied to the clause
    pub flag: ClauseFlag,
    /// Wrapped clause
    pub clause: Box<Expression>,
}

impl fmt::Display for FlaggedClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.flag.function_name(), self.clause)
    }
}

/// How a measured value is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeasuredFormat {
    /// Raw value
    #[default]
    Raw,
    /// Percentage of the target
    Percent,
}

/// `measured(clause, when=..., format=...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredClause {
    /// Measured comparison or tally
    pub clause: Box<Expression>,
    /// Condition gating the measurement
    pub when: Option<Box<Expression>>,
    /// Reporting format
    pub format: MeasuredFormat,
}

impl fmt::Display for MeasuredClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "measured({}", self.clause)?;
        if let Some(when) = &self.when {
            write!(f, ", when={}", when)?;
        }
        if self.format == MeasuredFormat::Percent {
            write!(f, ", format=\"percent\"")?;
        }
        write!(f, ")")
    }
}
