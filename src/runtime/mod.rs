//! Evaluation of parsed requirement expressions
//!
//! Resolves constants, dispatches built-in calls and folds arithmetic and
//! comparisons into the algebra in [`crate::expr`].

pub mod builtins;
mod evaluator;
mod scope;

pub use builtins::{lookup, Builtin};
pub use evaluator::Evaluator;
pub use scope::Scope;
