//! Trigger representation
//!
//! A [`Trigger`] is a core [`RequirementGroup`] plus any number of alternate
//! groups. Each group is a flat list of [`Condition`]s in the serialized
//! text format understood by the runtime:
//!
//! ```text
//! 0xH001234=1_R:0xH001235=0S0xH002000=5S0xH002001=5
//! ```

pub mod builder;
pub mod condition;
pub mod engine;
pub mod serialize;

pub use builder::{build_trigger, TriggerBuilder};
pub use condition::{
    is_pure, unit_flag, Condition, ConditionFlag, Operand, Operator, RequirementGroup, Trigger,
    Unit,
};
pub use engine::{Engine, Memory};
