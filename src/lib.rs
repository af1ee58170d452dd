//! # Trigscript - Memory Comparison Scripts to Achievement Triggers
//!
//! Compiles small requirement scripts such as
//! `byte(0x1234) + 1 == prev(byte(0x1234))` into the flag-tagged condition
//! list ("trigger") that a memory-polling engine evaluates once per frame.
//!
//! ## Quick Start
//!
//! ```rust
//! use trigscript::{CompileOptions, Compiler};
//!
//! # fn main() -> trigscript::Result<()> {
//! let compiler = Compiler::new(CompileOptions::default());
//!
//! // Unsigned subtraction is rearranged so it cannot underflow
//! let trigger = compiler.compile("byte(1) - byte(2) == -1")?;
//! assert_eq!(trigger.serialize(), "B:0xH000001_0xH000002=1");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Source → Scanner → Tokens → ExprParser → Expression
//!        → Evaluator (combine, normalize_comparison) → build_trigger
//!        → Optimizer (fixed point) → Trigger::serialize
//! ```
//!
//! ### Main Components
//!
//! - [`expr`] - expression algebra: accessors, modifiers, memory values and
//!   the comparison normalizer
//! - [`trigger`] - condition model, text format, trigger builder and a
//!   reference engine that evaluates triggers frame by frame
//! - [`optimizer`] - multi-pass rewrites that shrink a trigger without
//!   changing when it fires
//! - [`lexer`], [`parser`], [`runtime`] - requirement reader and evaluator
//! - [`compiler`] - the pipeline, its options and batch compilation
//!
//! ## Text Format
//!
//! Conditions are joined with `_`, alternate groups are introduced with
//! `S`. A condition is `[flag:]operand[op operand][.hits.]`, for example
//! `R:0xH000010=1` or `0xX001234>=100.5.`.
//!
//! ## Logging
//!
//! Compilation phases and optimizer passes are reported through `tracing`.
//! The crate never installs a subscriber.

/// Version of the trigscript compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod runtime;
pub mod trigger;

// Re-export main types
pub use compiler::{CompileOptions, Compiler};
pub use error::{Error, ErrorClass, Result};
pub use expr::{combine, combine_inverse, normalize_comparison, Comparison, Expression};
pub use lexer::{Scanner, Token, TokenKind};
pub use optimizer::{optimize, Optimizer, OptimizerOptions};
pub use parser::{parse_expression, ExprParser};
pub use runtime::{Evaluator, Scope};
pub use trigger::{build_trigger, Condition, ConditionFlag, Engine, Memory, Trigger};
