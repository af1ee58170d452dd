//! # Requirement compiler
//!
//! Drives a requirement script through every phase and returns the
//! serialized-ready trigger.
//!
//! ## Architecture
//!
//! ```text
//! Source → Tokens → Expression → Evaluate → build_trigger → Optimize → Trigger
//! ```
//!
//! ## Usage
//!
//! ```
//! use trigscript::compiler::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let trigger = compiler.compile("byte(0x1234) == 5 && once(byte(0x10) == 1)")?;
//! assert_eq!(trigger.serialize(), "0xH001234=5_0xH000010=1.1.");
//! # Ok::<(), trigscript::Error>(())
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::lexer::Scanner;
use crate::optimizer::{Optimizer, OptimizerOptions};
use crate::parser::ExprParser;
use crate::runtime::{Evaluator, Scope};
use crate::trigger::{build_trigger, Trigger};

/// Compilation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Run the requirements optimizer on the compiled trigger
    pub optimize: bool,
    /// Optimizer limits
    pub optimizer: OptimizerOptions,
    /// Worker threads for [`Compiler::compile_batch`] (default: num_cpus)
    pub threads: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            optimizer: OptimizerOptions::default(),
            threads: None,
        }
    }
}

impl CompileOptions {
    /// Read options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid compile options: {}", e)))
    }
}

/// Requirement script to trigger compiler
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
    evaluator: Evaluator,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            evaluator: Evaluator::new(),
        }
    }

    /// Create a compiler whose scripts can refer to named constants
    pub fn with_scope(options: CompileOptions, scope: Scope) -> Self {
        Self {
            options,
            evaluator: Evaluator::with_scope(scope),
        }
    }

    /// Options in use
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile requirement source text
    pub fn compile(&self, source: &str) -> Result<Trigger> {
        // Phase 1: Parse
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens()?;
        tracing::debug!(tokens = tokens.len(), "scanned requirement source");
        let expr = ExprParser::new(tokens).parse()?;

        self.compile_expression(&expr)
    }

    /// Compile an already parsed expression
    pub fn compile_expression(&self, expr: &Expression) -> Result<Trigger> {
        // Phase 2: Evaluate
        let evaluated = self.evaluator.evaluate(expr)?;
        tracing::debug!(expression = %evaluated, "evaluated requirement");

        // Phase 3: Build conditions
        let trigger = build_trigger(&evaluated)?;

        // Phase 4: Optimize
        if !self.options.optimize {
            return Ok(trigger);
        }
        let optimized = Optimizer::new(self.options.optimizer).optimize(&trigger)?;
        tracing::debug!(
            before = trigger.condition_count(),
            after = optimized.condition_count(),
            "optimized trigger"
        );
        Ok(optimized)
    }

    /// Compile independent scripts in parallel
    ///
    /// Each script succeeds or fails on its own; the outer error only reports
    /// a thread pool that could not be created.
    pub fn compile_batch<S>(&self, sources: &[S]) -> Result<Vec<Result<Trigger>>>
    where
        S: AsRef<str> + Sync,
    {
        if sources.len() <= 1 {
            return Ok(sources.iter().map(|s| self.compile(s.as_ref())).collect());
        }

        let threads = self
            .options
            .threads
            .unwrap_or_else(num_cpus::get)
            .clamp(1, sources.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create thread pool: {}", e)))?;

        tracing::debug!(scripts = sources.len(), threads, "compiling batch");
        Ok(pool.install(|| {
            sources
                .par_iter()
                .map(|source| self.compile(source.as_ref()))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CompileOptions::default();
        assert!(options.optimize);
        assert_eq!(options.optimizer.max_alternates, 20);
        assert_eq!(options.threads, None);
    }

    #[test]
    fn test_options_from_json() {
        let options =
            CompileOptions::from_json(r#"{"optimize": false, "optimizer": {"max_passes": 8}}"#)
                .unwrap();
        assert!(!options.optimize);
        assert_eq!(options.optimizer.max_passes, 8);
        assert_eq!(options.optimizer.max_alternates, 20);

        assert!(matches!(
            CompileOptions::from_json("{\"threads\": \"four\"}"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_compile() {
        let compiler = Compiler::default();
        let trigger = compiler.compile("byte(1) - byte(2) == -1").unwrap();
        assert_eq!(trigger.serialize(), "B:0xH000001_0xH000002=1");
    }

    #[test]
    fn test_compile_without_optimizer() {
        let compiler = Compiler::new(CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        });
        let trigger = compiler
            .compile("byte(1) == 1 && byte(1) == 1")
            .unwrap();
        assert_eq!(trigger.serialize(), "0xH000001=1_0xH000001=1");
    }

    #[test]
    fn test_scope() {
        let mut scope = Scope::new();
        scope.define("lives", Expression::Integer(3));
        let compiler = Compiler::with_scope(CompileOptions::default(), scope);
        assert_eq!(
            compiler.compile("byte(0x20) == lives").unwrap().serialize(),
            "0xH000020=3"
        );
    }

    #[test]
    fn test_batch_keeps_order_and_errors() {
        let compiler = Compiler::new(CompileOptions {
            threads: Some(2),
            ..CompileOptions::default()
        });
        let results = compiler
            .compile_batch(&["byte(1) == 1", "byte(1) ==", "word(2) != 3"])
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().serialize(), "0xH000001=1");
        assert_eq!(results[1], Err(Error::UnexpectedEof));
        assert_eq!(results[2].as_ref().unwrap().serialize(), "0x 000002!=3");
    }
}
