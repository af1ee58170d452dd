//! Error types for the trigscript compiler

use thiserror::Error;

/// Trigscript compilation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parse errors
    /// Syntax error encountered while reading a requirement expression
    ///
    /// **Triggered by:** Invalid requirement syntax (unmatched parentheses, stray operators)
    /// **Example:** `byte(0x1234 == 3`
    #[error("Syntax error at line {line}, column {col}: {message}")]
    SyntaxError {
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Error description
        message: String,
    },

    /// General parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unexpected end of input during parsing
    #[error("Unexpected end of file")]
    UnexpectedEof,

    /// Unexpected token encountered during parsing
    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken {
        /// Expected token description
        expected: String,
        /// Actual token received
        got: String,
    },

    // Evaluation errors
    /// Reference to a name that is not in the scope
    #[error("Undefined identifier: {name}")]
    UndefinedIdentifier {
        /// Identifier name
        name: String,
    },

    /// Call to a function that is not a built-in
    #[error("Undefined function: {name}")]
    UndefinedFunction {
        /// Function name
        name: String,
    },

    /// Invalid arguments passed to a built-in function
    ///
    /// **Triggered by:** Wrong argument count or argument kind
    /// **Example:** `repeated(byte(1) == 2)` (missing count)
    #[error("Invalid arguments for {function}: {reason}")]
    InvalidArguments {
        /// Function name
        function: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Type mismatch error
    #[error("Type error: expected {expected}, got {got}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type
        got: String,
    },

    /// Division or modulus by a constant zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Algebraically meaningless operation
    ///
    /// **Triggered by:** modulus by a runtime value, bitwise math on floats,
    /// multiplying values read through different pointers
    /// **Example:** `byte(1) % byte(2)`
    #[error("{message}: {expression}")]
    IllegalOperation {
        /// What went wrong
        message: String,
        /// Rendered text of the offending expression
        expression: String,
    },

    /// Expression cannot be expressed as a condition
    #[error("{expression}: expression is not a requirement expression")]
    NotRequirement {
        /// Rendered text of the offending expression
        expression: String,
    },

    /// Flag or chain shape the engine cannot express
    ///
    /// **Triggered by:** `never` applied to a hit-counted clause already flagged
    /// with ResetIf, conflicting flags, pointer sharing violations
    #[error("{message}: {expression}")]
    Structural {
        /// What went wrong
        message: String,
        /// Rendered text of the offending expression
        expression: String,
    },

    /// Serialized trigger text could not be read back
    #[error("Invalid trigger at offset {offset}: {message}")]
    InvalidTrigger {
        /// Byte offset into the serialized text
        offset: usize,
        /// Error description
        message: String,
    },

    /// The optimizer did not reach a fixed point
    #[error("Optimizer did not converge after {passes} passes")]
    OptimizerDiverged {
        /// Number of passes executed
        passes: usize,
    },

    /// Invalid compile options
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Broad error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Input text could not be read
    Syntax,
    /// Algebraically meaningless combination
    IllegalOperation,
    /// Shape the engine cannot express
    Structural,
    /// Failure inside the compiler itself
    Internal,
}

impl Error {
    /// Create an illegal operation error for an expression
    pub fn illegal(message: impl Into<String>, expression: impl ToString) -> Self {
        Error::IllegalOperation {
            message: message.into(),
            expression: expression.to_string(),
        }
    }

    /// Create a structural error for an expression
    pub fn structural(message: impl Into<String>, expression: impl ToString) -> Self {
        Error::Structural {
            message: message.into(),
            expression: expression.to_string(),
        }
    }

    /// Create a "not a requirement" error for an expression
    pub fn not_requirement(expression: impl ToString) -> Self {
        Error::NotRequirement {
            expression: expression.to_string(),
        }
    }

    /// Create an invalid argument error
    pub fn arguments(function: &str, reason: impl Into<String>) -> Self {
        Error::InvalidArguments {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::SyntaxError { .. }
            | Error::ParseError(_)
            | Error::UnexpectedEof
            | Error::UnexpectedToken { .. }
            | Error::InvalidTrigger { .. } => ErrorClass::Syntax,

            Error::IllegalOperation { .. }
            | Error::DivisionByZero
            | Error::TypeError { .. }
            | Error::UndefinedIdentifier { .. }
            | Error::UndefinedFunction { .. }
            | Error::InvalidArguments { .. } => ErrorClass::IllegalOperation,

            Error::NotRequirement { .. } | Error::Structural { .. } => ErrorClass::Structural,

            Error::OptimizerDiverged { .. } | Error::ConfigError(_) => ErrorClass::Internal,
        }
    }
}

/// Result type for trigscript operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_operation_carries_expression() {
        let err = Error::illegal("Cannot modulus using a runtime value", "byte(0x000001) % byte(0x000002)");
        assert_eq!(err.class(), ErrorClass::IllegalOperation);
        assert_eq!(
            err.to_string(),
            "Cannot modulus using a runtime value: byte(0x000001) % byte(0x000002)"
        );
    }

    #[test]
    fn test_not_requirement_message() {
        let err = Error::not_requirement("byte(0x001234)");
        assert!(err.to_string().contains("expression is not a requirement expression"));
        assert_eq!(err.class(), ErrorClass::Structural);
    }
}
