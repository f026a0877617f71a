//! Error types for condition expressions

use thiserror::Error;

/// Condition expression errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CelError {
    /// The source failed to lex, parse, or type-check.
    /// Fatal at policy-add time.
    #[error("compile error: {0}")]
    Compile(String),

    /// Evaluation failed at request time.
    /// The affected rule is treated as non-matching.
    #[error("evaluation error: {0}")]
    Eval(String),

    /// The expression evaluated to a non-boolean value
    #[error("expression did not return a boolean result")]
    NonBooleanResult,
}

/// Result type for condition operations
pub type Result<T> = std::result::Result<T, CelError>;
