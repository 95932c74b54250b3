//! Error types for Pochard

use thiserror::Error;

/// The main error type for Pochard operations
#[derive(Error, Debug)]
pub enum Error {
    // Binding errors
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    // Compile-time errors
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Compile failure: {message}\n--- generated program ---\n{program}")]
    CompileFailure { message: String, program: String },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using Pochard's Error
pub type Result<T> = std::result::Result<T, Error>;
