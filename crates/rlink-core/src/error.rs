//! Error types for rlink.
//!
//! A single error enum covers transport, protocol and interpreter failures as
//! well as local table validation. `RlinkError` is `Clone` so a session can
//! hand the same latched error back on every call after a failure.

use std::sync::Arc;
use thiserror::Error;

/// Main error type for rlink.
#[derive(Debug, Clone, Error)]
pub enum RlinkError {
    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Failed to bind transfer endpoint on {addr}: {message}")]
    Bind { addr: String, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<Arc<serde_json::Error>>,
    },

    /// A result record or pulled payload could not be decoded.
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    // Interpreter outcomes
    /// The interpreter raised an error while running a command.
    #[error("R error: {0}")]
    Interpreter(String),

    /// The interpreter raised a warning while running a command.
    #[error("R warning: {0}")]
    InterpreterWarning(String),

    // Process errors
    #[error("Missing interpreter dependencies: {message}")]
    Dependency { message: String },

    #[error("Failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    #[error("Interpreter exited unsuccessfully: {status}")]
    ProcessExit { status: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Found different data types in column {column} ({name}): row {row} is {found}, expected {expected}")]
    ColumnType {
        column: usize,
        name: String,
        row: usize,
        expected: &'static str,
        found: &'static str,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for rlink operations.
pub type Result<T> = std::result::Result<T, RlinkError>;

impl From<std::io::Error> for RlinkError {
    fn from(err: std::io::Error) -> Self {
        RlinkError::Io {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for RlinkError {
    fn from(err: serde_json::Error) -> Self {
        RlinkError::Json {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl RlinkError {
    /// Create a decode error for the named payload.
    pub fn decode(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        RlinkError::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error latches on the session that produced it.
    ///
    /// Interpreter errors and anything that broke the JSON boundary latch.
    /// Warnings, transport failures and local validation do not.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            RlinkError::Interpreter(_) | RlinkError::Decode { .. } | RlinkError::Json { .. }
        )
    }

    /// Whether this is a warning raised by the interpreter.
    pub fn is_warning(&self) -> bool {
        matches!(self, RlinkError::InterpreterWarning(_))
    }

    /// Whether this is an error raised by the interpreter.
    pub fn is_interpreter_error(&self) -> bool {
        matches!(self, RlinkError::Interpreter(_))
    }
}
