//! Error types for the harness
//!
//! Frame/decoding violations and grammar violations abort the owning
//! session or operation. Assertion mismatches and unmet requirements are
//! recorded per test identifier instead and surfaced at scenario end.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Channel errors ===
    #[error("Connection closed unexpectedly: {0}")]
    Connection(String),

    // === Wire protocol errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Cannot encode route: {0}")]
    Encoding(String),

    // === Console dump errors ===
    #[error("Cannot parse line {line:?} from route dump: {reason}")]
    Parse { line: String, reason: String },

    // === Assertion errors ===
    #[error("Routes don't match the given pattern: {message}\nGiven:\n{observed}\n\nPattern:\n{expected}")]
    MatchFailure {
        message: String,
        expected: String,
        observed: String,
    },

    #[error("Requirement not met: {0}")]
    RequirementUnsatisfied(String),

    // === Session errors ===
    #[error("Timed out after {0:?} waiting for {1:?}")]
    Timeout(std::time::Duration, String),

    #[error("Program didn't exit with code 0 (got {0})")]
    ExitStatus(String),

    #[error("{failed} of {total} scenarios failed")]
    ScenarioFailures { failed: usize, total: usize },

    // === Configuration errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === IO errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error carrying the offending raw line
    pub fn parse(line: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }
}
