//! Engine error types.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use calmux_providers::{ProviderError, ProviderErrorCode};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by engine calls.
///
/// Per-source failures never surface here; they are collected as
/// [`SourceFailure`] records next to the results.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed arguments to a public call.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The aggregate call did not settle within its ceiling.
    #[error("Aggregation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl EngineError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Returns true for caller mistakes.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// One source that failed during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    /// Global id of the failing source (or backend name for
    /// backend-wide calls such as search and discovery).
    pub source_id: String,
    /// Failure category.
    #[serde(serialize_with = "serialize_code")]
    pub code: ProviderErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl SourceFailure {
    /// Records `error` against `source_id`.
    pub fn new(source_id: impl Into<String>, error: &ProviderError) -> Self {
        Self {
            source_id: source_id.into(),
            code: error.code(),
            message: error.message().to_string(),
        }
    }
}

fn serialize_code<S: serde::Serializer>(
    code: &ProviderErrorCode,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(code.as_str())
}
