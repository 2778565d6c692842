//! Backend call failures and recurrence payload rejections.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Why a backend call failed.
///
/// Travels with every [`ProviderError`] and ends up, by name, in the
/// per-source failure list the engine returns next to partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials rejected or expired.
    AuthenticationFailed,
    /// Signed in, but not allowed to read this calendar.
    AuthorizationFailed,
    /// Connection refused, reset, DNS failure.
    NetworkError,
    /// Throttled by the remote service.
    RateLimited,
    /// The remote service answered with a 5xx.
    ServerError,
    /// The payload could not be read.
    InvalidResponse,
    /// The calendar or list no longer exists.
    NotFound,
    /// No backend for the source's family, or a bad setting.
    ConfigurationError,
    /// The per-source ceiling elapsed first.
    Timeout,
    InternalError,
}

impl ProviderErrorCode {
    /// Transient failures: the next refresh may succeed.
    pub fn is_retryable(&self) -> bool {
        use ProviderErrorCode::*;
        matches!(self, NetworkError | RateLimited | ServerError | Timeout)
    }

    /// Snake-case name used in logs and serialized failure records.
    pub fn as_str(&self) -> &'static str {
        use ProviderErrorCode::*;
        match self {
            AuthenticationFailed => "authentication_failed",
            AuthorizationFailed => "authorization_failed",
            NetworkError => "network_error",
            RateLimited => "rate_limited",
            ServerError => "server_error",
            InvalidResponse => "invalid_response",
            NotFound => "not_found",
            ConfigurationError => "configuration_error",
            Timeout => "timeout",
            InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed backend call: a code, a message, optionally the backend name
/// and the lower-level cause.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    backend: Option<String>,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            backend: None,
            cause: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    /// Tags the error with the backend that raised it.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Attaches the lower-level cause.
    pub fn with_source<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Clones everything except the cause, which is not `Clone`.
    pub fn detached(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            backend: self.backend.clone(),
            cause: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Some(backend) => write!(f, "[{backend}] {}: {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A recurrence payload that could not be turned into a canonical pattern.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("malformed recurrence XML: {0}")]
    MalformedXml(String),

    #[error("malformed recurrence JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("unrecognized recurrence pattern: {0}")]
    UnknownPattern(String),

    #[error("invalid value {value:?} for {field}")]
    InvalidField { field: &'static str, value: String },

    #[error(transparent)]
    InvalidPattern(#[from] calmux_core::PatternError),
}

impl NormalizationError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }
}
