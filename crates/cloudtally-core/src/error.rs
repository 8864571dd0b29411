//! Reconciliation error types

use thiserror::Error;

/// Provider error codes that signal throttling rather than a real failure
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "PriorRequestNotComplete",
    "SlowDown",
    "RequestTimeout",
    "ServiceUnavailable",
];

/// Errors raised by a provider client while listing or enriching resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, dropped connections and similar transport failures
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider answered with an error code
    #[error("{service} returned {code}: {message}")]
    Api {
        service: String,
        code: String,
        message: String,
    },

    /// The provider answered, but without a field we rely on
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn api(
        service: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            service: service.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// The provider error code, if the provider supplied one
    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// Whether restarting the pass has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transient(_) => true,
            ProviderError::Api { code, .. } => THROTTLING_CODES.contains(&code.as_str()),
            ProviderError::Malformed(_) => false,
        }
    }
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record already exists: {0}")]
    RecordAlreadyExists(String),

    #[error("Record {identity} has no `{property}` property")]
    MissingProperty { identity: String, property: String },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Transient errors restart the pass; everything else aborts it
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Provider(err) => err.is_transient(),
            ReconcileError::LockError(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
