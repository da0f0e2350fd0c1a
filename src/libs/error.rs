//! Error taxonomy for the persistence layer.
//!
//! [`StoreError`] is what the stores and the connection layer produce. The
//! facade absorbs connectivity-class variants by falling back to the local
//! store; everything else reaches callers, who usually convert it into a
//! [`Failure`] (a `{reason, message}` pair) before handing it to the view layer.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// PostgreSQL unique-violation code, as reported by the remote REST surface.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The local host has no usable network route.
    #[error("No network connection")]
    Offline,

    /// DNS, connection refused, TLS, proxy or firewall failure.
    #[error("Remote service unreachable: {0}")]
    Unreachable(String),

    #[error("Remote service did not answer within {0:?}")]
    Timeout(Duration),

    /// The remote gateway answered but the service behind it did not (502/503/504).
    #[error("Remote service unavailable (HTTP {0})")]
    ServiceUnavailable(u16),

    /// The remote service rejected the request.
    #[error("{message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Local storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Malformed data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for failures attributable to transport or remote availability.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::Offline | StoreError::Unreachable(_) | StoreError::Timeout(_) | StoreError::ServiceUnavailable(_)
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Service { status, code, .. } => *status == 409 || code.as_deref() == Some(UNIQUE_VIOLATION),
            _ => false,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound { entity, id: id.to_string() }
    }

    pub fn service(status: u16, message: impl Into<String>) -> Self {
        StoreError::Service {
            status,
            code: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured deadline on the error
            StoreError::Timeout(Duration::ZERO)
        } else if err.is_connect() || err.is_request() || err.is_redirect() {
            StoreError::Unreachable(err.to_string())
        } else if err.is_decode() || err.is_body() {
            StoreError::Service {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                code: None,
                message: format!("Unexpected response from remote service: {}", err),
            }
        } else {
            StoreError::Unreachable(err.to_string())
        }
    }
}

/// Why an operation failed, as exposed to the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    Network,
    InvalidCredentials,
    ServiceUnavailable,
    ProfileMissing,
    ServiceError,
    NotFound,
    InvalidInput,
    Storage,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::Network => "network",
            FailureReason::InvalidCredentials => "invalid-credentials",
            FailureReason::ServiceUnavailable => "service-unavailable",
            FailureReason::ProfileMissing => "profile-missing",
            FailureReason::ServiceError => "service-error",
            FailureReason::NotFound => "not-found",
            FailureReason::InvalidInput => "invalid-input",
            FailureReason::Storage => "storage",
        };
        f.write_str(label)
    }
}

/// Structured failure value: a machine-readable reason plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{reason}: {message}")]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
}

impl Failure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        let reason = match &err {
            StoreError::Offline | StoreError::Unreachable(_) | StoreError::Timeout(_) => FailureReason::Network,
            StoreError::ServiceUnavailable(_) => FailureReason::ServiceUnavailable,
            StoreError::Service { .. } => FailureReason::ServiceError,
            StoreError::NotFound { .. } => FailureReason::NotFound,
            StoreError::Validation(_) => FailureReason::InvalidInput,
            StoreError::Storage(_) | StoreError::Serialization(_) => FailureReason::Storage,
        };
        Failure::new(reason, err.to_string())
    }
}
