//! Sync error types with transient/permanent classification.

use kc_cache::RateLimitExceeded;
use kc_core::email::EmailError;
use kc_core::SyncSystem;
use thiserror::Error;

/// Error that can occur while talking to an external membership system.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Caller-supplied input was malformed (bad email, empty required field).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The fixed-window call budget for this client is spent.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// Network-level failure reaching the upstream system.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upstream call timed out.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The upstream returned a non-success HTTP status.
    #[error("received {status} response")]
    Status { status: u16 },

    /// The upstream returned a well-formed error payload.
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// The upstream response could not be parsed against its schema.
    #[error("error parsing {system} response: {message}")]
    Parse { system: SyncSystem, message: String },

    /// The operation is not available on this system.
    #[error("{operation} is not supported by {system}")]
    Unsupported {
        system: SyncSystem,
        operation: &'static str,
    },

    /// No profile exists for the requested username.
    #[error("no profile found for {username}")]
    ProfileNotFound { username: String },

    /// Failure reading or writing local sync state.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl SyncError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network { .. }
                | SyncError::Timeout { .. }
                | SyncError::Status { status: 500..=599 }
        )
    }

    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SyncError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an upstream-payload error.
    pub fn upstream(message: impl Into<String>) -> Self {
        SyncError::Upstream {
            message: message.into(),
        }
    }

    /// Create a parse error for the given system.
    pub fn parse(system: SyncSystem, message: impl Into<String>) -> Self {
        SyncError::Parse {
            system,
            message: message.into(),
        }
    }

    /// Create a database error with source.
    pub fn database(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        SyncError::Database {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Map a [`reqwest::Error`] onto the taxonomy.
    pub fn from_http(error: reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            SyncError::Timeout { timeout_secs }
        } else if let Some(status) = error.status() {
            SyncError::Status {
                status: status.as_u16(),
            }
        } else {
            SyncError::Network {
                message: error.to_string(),
                source: Some(Box::new(error)),
            }
        }
    }
}

impl From<EmailError> for SyncError {
    fn from(error: EmailError) -> Self {
        SyncError::InvalidInput {
            message: error.to_string(),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
