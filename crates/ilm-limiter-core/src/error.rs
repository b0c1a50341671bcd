use thiserror::Error;

use crate::phase::Phase;

/// Canonical error type for limiter operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The cluster could not be reached, or the request timed out.
    #[error("connection error: {message}")]
    Connection {
        /// Transport-level failure description.
        message: String,
    },

    /// The cluster rejected the supplied credentials.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Response details returned by the cluster.
        message: String,
    },

    /// The principal may not access the requested resource.
    #[error("access to `{endpoint}` is forbidden: {body}")]
    Forbidden {
        /// Endpoint path that was called.
        endpoint: String,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The cluster answered with an unexpected status code.
    #[error("request to `{endpoint}` failed with status {status}: {body}")]
    Http {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// A cluster response did not have the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The acting principal lacks cluster-wide privileges.
    #[error("user is missing cluster privileges {privileges:?}")]
    MissingClusterPrivilege {
        /// Privileges that were requested.
        privileges: Vec<String>,
    },

    /// The acting principal lacks privileges on the governed indices.
    #[error("user is missing index privileges {privileges:?} on {indices:?}")]
    MissingIndexPrivilege {
        /// Privileges that were requested.
        privileges: Vec<String>,
        /// Indices the privileges were requested on.
        indices: Vec<String>,
    },

    /// A limited phase has no later phase defined in its policy.
    #[error("cannot determine successor of phase '{phase}'")]
    UnreachableSuccessor {
        /// The limited phase.
        phase: Phase,
    },

    /// Operation violates the expected lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },
}

impl CoreError {
    /// Creates a `Connection` variant.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an `Authentication` variant.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true for errors that abort the entire run rather than the
    /// current policy, phase or index.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Authentication { .. } | Self::MissingClusterPrivilege { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

/// Convenient result alias for limiter operations.
pub type CoreResult<T> = Result<T, CoreError>;
