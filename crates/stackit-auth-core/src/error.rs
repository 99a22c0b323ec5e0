//! Error types for credential resolution

use thiserror::Error;

/// Command that creates the credentials this crate consumes.
pub const LOGIN_COMMAND: &str = "stackit auth provider login";

/// Credential resolution error types
///
/// Cloneable so a single refresh outcome can be handed to every caller
/// waiting on the same in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("failed to determine active profile: {0}")]
    ProfileResolution(String),

    #[error(
        "failed to read CLI credentials for profile '{profile}' from keyring ({keyring}) or file ({file}). Please run 'stackit auth provider login' first"
    )]
    CredentialsNotFound {
        profile: String,
        keyring: String,
        file: String,
    },

    #[error(
        "CLI credentials for profile '{profile}' are malformed: keyring ({keyring}), file ({file}). Please run 'stackit auth provider login' again"
    )]
    MalformedCredential {
        profile: String,
        keyring: String,
        file: String,
    },

    #[error("token refresh failed with status {status}: {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("token refresh request failed: {0}")]
    RefreshTransport(String),

    #[error(
        "failed to persist refreshed credentials for profile '{profile}' to keyring ({keyring}) or file ({file})"
    )]
    Persist {
        profile: String,
        keyring: String,
        file: String,
    },
}

impl AuthError {
    /// Whether the refresh-token grant failed.
    pub fn is_refresh_error(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshRejected { .. } | AuthError::RefreshTransport(_)
        )
    }

    /// Whether the user has to run the login flow again to recover.
    pub fn requires_login(&self) -> bool {
        self.is_refresh_error()
            || matches!(
                self,
                AuthError::CredentialsNotFound { .. } | AuthError::MalformedCredential { .. }
            )
    }
}

/// Failure of a single storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Nothing stored for the profile (or only part of it)
    #[error("{0}")]
    NotFound(String),

    /// Stored bytes exist but do not form a credential
    #[error("{0}")]
    Malformed(String),

    /// The backend itself could not be used
    #[error("{0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, BackendError::Malformed(_))
    }
}

/// Errors reported by a [`SecretBackend`](crate::store::SecretBackend)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("no keyring entry")]
    NoEntry,

    #[error("keyring error: {0}")]
    Platform(String),
}
