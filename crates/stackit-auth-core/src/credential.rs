//! Provider credential record shared with the STACKIT CLI
//!
//! Field names of the on-disk and keyring schemas live in [`keys`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names shared by the keyring entries and the JSON file keys.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_EMAIL: &str = "user_email";
    pub const SESSION_EXPIRES_AT_UNIX: &str = "session_expires_at_unix";
    pub const AUTH_FLOW_TYPE: &str = "auth_flow_type";
}

/// Lead time before the real expiry at which a token is treated as expired.
pub const DEFAULT_SAFETY_MARGIN_SECONDS: i64 = 5 * 60;

/// Backend that satisfied a read (or accepted a write)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    Keyring,
    File,
}

impl StorageLocation {
    /// The backend tried after this one.
    pub fn other(self) -> Self {
        match self {
            StorageLocation::Keyring => StorageLocation::File,
            StorageLocation::File => StorageLocation::Keyring,
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Keyring => write!(f, "keyring"),
            StorageLocation::File => write!(f, "file"),
        }
    }
}

/// Validity of a credential at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Valid,
    Expired,
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialState::Valid => write!(f, "valid"),
            CredentialState::Expired => write!(f, "expired"),
        }
    }
}

/// OAuth session created by `stackit auth provider login`.
///
/// A record read from storage always has non-empty `access_token`,
/// `refresh_token` and `email`; backends reject anything less.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Token exchanged for a new access token
    pub refresh_token: String,
    /// Authenticated principal
    pub email: String,
    /// Access token expiry; `None` means never refreshed proactively
    pub expires_at: Option<DateTime<Utc>>,
    /// Provenance tag written by the login flow, passed through unchanged
    pub auth_flow_type: Option<String>,
    /// Profile the record was resolved under
    pub source_profile: String,
    /// Backend the record was last read from or written to
    pub storage_location: Option<StorageLocation>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            email: email.into(),
            expires_at: None,
            auth_flow_type: None,
            source_profile: String::new(),
            storage_location: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_auth_flow_type(mut self, auth_flow_type: impl Into<String>) -> Self {
        self.auth_flow_type = Some(auth_flow_type.into());
        self
    }

    /// Name of the first required field that is empty, if any.
    pub fn missing_required_field(&self) -> Option<&'static str> {
        if self.access_token.is_empty() {
            Some(keys::ACCESS_TOKEN)
        } else if self.refresh_token.is_empty() {
            Some(keys::REFRESH_TOKEN)
        } else if self.email.is_empty() {
            Some(keys::USER_EMAIL)
        } else {
            None
        }
    }

    /// Check whether the access token is expired or inside the safety margin at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        // A margin reaching past the representable range covers any expiry.
        match now.checked_add_signed(margin) {
            Some(deadline) => deadline > expires_at,
            None => margin > Duration::zero(),
        }
    }

    /// Check whether the access token needs a refresh right now
    pub fn is_expired(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now(), margin)
    }

    pub fn state_at(&self, now: DateTime<Utc>, margin: Duration) -> CredentialState {
        if self.is_expired_at(now, margin) {
            CredentialState::Expired
        } else {
            CredentialState::Valid
        }
    }

    /// Display-safe version of the access token
    pub fn masked_access_token(&self) -> String {
        let value = &self.access_token;
        if value.len() <= 8 || !value.is_ascii() {
            return "*".repeat(value.chars().count());
        }
        format!("{}...{}", &value[..4], &value[value.len() - 4..])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .field("auth_flow_type", &self.auth_flow_type)
            .field("source_profile", &self.source_profile)
            .field("storage_location", &self.storage_location)
            .finish()
    }
}

/// Parse a `session_expires_at_unix` value (decimal seconds).
pub(crate) fn parse_unix_expiry(value: &str) -> Option<DateTime<Utc>> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
}

pub(crate) fn format_unix_expiry(expires_at: DateTime<Utc>) -> String {
    expires_at.timestamp().to_string()
}
