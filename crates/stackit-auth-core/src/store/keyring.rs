//! Keyring backend: one secure-storage entry per credential field.

use super::CredentialBackend;
use crate::credential::{Credential, StorageLocation, format_unix_expiry, keys, parse_unix_expiry};
use crate::error::{BackendError, KeyringError};
use crate::profile::DEFAULT_PROFILE;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Keyring service name used by the STACKIT CLI for provider auth.
pub const KEYRING_SERVICE_PREFIX: &str = "stackit-cli-provider";

/// Capability over the OS secure storage.
pub trait SecretBackend: Send + Sync {
    fn get(&self, service: &str, key: &str) -> Result<String, KeyringError>;

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError>;

    /// Remove an entry; removing a missing entry is not an error.
    fn delete(&self, service: &str, key: &str) -> Result<(), KeyringError>;
}

/// Keyring service for a profile: bare prefix for the default profile,
/// `<prefix>/<profile>` otherwise.
pub fn keyring_service_name(profile: &str) -> String {
    if profile == DEFAULT_PROFILE {
        KEYRING_SERVICE_PREFIX.to_string()
    } else {
        format!("{}/{}", KEYRING_SERVICE_PREFIX, profile)
    }
}

/// Stores each credential field as a separate keyring entry
pub struct KeyringBackend {
    secrets: Arc<dyn SecretBackend>,
}

impl KeyringBackend {
    pub fn new(secrets: Arc<dyn SecretBackend>) -> Self {
        Self { secrets }
    }

    fn required(&self, service: &str, key: &str) -> Result<String, BackendError> {
        match self.secrets.get(service, key) {
            Ok(value) if value.is_empty() => {
                Err(BackendError::Malformed(format!("{} is empty", key)))
            }
            Ok(value) => Ok(value),
            Err(KeyringError::NoEntry) => Err(BackendError::NotFound(format!(
                "get {}: {}",
                key,
                KeyringError::NoEntry
            ))),
            Err(e) => Err(BackendError::Unavailable(format!("get {}: {}", key, e))),
        }
    }

    fn optional(&self, service: &str, key: &str) -> Option<String> {
        match self.secrets.get(service, key) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) | Err(KeyringError::NoEntry) => None,
            Err(e) => {
                debug!(service, key, error = %e, "Optional keyring entry unavailable");
                None
            }
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), BackendError> {
        self.secrets
            .set(service, key, value)
            .map_err(|e| BackendError::Unavailable(format!("set {}: {}", key, e)))
    }
}

impl CredentialBackend for KeyringBackend {
    fn location(&self) -> StorageLocation {
        StorageLocation::Keyring
    }

    fn read(&self, profile: &str) -> Result<Credential, BackendError> {
        let service = keyring_service_name(profile);

        let access_token = self.required(&service, keys::ACCESS_TOKEN)?;
        let refresh_token = self.required(&service, keys::REFRESH_TOKEN)?;
        let email = self.required(&service, keys::USER_EMAIL)?;

        let mut credential = Credential::new(access_token, refresh_token, email);

        if let Some(raw) = self.optional(&service, keys::SESSION_EXPIRES_AT_UNIX) {
            credential.expires_at = parse_unix_expiry(&raw);
            if credential.expires_at.is_none() {
                warn!(service = %service, value = %raw, "Ignoring unparsable session expiry");
            }
        }
        credential.auth_flow_type = self.optional(&service, keys::AUTH_FLOW_TYPE);

        Ok(credential)
    }

    fn write(&self, profile: &str, credential: &Credential) -> Result<(), BackendError> {
        if let Some(key) = credential.missing_required_field() {
            return Err(BackendError::Malformed(format!("{} is empty", key)));
        }
        let service = keyring_service_name(profile);

        // The access token goes last: a record missing it reads as not found,
        // so a failed write never leaves an old token paired with a new one.
        let required = self
            .set(&service, keys::REFRESH_TOKEN, &credential.refresh_token)
            .and_then(|()| self.set(&service, keys::USER_EMAIL, &credential.email))
            .and_then(|()| self.set(&service, keys::ACCESS_TOKEN, &credential.access_token));
        if let Err(e) = required {
            if let Err(cleanup) = self.secrets.delete(&service, keys::ACCESS_TOKEN) {
                debug!(
                    service = %service,
                    error = %cleanup,
                    "Failed to clear access token after partial write"
                );
            }
            return Err(e);
        }

        // Optional fields are best effort once the required ones are stored.
        let expiry = match credential.expires_at {
            Some(expires_at) => self.secrets.set(
                &service,
                keys::SESSION_EXPIRES_AT_UNIX,
                &format_unix_expiry(expires_at),
            ),
            None => self.secrets.delete(&service, keys::SESSION_EXPIRES_AT_UNIX),
        };
        if let Err(e) = expiry {
            warn!(service = %service, error = %e, "Failed to update session expiry in keyring");
        }
        if let Some(flow) = &credential.auth_flow_type
            && let Err(e) = self.secrets.set(&service, keys::AUTH_FLOW_TYPE, flow)
        {
            warn!(service = %service, error = %e, "Failed to store auth flow type in keyring");
        }

        Ok(())
    }
}

/// System keychain (macOS Keychain, Windows Credential Manager, Linux keyutils)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKeyring;

impl SystemKeyring {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "keychain")]
impl SystemKeyring {
    fn entry(service: &str, key: &str) -> Result<::keyring::Entry, KeyringError> {
        ::keyring::Entry::new(service, key).map_err(map_keyring_error)
    }
}

#[cfg(feature = "keychain")]
fn map_keyring_error(err: ::keyring::Error) -> KeyringError {
    match err {
        ::keyring::Error::NoEntry => KeyringError::NoEntry,
        other => KeyringError::Platform(other.to_string()),
    }
}

#[cfg(feature = "keychain")]
impl SecretBackend for SystemKeyring {
    fn get(&self, service: &str, key: &str) -> Result<String, KeyringError> {
        Self::entry(service, key)?
            .get_password()
            .map_err(map_keyring_error)
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), KeyringError> {
        match Self::entry(service, key)?.delete_credential() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

#[cfg(not(feature = "keychain"))]
impl SecretBackend for SystemKeyring {
    fn get(&self, _service: &str, _key: &str) -> Result<String, KeyringError> {
        Err(unsupported())
    }

    fn set(&self, _service: &str, _key: &str, _value: &str) -> Result<(), KeyringError> {
        Err(unsupported())
    }

    fn delete(&self, _service: &str, _key: &str) -> Result<(), KeyringError> {
        Err(unsupported())
    }
}

#[cfg(not(feature = "keychain"))]
fn unsupported() -> KeyringError {
    KeyringError::Platform("keyring support not compiled in".to_string())
}

/// In-process keyring, for tests and for hosts without a usable keychain
#[derive(Debug, Default)]
pub struct MemoryKeyring {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecretBackend for MemoryKeyring {
    fn get(&self, service: &str, key: &str) -> Result<String, KeyringError> {
        self.entries
            .lock()
            .get(&(service.to_string(), key.to_string()))
            .cloned()
            .ok_or(KeyringError::NoEntry)
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError> {
        self.entries
            .lock()
            .insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), KeyringError> {
        self.entries
            .lock()
            .remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}
