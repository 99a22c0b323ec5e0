//! Credential storage over the system keyring and the encoded file.
//!
//! Reads try the keyring first and fall back to the file on any failure.
//! Writes go to the preferred backend first and fall back to the other one.

mod file;
mod keyring;

pub use file::FileBackend;
pub use keyring::{KeyringBackend, MemoryKeyring, SecretBackend, SystemKeyring};

use crate::credential::{Credential, StorageLocation};
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, BackendError};
use crate::profile::DEFAULT_PROFILE;
use std::sync::Arc;
use tracing::{debug, warn};

/// A physical place a credential can live in
pub trait CredentialBackend: Send + Sync {
    fn location(&self) -> StorageLocation;

    /// Read the full credential for `profile`; partial records are errors.
    fn read(&self, profile: &str) -> Result<Credential, BackendError>;

    /// Persist `credential` for `profile`.
    fn write(&self, profile: &str, credential: &Credential) -> Result<(), BackendError>;
}

/// Keyring + file storage with a defined fallback order
pub struct CredentialStore {
    keyring: Arc<dyn CredentialBackend>,
    file: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    pub fn new(keyring: Arc<dyn CredentialBackend>, file: Arc<dyn CredentialBackend>) -> Self {
        Self { keyring, file }
    }

    /// Standard STACKIT CLI layout on top of the given keyring capability.
    pub fn for_environment(environment: &AuthEnvironment, secrets: Arc<dyn SecretBackend>) -> Self {
        Self::new(
            Arc::new(KeyringBackend::new(secrets)),
            Arc::new(FileBackend::new(environment.clone())),
        )
    }

    fn backend(&self, location: StorageLocation) -> &Arc<dyn CredentialBackend> {
        match location {
            StorageLocation::Keyring => &self.keyring,
            StorageLocation::File => &self.file,
        }
    }

    /// Read credentials for `profile`, keyring first.
    ///
    /// The returned record carries `source_profile` and the backend that
    /// satisfied the read.
    pub fn read(&self, profile: &str) -> Result<Credential, AuthError> {
        let keyring_err = match Self::read_from(&self.keyring, profile) {
            Ok(credential) => return Ok(credential),
            Err(e) => e,
        };
        debug!(profile, error = %keyring_err, "Keyring read failed, trying file");

        let file_err = match Self::read_from(&self.file, profile) {
            Ok(credential) => return Ok(credential),
            Err(e) => e,
        };
        debug!(profile, error = %file_err, "File read failed");

        let (profile, keyring, file) = (
            profile.to_string(),
            keyring_err.to_string(),
            file_err.to_string(),
        );
        if keyring_err.is_malformed() || file_err.is_malformed() {
            Err(AuthError::MalformedCredential {
                profile,
                keyring,
                file,
            })
        } else {
            Err(AuthError::CredentialsNotFound {
                profile,
                keyring,
                file,
            })
        }
    }

    /// Write credentials for `profile`.
    ///
    /// Starts with the backend recorded in `credential.storage_location`
    /// (keyring when none is recorded) and falls back to the other one.
    /// Returns the backend that accepted the write.
    pub fn write(&self, profile: &str, credential: &Credential) -> Result<StorageLocation, AuthError> {
        let profile = if profile.is_empty() {
            DEFAULT_PROFILE
        } else {
            profile
        };
        let preferred = credential
            .storage_location
            .unwrap_or(StorageLocation::Keyring);

        let preferred_err = match self.backend(preferred).write(profile, credential) {
            Ok(()) => return Ok(preferred),
            Err(e) => e,
        };

        let fallback = preferred.other();
        warn!(
            profile,
            location = %preferred,
            error = %preferred_err,
            "Credential write failed, falling back to {}", fallback
        );

        match self.backend(fallback).write(profile, credential) {
            Ok(()) => Ok(fallback),
            Err(fallback_err) => {
                let (keyring, file) = match preferred {
                    StorageLocation::Keyring => (preferred_err, fallback_err),
                    StorageLocation::File => (fallback_err, preferred_err),
                };
                Err(AuthError::Persist {
                    profile: profile.to_string(),
                    keyring: keyring.to_string(),
                    file: file.to_string(),
                })
            }
        }
    }

    /// Read from one backend and tag the record with its provenance.
    fn read_from(
        backend: &Arc<dyn CredentialBackend>,
        profile: &str,
    ) -> Result<Credential, BackendError> {
        let mut credential = backend.read(profile)?;
        credential.source_profile = profile.to_string();
        credential.storage_location = Some(backend.location());
        Ok(credential)
    }
}
