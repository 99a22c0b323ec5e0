//! File backend: Base64-encoded JSON object, one file per profile.

use super::CredentialBackend;
use crate::credential::{Credential, StorageLocation, format_unix_expiry, parse_unix_expiry};
use crate::environment::AuthEnvironment;
use crate::error::BackendError;
use crate::profile::DEFAULT_PROFILE;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// On-disk schema shared with the STACKIT CLI.
///
/// Keys this crate does not know about are kept in `extra` so a write
/// never drops data the CLI stored alongside the tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_expires_at_unix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_flow_type: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl FileRecord {
    fn decode(encoded: &str) -> Result<Self, BackendError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| BackendError::Malformed(format!("decode base64: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Malformed(format!("unmarshal json: {}", e)))
    }

    fn encode(&self) -> Result<String, BackendError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| BackendError::Unavailable(format!("marshal json: {}", e)))?;
        Ok(STANDARD.encode(json))
    }

    fn into_credential(self) -> Result<Credential, BackendError> {
        fn required(value: Option<String>, key: &str) -> Result<String, BackendError> {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BackendError::Malformed(format!("{} not found in file", key)))
        }

        let mut credential = Credential::new(
            required(self.access_token, "access_token")?,
            required(self.refresh_token, "refresh_token")?,
            required(self.user_email, "user_email")?,
        );

        if let Some(raw) = self.session_expires_at_unix {
            credential.expires_at = parse_unix_expiry(&raw);
            if credential.expires_at.is_none() {
                warn!(value = %raw, "Ignoring unparsable session expiry in credentials file");
            }
        }
        credential.auth_flow_type = self.auth_flow_type.filter(|f| !f.is_empty());

        Ok(credential)
    }

    fn apply(&mut self, credential: &Credential) {
        self.access_token = Some(credential.access_token.clone());
        self.refresh_token = Some(credential.refresh_token.clone());
        self.user_email = Some(credential.email.clone());
        self.session_expires_at_unix = credential.expires_at.map(format_unix_expiry);
        if let Some(flow) = &credential.auth_flow_type {
            self.auth_flow_type = Some(flow.clone());
        }
    }
}

/// Reads and writes `cli-provider-auth-storage.txt` under `~/.stackit`
pub struct FileBackend {
    environment: AuthEnvironment,
}

impl FileBackend {
    pub fn new(environment: AuthEnvironment) -> Self {
        Self { environment }
    }

    /// Credential file path for `profile`.
    pub fn path_for(&self, profile: &str) -> Result<PathBuf, BackendError> {
        validate_profile_name(profile)?;
        Ok(self.environment.credentials_file(profile, DEFAULT_PROFILE))
    }
}

/// Profile names become path components; refuse anything that would
/// leave the profiles directory.
fn validate_profile_name(profile: &str) -> Result<(), BackendError> {
    let invalid = profile.is_empty()
        || profile == "."
        || profile == ".."
        || profile.contains(['/', '\\'])
        || profile.contains('\0');
    if invalid {
        return Err(BackendError::Unavailable(format!(
            "invalid profile name '{}'",
            profile
        )));
    }
    Ok(())
}

impl CredentialBackend for FileBackend {
    fn location(&self) -> StorageLocation {
        StorageLocation::File
    }

    fn read(&self, profile: &str) -> Result<Credential, BackendError> {
        let path = self.path_for(profile)?;

        let encoded = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackendError::NotFound(format!(
                    "credentials file not found at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(BackendError::Unavailable(format!("read file: {}", e))),
        };

        FileRecord::decode(&encoded)?.into_credential()
    }

    fn write(&self, profile: &str, credential: &Credential) -> Result<(), BackendError> {
        let path = self.path_for(profile)?;
        let dir = path
            .parent()
            .ok_or_else(|| BackendError::Unavailable("credentials path has no parent".into()))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| BackendError::Unavailable(format!("create directory: {}", e)))?;

        // Keep whatever else the CLI stored in the file.
        let mut record = match std::fs::read_to_string(&path) {
            Ok(existing) => FileRecord::decode(&existing).unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "Replacing unreadable credentials file");
                FileRecord::default()
            }),
            Err(_) => FileRecord::default(),
        };
        record.apply(credential);

        write_atomic(&path, dir, record.encode()?.as_bytes())
            .map_err(|e| BackendError::Unavailable(format!("write file: {}", e)))
    }
}

/// Write to a temp file in the target directory, then rename into place,
/// so a concurrent reader in another process sees the old or the new
/// content, never a torn one.
fn write_atomic(path: &Path, dir: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
