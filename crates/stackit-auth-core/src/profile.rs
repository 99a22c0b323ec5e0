//! Active profile selection.

use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;

/// Profile used when nothing else selects one.
pub const DEFAULT_PROFILE: &str = "default";

/// Which input selected the active profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Explicit override from the caller's configuration
    Explicit,
    /// STACKIT_CLI_PROFILE
    Environment,
    /// Profile pointer file under the config directory
    PointerFile,
    /// Nothing set
    Default,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::Explicit => write!(f, "explicit override"),
            ProfileSource::Environment => write!(f, "environment"),
            ProfileSource::PointerFile => write!(f, "profile file"),
            ProfileSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProfile {
    pub name: String,
    pub source: ProfileSource,
}

impl ResolvedProfile {
    fn new(name: impl Into<String>, source: ProfileSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_PROFILE
    }
}

/// Determines which CLI profile to use.
///
/// Priority (first non-empty wins): explicit override, STACKIT_CLI_PROFILE,
/// trimmed `cli-profile.txt`, `"default"`.
pub struct ProfileResolver<'a> {
    environment: &'a AuthEnvironment,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(environment: &'a AuthEnvironment) -> Self {
        Self { environment }
    }

    pub fn resolve(&self, explicit_override: Option<&str>) -> Result<ResolvedProfile, AuthError> {
        if let Some(profile) = explicit_override.filter(|p| !p.is_empty()) {
            return Ok(ResolvedProfile::new(profile, ProfileSource::Explicit));
        }

        if let Some(profile) = self.environment.profile_env() {
            return Ok(ResolvedProfile::new(profile, ProfileSource::Environment));
        }

        let path = self.environment.profile_pointer_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let profile = content.trim();
                if !profile.is_empty() {
                    return Ok(ResolvedProfile::new(profile, ProfileSource::PointerFile));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AuthError::ProfileResolution(format!(
                    "read profile file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        Ok(ResolvedProfile::new(DEFAULT_PROFILE, ProfileSource::Default))
    }
}
