//! Resolved process environment for credential lookup.
//!
//! Everything the engine would otherwise read ad hoc (home directory,
//! config directory, profile env var) is captured once here and passed in.

use crate::error::AuthError;
use std::path::PathBuf;

/// Environment variable selecting the CLI profile.
pub const PROFILE_ENV: &str = "STACKIT_CLI_PROFILE";

/// Environment variable overriding the STACKIT config directory.
pub const CONFIG_DIR_ENV: &str = "STACKIT_CONFIG_DIR";

const PROFILE_POINTER_FILE: &str = "cli-profile.txt";
const STORAGE_DIR: &str = ".stackit";
const PROFILES_DIR: &str = "profiles";
const CREDENTIALS_FILE: &str = "cli-provider-auth-storage.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEnvironment {
    home_dir: PathBuf,
    config_dir: PathBuf,
    profile_env: Option<String>,
}

impl AuthEnvironment {
    /// Environment rooted at `home_dir` with no env overrides.
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        let config_dir = home_dir.join(".config").join("stackit");
        Self {
            home_dir,
            config_dir,
            profile_env: None,
        }
    }

    /// Resolve from the current process.
    /// Priority for the config directory: STACKIT_CONFIG_DIR > ~/.config/stackit
    pub fn from_env() -> Result<Self, AuthError> {
        let home = dirs::home_dir().ok_or_else(|| {
            AuthError::ProfileResolution("failed to determine home directory".to_string())
        })?;
        let mut environment = Self::new(home);

        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
            && !dir.trim().is_empty()
        {
            environment.config_dir = PathBuf::from(dir);
        }
        environment.profile_env = std::env::var(PROFILE_ENV).ok();

        Ok(environment)
    }

    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    pub fn with_profile_env(mut self, profile: impl Into<String>) -> Self {
        self.profile_env = Some(profile.into());
        self
    }

    /// Value of STACKIT_CLI_PROFILE captured at construction, if non-empty.
    pub fn profile_env(&self) -> Option<&str> {
        self.profile_env.as_deref().filter(|p| !p.is_empty())
    }

    /// Get the profile pointer path: <config dir>/cli-profile.txt
    pub fn profile_pointer_path(&self) -> PathBuf {
        self.config_dir.join(PROFILE_POINTER_FILE)
    }

    /// Directory holding the default profile's credential file: ~/.stackit
    pub fn storage_dir(&self) -> PathBuf {
        self.home_dir.join(STORAGE_DIR)
    }

    /// Credential file for a profile.
    ///
    /// The default profile lives directly in `~/.stackit`, others under
    /// `~/.stackit/profiles/<profile>/`.
    pub fn credentials_file(&self, profile: &str, default_profile: &str) -> PathBuf {
        if profile == default_profile {
            self.storage_dir().join(CREDENTIALS_FILE)
        } else {
            self.storage_dir()
                .join(PROFILES_DIR)
                .join(profile)
                .join(CREDENTIALS_FILE)
        }
    }
}
