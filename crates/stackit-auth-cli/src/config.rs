//! CLI configuration file support
//!
//! Loads configuration from ~/.config/stackit-auth/config.toml

use serde::{Deserialize, Serialize};
use stackit_auth_core::RefreshConfig;
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default settings
    #[serde(default)]
    pub default: DefaultConfig,
    /// Token refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Default configuration values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Profile used when `--profile` is not given
    pub profile: Option<String>,
}

impl CliConfig {
    /// Load configuration from default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stackit-auth").join("config.toml"))
    }

    /// Explicit profile from the command line, else from the config file.
    pub fn profile_override<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.default.profile.as_deref())
    }
}
