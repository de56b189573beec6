use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_PROFILE: &str = "default";

/// User configuration from `~/.config/kiln/config.toml`.
///
/// Command-line flags override these values; unset values fall back to
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KilnConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl KilnConfig {
    #[must_use]
    pub fn with_store(mut self, store: impl Into<PathBuf>) -> Self {
        self.store = Some(store.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_owned());
        self
    }

    /// Load the user config, or an empty one when the file does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            CoreError::UserConfig(format!("invalid config {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::UserConfig(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Store root: the configured one, else `~/.local/share/kiln`.
    pub fn store_root(&self) -> Result<PathBuf, CoreError> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Ok(home_dir()?.join(".local/share/kiln")),
        }
    }

    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }
}

fn home_dir() -> Result<PathBuf, CoreError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| CoreError::UserConfig("HOME not set".to_owned()))
}

pub fn default_config_path() -> Result<PathBuf, CoreError> {
    Ok(home_dir()?.join(".config/kiln/config.toml"))
}
