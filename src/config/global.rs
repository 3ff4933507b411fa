//! Global configuration at `~/.devx/config.toml`.
//!
//! The file is optional; a missing file yields defaults. Only the `[update]`
//! table is defined today. Unknown tables are ignored so newer files still load
//! with older binaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::upgrade::config::UpgradeConfig;
use crate::utils::devx_dir;

/// User-wide devx configuration.
///
/// ```toml
/// [update]
/// channel = "beta"
/// check_interval = "12h"
/// alias = "dx"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Self-update settings.
    pub update: UpgradeConfig,
}

impl GlobalConfig {
    /// Load from the default location, or defaults if the file does not exist.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use devx::config::GlobalConfig;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = GlobalConfig::load().await?;
    /// println!("alias: {}", config.update.alias);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the file
    /// exists but is unreadable or not valid TOML.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Write as pretty TOML with owner-only permissions on Unix.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;
        crate::utils::atomic_write(path, content.as_bytes(), 0o600)
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// `~/.devx/config.toml`, or `%LOCALAPPDATA%\devx\config.toml` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        Ok(devx_dir()?.join("config.toml"))
    }
}
