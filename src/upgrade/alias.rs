//! Short command alias installed next to the executable.
//!
//! After a successful install devx offers a short alias (`dx` by default) in the
//! same directory as the binary. Alias creation never fails an update: anything
//! that goes wrong is reported through [`AliasOutcome::Failed`] and logged.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of an alias attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    Created(PathBuf),
    /// Something already exists at the alias path and was left untouched
    AlreadyPresent(PathBuf),
    Failed(String),
}

impl std::fmt::Display for AliasOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(path) => write!(f, "created alias {}", path.display()),
            Self::AlreadyPresent(path) => write!(f, "alias {} already present", path.display()),
            Self::Failed(reason) => write!(f, "alias not created: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AliasInstaller {
    name: String,
}

impl AliasInstaller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the alias inside `install_dir`; a `.bat` wrapper on Windows.
    #[must_use]
    pub fn alias_path(&self, install_dir: &Path) -> PathBuf {
        if cfg!(windows) {
            install_dir.join(format!("{}.bat", self.name))
        } else {
            install_dir.join(&self.name)
        }
    }

    /// Make sure the alias exists next to `executable`.
    pub fn ensure(&self, executable: &Path) -> AliasOutcome {
        let name = self.name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return AliasOutcome::Failed(format!("invalid alias name {:?}", self.name));
        }
        let Some(install_dir) = executable.parent() else {
            return AliasOutcome::Failed(format!(
                "{} has no parent directory",
                executable.display()
            ));
        };

        let alias = self.alias_path(install_dir);
        if std::fs::symlink_metadata(&alias).is_ok() {
            if std::fs::read_link(&alias).is_ok_and(|target| {
                target == executable || install_dir.join(&target) == executable
            }) {
                info!("Alias {} already points to {}", alias.display(), executable.display());
            } else {
                warn!("{} already exists; not replacing it with an alias", alias.display());
            }
            return AliasOutcome::AlreadyPresent(alias);
        }

        match create_alias(&alias, executable) {
            Ok(()) => {
                info!("Created alias {} -> {}", alias.display(), executable.display());
                AliasOutcome::Created(alias)
            }
            Err(e) => {
                warn!("Failed to create alias {}: {}", alias.display(), e);
                AliasOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(unix)]
fn create_alias(alias: &Path, executable: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(executable, alias)
}

#[cfg(not(unix))]
fn create_alias(alias: &Path, executable: &Path) -> std::io::Result<()> {
    let script = format!("@echo off\r\n\"{}\" %*\r\n", executable.display());
    std::fs::write(alias, script)
}
