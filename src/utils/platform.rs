//! Platform identification and per-user directory helpers.
//!
//! Release archives use Go-style platform names (`darwin`, `amd64`, ...), so the
//! Rust target constants are translated once here.

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

/// Operating system and architecture in release-asset naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `linux`, `darwin`, `windows`, ...
    pub os: String,
    /// `amd64`, `arm64`, `386`, ...
    pub arch: String,
}

impl Platform {
    /// Builds a platform from Rust target names, translating them to release names.
    pub fn new(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Trailing part of the asset name for this platform, e.g. `_linux_amd64.tar.gz`.
    #[must_use]
    pub fn asset_suffix(&self) -> String {
        format!("_{}_{}.tar.gz", self.os, self.arch)
    }

    /// Executable file name on this platform.
    #[must_use]
    pub fn executable_name(&self, base: &str) -> String {
        if self.is_windows() {
            format!("{base}.exe")
        } else {
            base.to_string()
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if cfg!(windows) {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Per-user devx directory holding the config file, cache and downloads.
///
/// - Unix/macOS: `~/.devx`
/// - Windows: `%LOCALAPPDATA%\devx`
pub fn devx_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        Ok(dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("devx"))
    } else {
        Ok(get_home_dir()?.join(".devx"))
    }
}
