//! Test utilities for devx
//!
//! Helpers shared by unit tests and the integration suite (enabled there through
//! the `test-utils` feature):
//! - an in-memory [`ReleaseSource`] with a call counter
//! - release fixtures shaped like the GitHub API
//! - a manually advanced [`Clock`] for cache expiry tests
//! - `.tar.gz` builders that can write entry names `tar::Builder` would refuse
//!
//! # Example
//!
//! ```rust,no_run
//! use devx::test_utils::{TarEntry, build_tar_gz, sha256_hex};
//!
//! let archive = build_tar_gz(&[
//!     TarEntry::file("devx", b"#!/bin/sh\necho new\n", 0o755),
//!     TarEntry::file("../escape", b"nope", 0o644),
//! ]);
//! println!("{}", sha256_hex(&archive));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::UpdateError;
use crate::upgrade::cache::Clock;
use crate::upgrade::release::{Release, ReleaseFile, ReleaseSource};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=devx=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Fixed release list served from memory.
#[derive(Debug, Default)]
pub struct StaticReleaseSource {
    releases: Vec<Release>,
    calls: AtomicUsize,
}

impl StaticReleaseSource {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch_releases` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for StaticReleaseSource {
    fn repository(&self) -> String {
        "devx-tools/devx".to_string()
    }

    async fn fetch_releases(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(UpdateError::cancelled("Release lookup"));
        }
        Ok(self.releases.clone())
    }
}

/// Release with linux/amd64 and darwin/arm64 archives plus `checksums.txt`,
/// downloadable from `https://downloads.example.com/<tag>/`.
pub fn release(tag: &str, prerelease: bool) -> Release {
    release_at("https://downloads.example.com", tag, prerelease)
}

/// Like [`release`] with assets under `<base>/<tag>/`, e.g. a mock server.
pub fn release_at(base: &str, tag: &str, prerelease: bool) -> Release {
    let asset = |name: &str| ReleaseFile {
        name: name.to_string(),
        browser_download_url: format!("{}/{}/{}", base.trim_end_matches('/'), tag, name),
        size: 0,
    };

    Release {
        tag_name: tag.to_string(),
        body: Some(format!("\n## {tag}\n\n- Improvements\n")),
        draft: false,
        prerelease,
        html_url: format!("https://github.com/devx-tools/devx/releases/tag/{tag}"),
        assets: vec![
            asset("devx_linux_amd64.tar.gz"),
            asset("devx_darwin_arm64.tar.gz"),
            asset("checksums.txt"),
        ],
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().unwrap_or_default();
        Self::at(start)
    }
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn rewind(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now -= chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One entry of a test archive.
#[derive(Debug, Clone)]
pub enum TarEntry {
    File {
        name: String,
        data: Vec<u8>,
        mode: u32,
    },
    Dir {
        name: String,
    },
    Symlink {
        name: String,
        target: String,
    },
}

impl TarEntry {
    pub fn file(name: &str, data: &[u8], mode: u32) -> Self {
        Self::File {
            name: name.to_string(),
            data: data.to_vec(),
            mode,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self::Dir {
            name: name.to_string(),
        }
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Self::Symlink {
            name: name.to_string(),
            target: target.to_string(),
        }
    }
}

/// Copies `value` into a fixed-width header field without validation.
fn write_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    assert!(bytes.len() < field.len(), "tar field too long: {value}");
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
}

/// Builds a gzip-compressed tar archive in memory.
///
/// Names are written verbatim into the header, so absolute and `..` paths
/// can be used to exercise extraction safety.
pub fn build_tar_gz(entries: &[TarEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for entry in entries {
        let mut header = tar::Header::new_old();
        header.set_mtime(0);
        let (name, data): (&str, &[u8]) = match entry {
            TarEntry::File {
                name,
                data,
                mode,
            } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                (name.as_str(), data.as_slice())
            }
            TarEntry::Dir {
                name,
            } => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                (name.as_str(), &[][..])
            }
            TarEntry::Symlink {
                name,
                target,
            } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                write_field(&mut header.as_old_mut().linkname, target);
                (name.as_str(), &[][..])
            }
        };
        write_field(&mut header.as_old_mut().name, name);
        header.set_cksum();
        builder.append(&header, data).expect("append tar entry");
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .expect("finish tar.gz archive")
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `checksums.txt` body listing `entries` as `(file name, content)` pairs.
pub fn checksum_manifest(entries: &[(&str, &[u8])]) -> String {
    entries.iter().map(|(name, data)| format!("{}  {}\n", sha256_hex(data), name)).collect()
}
