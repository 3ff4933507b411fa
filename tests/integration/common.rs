//! Shared fixtures for the integration suite.

use devx::test_utils::{TarEntry, build_tar_gz, checksum_manifest, init_test_logging};
use devx::upgrade::{ReleaseSource, SelfUpdater, UpdateSettings, UpgradeConfig};
use devx::utils::Platform;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ARCHIVE: &str = "devx_linux_amd64.tar.gz";
pub const NEW_BINARY: &[u8] = b"#!/bin/sh\necho devx 1.3.0\n";
pub const OLD_BINARY: &[u8] = b"#!/bin/sh\necho devx 1.2.0\n";

/// Temporary home with an installed "old" executable.
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let sandbox = Self {
            temp,
        };
        std::fs::create_dir_all(sandbox.bin_dir()).unwrap();
        std::fs::write(sandbox.executable(), OLD_BINARY).unwrap();
        sandbox
    }

    pub fn state_dir(&self) -> PathBuf {
        self.temp.path().join(".devx")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.temp.path().join("bin")
    }

    pub fn executable(&self) -> PathBuf {
        self.bin_dir().join("devx")
    }

    pub fn downloads(&self) -> PathBuf {
        self.state_dir().join("downloads")
    }

    /// Per-release download directory, e.g. `downloads/v1.3.0`.
    pub fn release_downloads(&self, tag: &str) -> PathBuf {
        self.downloads().join(tag)
    }

    /// Updater for linux/amd64 running version 1.2.0 with fast retries.
    pub fn updater(&self, source: Arc<dyn ReleaseSource>) -> SelfUpdater {
        self.updater_with(source, fast_settings())
    }

    pub fn updater_with(
        &self,
        source: Arc<dyn ReleaseSource>,
        settings: UpdateSettings,
    ) -> SelfUpdater {
        SelfUpdater::builder(source, settings, self.state_dir(), self.executable())
            .platform(Platform::new("linux", "x86_64"))
            .current_version("1.2.0")
            .build()
            .unwrap()
    }
}

pub fn fast_settings() -> UpdateSettings {
    let mut settings = UpdateSettings::resolve(&UpgradeConfig::default(), |_| None);
    settings.download.max_retries = 2;
    settings.download.initial_delay = Duration::from_millis(10);
    settings.download.max_delay = Duration::from_millis(50);
    settings.download.per_attempt_timeout = Duration::from_secs(5);
    settings
}

/// Standard release archive: the binary inside a versioned directory.
pub fn release_archive() -> Vec<u8> {
    build_tar_gz(&[
        TarEntry::dir("devx_1.3.0_linux_amd64"),
        TarEntry::file("devx_1.3.0_linux_amd64/devx", NEW_BINARY, 0o755),
        TarEntry::file("devx_1.3.0_linux_amd64/README.md", b"# devx\n", 0o644),
    ])
}

/// Serves `archive` and a matching (or overridden) manifest under `/<tag>/`.
pub async fn serve_release(
    server: &MockServer,
    tag: &str,
    archive: &[u8],
    manifest: Option<String>,
) {
    let manifest = manifest.unwrap_or_else(|| checksum_manifest(&[(ARCHIVE, archive)]));

    Mock::given(method("GET"))
        .and(path(format!("/{tag}/{ARCHIVE}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{tag}/checksums.txt")))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
        .mount(server)
        .await;
}
