use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{MANIFEST_FETCH_TIMEOUT, MAX_MANIFEST_SIZE};
use crate::core::UpdateError;
use crate::utils::remove_file_if_exists;

/// Verifies downloaded release archives against a published SHA-256 manifest.
///
/// The manifest is the goreleaser-style `checksums.txt` asset, one
/// `<hex-digest><whitespace><filename>` line per artifact. Verification runs
/// after the download completes and before anything is extracted; a mismatching
/// archive is deleted so it cannot be picked up again.
///
/// # Security Benefits
///
/// - **Download Integrity**: Detects corrupted or incomplete downloads
/// - **Tamper Detection**: Identifies archives that differ from the published build
#[derive(Debug, Clone)]
pub struct ChecksumVerifier {
    client: reqwest::Client,
}

impl ChecksumVerifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
        }
    }

    /// Compute the hex-encoded SHA-256 of a file, streaming its contents.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use devx::upgrade::verification::ChecksumVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> Result<(), devx::core::UpdateError> {
    /// let archive = Path::new("/path/to/archive.tar.gz");
    /// let checksum = ChecksumVerifier::compute_sha256(archive).await?;
    /// println!("SHA256: {}", checksum);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let path = file_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut file = std::io::BufReader::new(std::fs::File::open(&path)?);
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            Ok(hex::encode(hasher.finalize()))
        })
        .await
        .map_err(|e| UpdateError::Other {
            message: format!("Checksum task failed: {e}"),
        })?
        .map_err(UpdateError::from)
    }

    /// Case-insensitive digest comparison.
    #[must_use]
    pub fn digests_match(expected: &str, actual: &str) -> bool {
        expected.trim().eq_ignore_ascii_case(actual.trim())
    }

    /// Parses a checksum manifest into a file name to digest map.
    ///
    /// Lines that do not carry exactly a 64-character hex digest and a file name
    /// are ignored. A leading `*` (binary-mode marker) and any directory part of
    /// the file name are dropped.
    ///
    /// ```text
    /// 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08  devx_linux_amd64.tar.gz
    /// 60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752 *devx_darwin_arm64.tar.gz
    /// ```
    #[must_use]
    pub fn parse_manifest(content: &str) -> HashMap<String, String> {
        let mut entries = HashMap::new();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(digest), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            let name = name.trim_start_matches('*');
            let base = name.rsplit('/').next().unwrap_or(name);
            entries.insert(base.to_string(), digest.to_string());
        }
        entries
    }

    /// Download the manifest at `manifest_url`, reading at most 1 MiB.
    pub async fn fetch_manifest(
        &self,
        manifest_url: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>, UpdateError> {
        debug!("Fetching checksums from: {}", manifest_url);

        let failed = |reason: String| UpdateError::ManifestFetchFailed {
            url: manifest_url.to_string(),
            reason,
        };

        let fetch = async {
            let mut response = self
                .client
                .get(manifest_url)
                .timeout(MANIFEST_FETCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| failed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(failed(format!("HTTP {}", response.status())));
            }

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
                if (body.len() + chunk.len()) as u64 > MAX_MANIFEST_SIZE {
                    return Err(failed(format!("manifest exceeds {MAX_MANIFEST_SIZE} bytes")));
                }
                body.extend_from_slice(&chunk);
            }
            Ok(Self::parse_manifest(&String::from_utf8_lossy(&body)))
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpdateError::cancelled("Checksum manifest fetch")),
            result = fetch => result,
        }
    }

    /// Verify `file_path` against `expected`, deleting the file on mismatch.
    pub async fn verify_checksum(
        file_path: &Path,
        asset_name: &str,
        expected: &str,
    ) -> Result<String, UpdateError> {
        info!("Verifying checksum for: {:?}", file_path);

        let actual = Self::compute_sha256(file_path).await?;
        if !Self::digests_match(expected, &actual) {
            warn!("Checksum mismatch for {}; deleting {}", asset_name, file_path.display());
            if let Err(e) = remove_file_if_exists(file_path) {
                warn!("Failed to delete {}: {}", file_path.display(), e);
            }
            return Err(UpdateError::ChecksumMismatch {
                asset: asset_name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(actual)
    }

    /// Fetch the manifest, look up the archive's base name and verify it.
    ///
    /// Returns the verified digest.
    pub async fn verify_from_manifest(
        &self,
        archive: &Path,
        manifest_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, UpdateError> {
        let asset_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let manifest = self.fetch_manifest(manifest_url, cancel).await?;
        let expected = manifest.get(&asset_name).ok_or_else(|| UpdateError::ManifestEntryMissing {
            asset: asset_name.clone(),
        })?;

        Self::verify_checksum(archive, &asset_name, expected).await
    }
}
