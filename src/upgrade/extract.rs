//! Safe extraction of gzip-compressed tar release archives.
//!
//! Release archives come from the network and are treated as hostile even after
//! checksum verification: every entry name is resolved lexically against the
//! destination, entries that would land outside it are skipped, permission bits
//! are normalized so setuid/setgid/sticky bits never survive, and each entry is
//! capped in size.

use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::MAX_ENTRY_SIZE;
use crate::core::UpdateError;
use crate::utils::fs::set_mode;
use crate::utils::{ensure_dir, remove_file_if_exists, resolve_within, tmp_path};

/// What an extraction produced.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    /// Regular files written, in archive order
    pub files: Vec<PathBuf>,
    /// Entry names that were refused or dropped
    pub skipped: Vec<String>,
}

/// Extracts `.tar.gz` archives into a destination directory.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    max_entry_size: u64,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self {
            max_entry_size: MAX_ENTRY_SIZE,
        }
    }
}

impl ArchiveExtractor {
    #[must_use]
    pub fn with_max_entry_size(mut self, max_entry_size: u64) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// Extract `archive` into `dest` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ExtractionFailed`] if the destination cannot be
    /// created, the archive cannot be opened, or the compressed stream is corrupt.
    /// Entries that cannot be placed on disk are skipped and listed in
    /// [`ExtractReport::skipped`].
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractReport, UpdateError> {
        let extractor = self.clone();
        let archive_path = archive.to_path_buf();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || extractor.extract_blocking(&archive_path, &dest))
            .await
            .map_err(|e| UpdateError::ExtractionFailed {
                archive: archive.display().to_string(),
                reason: format!("extraction task failed: {e}"),
            })?
    }

    /// Synchronous extraction used by [`ArchiveExtractor::extract`].
    pub fn extract_blocking(
        &self,
        archive: &Path,
        dest: &Path,
    ) -> Result<ExtractReport, UpdateError> {
        let failed = |reason: String| UpdateError::ExtractionFailed {
            archive: archive.display().to_string(),
            reason,
        };

        info!("Extracting {} into {}", archive.display(), dest.display());
        ensure_dir(dest, 0o755).map_err(|e| failed(format!("{e:#}")))?;

        let file = fs::File::open(archive).map_err(|e| failed(e.to_string()))?;
        let mut tar = tar::Archive::new(GzDecoder::new(io::BufReader::new(file)));
        let entries = tar.entries().map_err(|e| failed(e.to_string()))?;

        let mut report = ExtractReport::default();
        for entry in entries {
            let mut entry = entry.map_err(|e| failed(e.to_string()))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let entry_type = entry.header().entry_type();

            if !entry_type.is_file() && !entry_type.is_dir() {
                debug!("Ignoring non-regular entry {:?} ({:?})", name, entry_type);
                continue;
            }

            let target = match resolve_within(dest, &name) {
                Ok(target) => target,
                Err(reason) => {
                    if entry_type.is_dir() && name.trim_start_matches("./").is_empty() {
                        continue;
                    }
                    warn!("Skipping archive entry {:?}: {}", name, reason);
                    report.skipped.push(name);
                    continue;
                }
            };

            if entry_type.is_dir() {
                if let Err(e) = ensure_dir(&target, 0o755) {
                    warn!("Skipping archive entry {:?}: {:#}", name, e);
                    report.skipped.push(name);
                }
                continue;
            }

            let mode = normalize_mode(entry.header().mode().unwrap_or(0o644));
            match self.write_entry(&mut entry, &target, mode) {
                Ok(true) => {
                    debug!("Extracted {} ({:o})", target.display(), mode);
                    report.files.push(target);
                }
                Ok(false) => {
                    warn!(
                        "Skipping archive entry {:?}: larger than {} bytes",
                        name, self.max_entry_size
                    );
                    report.skipped.push(name);
                }
                Err(EntryError::Local(e)) => {
                    warn!("Skipping archive entry {:?}: {}", name, e);
                    report.skipped.push(name);
                }
                Err(EntryError::Stream(e)) => {
                    return Err(failed(format!("{}: {e}", target.display())));
                }
            }
        }

        info!("Extracted {} file(s), skipped {}", report.files.len(), report.skipped.len());
        Ok(report)
    }

    /// Writes one entry through `<target>.tmp`. Returns `false` if it was over the cap.
    ///
    /// The temporary file is removed on any failure.
    fn write_entry(
        &self,
        entry: &mut impl Read,
        target: &Path,
        mode: u32,
    ) -> Result<bool, EntryError> {
        if let Some(parent) = target.parent() {
            ensure_dir(parent, 0o755)
                .map_err(|e| EntryError::Local(io::Error::other(format!("{e:#}"))))?;
        }

        let temp = tmp_path(target);
        let result = self.write_temp(entry, &temp, target, mode);
        if !matches!(result, Ok(true)) {
            if let Err(e) = remove_file_if_exists(&temp) {
                debug!("Failed to remove {}: {}", temp.display(), e);
            }
        }
        result
    }

    fn write_temp(
        &self,
        entry: &mut impl Read,
        temp: &Path,
        target: &Path,
        mode: u32,
    ) -> Result<bool, EntryError> {
        let mut out = fs::File::create(temp).map_err(EntryError::Local)?;
        let mut limited = entry.take(self.max_entry_size + 1);
        let mut buf = [0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = match limited.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EntryError::Stream(e)),
            };
            out.write_all(&buf[..n]).map_err(EntryError::Local)?;
            written += n as u64;
        }
        drop(out);

        if written > self.max_entry_size {
            return Ok(false);
        }

        set_mode(temp, mode).map_err(|e| EntryError::Local(io::Error::other(format!("{e:#}"))))?;
        fs::rename(temp, target).map_err(EntryError::Local)?;
        Ok(true)
    }
}

/// Why a single entry could not be written.
#[derive(Debug)]
enum EntryError {
    /// Reading the archive stream failed; nothing after this entry is trustworthy
    Stream(io::Error),
    /// The entry cannot be placed on disk (file/directory clash, permissions)
    Local(io::Error),
}

/// Any execute bit yields `0755`, everything else `0644`.
#[must_use]
pub fn normalize_mode(mode: u32) -> u32 {
    if mode & 0o111 != 0 { 0o755 } else { 0o644 }
}

/// Locate `binary` at the top level of `dir` or one directory below it.
#[must_use]
pub fn find_binary(dir: &Path, binary: &str) -> Option<PathBuf> {
    let direct = dir.join(binary);
    if direct.is_file() {
        return Some(direct);
    }

    let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    subdirs.into_iter().map(|d| d.join(binary)).find(|p| p.is_file())
}

/// Replace `target` with `source`, copying to `<target>.tmp` first and renaming.
///
/// On Windows the running executable cannot be overwritten, so it is moved
/// aside to `<target>.old` before the rename.
pub async fn install_binary(source: &Path, target: &Path) -> Result<(), UpdateError> {
    let failed = |reason: String| UpdateError::InstallFailed {
        path: target.display().to_string(),
        reason,
    };

    let temp = tmp_path(target);
    tokio::fs::copy(source, &temp).await.map_err(|e| failed(format!("copy failed: {e}")))?;
    set_mode(&temp, 0o755).map_err(|e| failed(format!("{e:#}")))?;

    if cfg!(windows) && target.exists() {
        let old = target.with_extension("old");
        if let Err(e) = remove_file_if_exists(&old) {
            warn!("Failed to remove previous backup {}: {}", old.display(), e);
        }
        tokio::fs::rename(target, &old).await.map_err(|e| failed(format!("backup failed: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&temp, target).await {
        if let Err(cleanup) = remove_file_if_exists(&temp) {
            warn!("Failed to remove {}: {}", temp.display(), cleanup);
        }
        return Err(failed(format!("rename failed: {e}")));
    }

    info!("Installed {}", target.display());
    Ok(())
}
