//! Atomic file write operations using a temp-and-rename strategy.
//!
//! Every file devx publishes (cache record, extracted archive entries, the new
//! executable) is first written to a sibling `<name>.tmp` path and then renamed
//! over the target, so readers never observe partial content.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Returns the sibling temporary path `<path>.tmp`.
///
/// Unlike [`Path::with_extension`] this keeps the full file name, so
/// `devx_linux_amd64.tar.gz` becomes `devx_linux_amd64.tar.gz.tmp`.
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Creates `dir` and its parents, applying `mode` on Unix to directories created here.
pub fn ensure_dir(dir: &Path, #[allow(unused_variables)] mode: u32) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }

    builder
        .create(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Writes `content` to `path` atomically.
///
/// On Unix the temporary file is created with `mode` before any byte is written,
/// so restrictive permissions hold for the whole lifetime of the file.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let temp_path = tmp_path(path);

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }

        let mut file = options
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        set_mode(&temp_path, mode)?;
        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Sets permission bits on Unix; a no-op elsewhere.
pub fn set_mode(path: &Path, #[allow(unused_variables)] mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Removes a file, treating "not found" as success.
///
/// Returns whether a file was actually removed.
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
