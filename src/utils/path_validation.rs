//! Lexical path validation for untrusted archive entry names.
//!
//! Nothing here touches the filesystem: entries are judged purely on their
//! components so a symlink or missing directory cannot change the verdict.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Why an entry name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafePath {
    /// Absolute path, drive prefix, or leading separator
    Absolute,
    /// Cleaned path climbs above the destination
    Escapes,
    /// Nothing left after cleaning (`.`, `a/..`)
    Empty,
}

impl fmt::Display for UnsafePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute path"),
            Self::Escapes => write!(f, "path escapes destination directory"),
            Self::Empty => write!(f, "empty path"),
        }
    }
}

/// Removes `.` segments and folds `..` into its parent without touching the filesystem.
///
/// Leading `..` segments that cannot be folded are kept.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop =
                    matches!(cleaned.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    cleaned.pop();
                } else {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Joins an untrusted relative `entry` onto `base`, refusing anything that would
/// land outside `base`.
///
/// Nested traversal such as `a/../../etc/passwd` is caught because containment is
/// checked on the cleaned path.
pub fn resolve_within(base: &Path, entry: &str) -> Result<PathBuf, UnsafePath> {
    // Checked on the raw string as well, so "/etc/passwd" is refused on Windows too
    if entry.starts_with('/') || entry.starts_with('\\') {
        return Err(UnsafePath::Absolute);
    }

    let entry_path = Path::new(entry);
    if entry_path.is_absolute()
        || entry_path.components().any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(UnsafePath::Absolute);
    }

    let cleaned = clean_path(entry_path);
    if cleaned.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(UnsafePath::Escapes);
    }
    if cleaned.as_os_str().is_empty() {
        return Err(UnsafePath::Empty);
    }

    let joined = base.join(&cleaned);
    if !joined.starts_with(base) {
        return Err(UnsafePath::Escapes);
    }
    Ok(joined)
}
