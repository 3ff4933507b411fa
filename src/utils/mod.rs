//! Cross-platform utilities and helpers
//!
//! - [`fs`] - atomic temp-and-rename writes and directory helpers
//! - [`path_validation`] - lexical containment checks for untrusted paths
//! - [`platform`] - release platform naming and per-user directories
//! - [`progress`] - spinners for long-running CLI operations

pub mod fs;
pub mod path_validation;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, remove_file_if_exists, tmp_path};
pub use path_validation::{UnsafePath, clean_path, resolve_within};
pub use platform::{Platform, devx_dir, get_home_dir};
