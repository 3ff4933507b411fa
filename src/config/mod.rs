//! Configuration management for devx
//!
//! devx reads a single optional file, `~/.devx/config.toml`
//! (`%LOCALAPPDATA%\devx\config.toml` on Windows). Environment variables layered
//! on top are resolved by [`crate::upgrade::UpdateSettings`].
//!
//! # Modules
//!
//! - `global` - loading and saving the global configuration file

pub mod global;

pub use global::GlobalConfig;
