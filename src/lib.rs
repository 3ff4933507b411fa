//! devx - developer experience toolkit
//!
//! This crate holds the self-update machinery behind `devx update`: it finds
//! newer releases on GitHub, downloads them with resume and retry, verifies the
//! archive against the published checksums, extracts it without letting entries
//! escape the staging directory, and atomically replaces the running executable.
//!
//! # Architecture Overview
//!
//! ```text
//! cache lookup -> release resolution -> download -> verification
//!              -> extraction -> executable replacement -> alias -> cache store
//! ```
//!
//! Every stage takes a [`tokio_util::sync::CancellationToken`]. Collaborators
//! (release source, HTTP client, clock, directories) are injected so the whole
//! pipeline runs against a local mock server in tests.
//!
//! # Core Modules
//!
//! - [`upgrade`] - Release resolution, download, verification, extraction and the update pipeline
//! - [`config`] - Global configuration (`~/.devx/config.toml`)
//! - [`core`] - Error taxonomy and user-facing error formatting
//! - [`cli`] - Command-line interface
//! - [`utils`] - Atomic file writes, path containment, platform naming, progress
//! - [`constants`] - Timeouts, limits and environment variable names
//!
//! # Example
//!
//! ```rust,no_run
//! use devx::config::GlobalConfig;
//! use devx::upgrade::{InstallOptions, SelfUpdater, UpdateSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let updater = SelfUpdater::from_environment(UpdateSettings::from_env(&config.update))?;
//! updater.install(InstallOptions::default(), &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
