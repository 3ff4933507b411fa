//! Self-update functionality for devx.
//!
//! This module checks GitHub releases for newer builds of devx and replaces the
//! running executable in place. Each stage is its own component so it can be
//! tested against a local HTTP server and temporary directories.
//!
//! # Architecture Overview
//!
//! - **[`release`]**: Picks the release for an [`UpdateChannel`] and the platform's archive
//! - **[`download`]**: Resumable, retrying, cancellable HTTP downloads
//! - **[`verification`]**: SHA-256 verification against the release's `checksums.txt`
//! - **[`extract`]**: Path-safe `.tar.gz` extraction and atomic executable replacement
//! - **[`alias`]**: Optional short alias (`dx`) next to the executable
//! - **[`cache`]**: Time-limited record of the last update check
//! - **[`version_check`]**: Cached update checks and the notification banner
//! - **[`SelfUpdater`]**: Runs the stages in order
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Release Resolution
//!    ├── Consult the update-check cache
//!    └── List releases and pick one for the channel and platform
//!
//! 2. Download
//!    ├── Stream to <archive>.tmp, resuming a previous partial download
//!    └── Retry transient failures with exponential backoff
//!
//! 3. Verification
//!    └── Compare SHA-256 against checksums.txt; delete on mismatch
//!
//! 4. Installation
//!    ├── Extract into a staging directory, skipping unsafe entries
//!    ├── Copy the executable next to the live one and rename over it
//!    └── Create the alias if it does not exist
//!
//! 5. Post-Update
//!    ├── Record the check in the cache
//!    └── Remove the downloaded archive
//! ```
//!
//! # Security Considerations
//!
//! - **Verified Downloads**: Archives are verified before anything is extracted
//! - **Contained Extraction**: Entries that resolve outside the staging directory are skipped
//! - **Normalized Permissions**: setuid, setgid and sticky bits never survive extraction
//! - **Atomic Replacement**: The executable is never truncated in place
//!
//! # Usage Patterns
//!
//! ```bash
//! devx update check              # Check for updates (uses the cache)
//! devx update status             # Show the cached result without network access
//! devx update install            # Install the latest release for the channel
//! devx update install --force    # Reinstall even if already up to date
//! devx update clear-cache        # Forget the last check
//! ```
//!
//! # Configuration
//!
//! ```toml
//! # ~/.devx/config.toml
//! [update]
//! channel = "stable"        # stable, beta or edge
//! check_interval = "24h"    # minimum 1h
//! alias = "dx"              # empty to skip the alias
//! ```
//!
//! `DEVX_UPDATE_CHANNEL`, `DEVX_UPDATE_CHECK_INTERVAL` and
//! `DEVX_DISABLE_UPDATE_CHECK` override the file; `CI=true` or
//! `GITHUB_ACTIONS=true` disable checks.

pub mod alias;
pub mod cache;
pub mod config;
pub mod download;
pub mod extract;
pub mod release;
pub mod self_updater;
pub mod verification;
pub mod version_check;

pub use cache::{Clock, SystemClock, UpdateCacheData, UpdateCheckCache};
pub use config::{UpdateSettings, UpgradeConfig};
pub use download::{DownloadConfig, DownloadReport, Downloader};
pub use release::{
    GitHubReleaseSource, Release, ReleaseAsset, ReleaseResolver, ReleaseSource, UpdateChannel,
};
pub use self_updater::{InstallOptions, InstallReport, SelfUpdater, UpdateOutcome};
pub use version_check::{CheckStatus, UpdateCheckResult, VersionChecker, is_newer};
