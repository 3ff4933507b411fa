//! Global constants used throughout the devx codebase.
//!
//! Timeouts, size limits, default identities and environment variable names
//! live here so the pipeline stages and their tests agree on them.

use std::time::Duration;

/// GitHub owner of the devx release repository.
pub const DEFAULT_REPO_OWNER: &str = "devx-tools";

/// GitHub repository that publishes devx releases.
pub const DEFAULT_REPO_NAME: &str = "devx";

/// Executable name inside release archives (without platform extension).
pub const BINARY_NAME: &str = "devx";

/// Default short alias created next to the installed executable.
pub const DEFAULT_ALIAS: &str = "dx";

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Timeout for a single release-listing request.
pub const RELEASE_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of releases requested per listing call.
pub const RELEASES_PER_PAGE: u32 = 20;

/// Upper bound on the checksum manifest body.
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Timeout for fetching the checksum manifest.
pub const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the bytes read for a single archive entry.
pub const MAX_ENTRY_SIZE: u64 = 500 * 1024 * 1024;

/// Default time between update checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest accepted check interval; lower overrides are raised to this.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// File name of the update-check cache.
pub const UPDATE_CACHE_FILE: &str = "update-check.json";

/// Environment variable selecting the update channel.
pub const ENV_UPDATE_CHANNEL: &str = "DEVX_UPDATE_CHANNEL";

/// Environment variable overriding the check interval (e.g. `12h`).
pub const ENV_CHECK_INTERVAL: &str = "DEVX_UPDATE_CHECK_INTERVAL";

/// Environment variable disabling update checks entirely.
pub const ENV_DISABLE_UPDATE_CHECK: &str = "DEVX_DISABLE_UPDATE_CHECK";

/// Tool-specific GitHub token, preferred over the generic ones.
pub const ENV_GITHUB_TOKEN: &str = "DEVX_GITHUB_TOKEN";
