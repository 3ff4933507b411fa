use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::UpdateError;
use crate::upgrade::cache::{UpdateCacheData, UpdateCheckCache};
use crate::upgrade::release::{ReleaseResolver, UpdateChannel};

/// Outcome of an update check, fresh or served from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheckResult {
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
    pub release_notes: String,
    pub release_url: String,
    pub checked_at: DateTime<Utc>,
    pub from_cache: bool,
    /// Why the check failed; the version fields are then only the current one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateCheckResult {
    fn from_cache(data: UpdateCacheData) -> Self {
        Self {
            current_version: data.current_version,
            latest_version: data.latest_version,
            update_available: data.update_available,
            release_notes: data.release_notes,
            release_url: data.release_url,
            checked_at: data.last_check,
            from_cache: true,
            error: None,
        }
    }

    /// Result for a check that could not reach a verdict.
    #[must_use]
    pub fn failed(current_version: impl Into<String>, error: &UpdateError) -> Self {
        let current_version = current_version.into();
        Self {
            latest_version: current_version.clone(),
            current_version,
            update_available: false,
            release_notes: String::new(),
            release_url: String::new(),
            checked_at: Utc::now(),
            from_cache: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of [`VersionChecker::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Checks are turned off by configuration or environment
    Disabled,
    Checked(UpdateCheckResult),
}

/// Whether `latest` is strictly newer than `current`.
///
/// A leading `v` is ignored on both sides. A `current` that is not semver (a
/// development build such as `dev`) is treated as older than any release; a
/// `latest` that is not semver is never newer.
///
/// # Examples
///
/// ```rust
/// use devx::upgrade::version_check::is_newer;
///
/// assert!(is_newer("v1.3.0", "1.2.9"));
/// assert!(!is_newer("1.3.0-beta.1", "1.3.0"));
/// assert!(is_newer("v0.1.0", "dev"));
/// ```
#[must_use]
pub fn is_newer(latest: &str, current: &str) -> bool {
    let parse = |v: &str| semver::Version::parse(v.trim().trim_start_matches('v')).ok();
    match (parse(latest), parse(current)) {
        (Some(latest), Some(current)) => latest > current,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Cached update checking against the release source.
///
/// A cached record is reused only while it is fresh and was written by the
/// same running version; after a self-update the first check goes to the
/// network again.
#[derive(Debug)]
pub struct VersionChecker {
    resolver: Arc<ReleaseResolver>,
    cache: Arc<UpdateCheckCache>,
    channel: UpdateChannel,
    disabled: bool,
    current_version: String,
}

impl VersionChecker {
    pub fn new(
        resolver: Arc<ReleaseResolver>,
        cache: Arc<UpdateCheckCache>,
        channel: UpdateChannel,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            cache,
            channel,
            disabled: false,
            current_version: current_version.into(),
        }
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn channel(&self) -> UpdateChannel {
        self.channel
    }

    /// Check for an update, preferring a fresh cache record.
    pub async fn check(&self, cancel: &CancellationToken) -> Result<CheckStatus, UpdateError> {
        if self.disabled {
            debug!("Update checks are disabled");
            return Ok(CheckStatus::Disabled);
        }

        if let Some(cached) = self.cached() {
            debug!("Using cached update check from {}", cached.checked_at);
            return Ok(CheckStatus::Checked(cached));
        }

        self.check_now(cancel).await.map(CheckStatus::Checked)
    }

    /// Query the release source, bypassing the cache, and store the result.
    pub async fn check_now(
        &self,
        cancel: &CancellationToken,
    ) -> Result<UpdateCheckResult, UpdateError> {
        debug!("Checking {} for {} releases", self.resolver.repository(), self.channel);

        let release = self.resolver.resolve_release(self.channel, cancel).await?;
        let update_available = is_newer(&release.tag_name, &self.current_version);
        if update_available {
            info!("Update available: {} -> {}", self.current_version, release.tag_name);
        }

        let stored = self.cache.store(UpdateCacheData {
            last_check: Utc::now(),
            current_version: self.current_version.clone(),
            latest_version: release.tag_name.clone(),
            update_available,
            release_notes: release.body.as_deref().unwrap_or_default().trim().to_string(),
            release_url: release.html_url.clone(),
            check_interval: String::new(),
        })?;

        let mut result = UpdateCheckResult::from_cache(stored);
        result.from_cache = false;
        Ok(result)
    }

    /// Fresh cache record written by this version, if any.
    pub fn cached(&self) -> Option<UpdateCheckResult> {
        self.cache
            .get()
            .filter(|data| data.current_version == self.current_version)
            .map(UpdateCheckResult::from_cache)
    }

    /// Run [`VersionChecker::check`] on a background task.
    ///
    /// The handle yields `None` when checks are disabled. A failed check never
    /// propagates: it is logged and returned as a result carrying `error`.
    pub fn spawn_background_check(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<UpdateCheckResult>> {
        tokio::spawn(async move {
            match self.check(&cancel).await {
                Ok(CheckStatus::Disabled) => None,
                Ok(CheckStatus::Checked(result)) => Some(result),
                Err(e) => {
                    debug!("Background update check failed: {}", e);
                    Some(UpdateCheckResult::failed(self.current_version.clone(), &e))
                }
            }
        })
    }

    /// Print an update banner to stderr.
    pub fn display_update_notification(result: &UpdateCheckResult) {
        let rule = "━".repeat(52);

        eprintln!();
        eprintln!("{}", rule.bright_cyan());
        eprintln!("{} A new version of devx is available!", "📦".bright_cyan());
        eprintln!();
        eprintln!("  Current version: {}", result.current_version.yellow());
        eprintln!("  Latest version:  {}", result.latest_version.green().bold());
        if !result.release_url.is_empty() {
            eprintln!("  Release notes:   {}", result.release_url.dimmed());
        }
        eprintln!();
        eprintln!("  Run {} to upgrade", "devx update install".cyan().bold());
        eprintln!();
        eprintln!("  To disable automatic update checks, set:");
        eprintln!("  {}", "DEVX_DISABLE_UPDATE_CHECK=1".dimmed());
        eprintln!("{}", rule.bright_cyan());
        eprintln!();
    }

    /// Human-readable current/latest summary.
    pub fn format_version_info(current: &str, latest: Option<&str>) -> String {
        match latest {
            Some(v) if is_newer(v, current) => {
                format!("Current version: {current}\nLatest version:  {v} (update available)")
            }
            _ => format!("Current version: {current} (up to date)"),
        }
    }
}
