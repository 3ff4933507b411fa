use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_ALIAS, DEFAULT_CHECK_INTERVAL, ENV_CHECK_INTERVAL, ENV_DISABLE_UPDATE_CHECK,
    ENV_UPDATE_CHANNEL, MIN_CHECK_INTERVAL,
};
use crate::upgrade::download::DownloadConfig;
use crate::upgrade::release::UpdateChannel;

/// The `[update]` table of `~/.devx/config.toml`.
///
/// Every field is optional in the file. Environment variables take precedence
/// over anything set here; see [`UpdateSettings::resolve`].
///
/// # TOML Example
/// ```toml
/// [update]
/// channel = "beta"
/// check_interval = "12h"
/// alias = "dx"
///
/// [update.download]
/// max_retries = 3
/// per_attempt_timeout = "2m"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// `stable`, `beta` or `edge`; unknown values mean `stable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Humantime interval between automatic checks, e.g. `24h`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<String>,

    /// Disable update checks.
    pub disabled: bool,

    /// Short alias created next to the executable. Empty disables it.
    pub alias: String,

    pub download: DownloadConfig,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            channel: None,
            check_interval: None,
            disabled: false,
            alias: DEFAULT_ALIAS.to_string(),
            download: DownloadConfig::default(),
        }
    }
}

/// Effective update settings after merging the config file with the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSettings {
    pub channel: UpdateChannel,
    pub check_interval: Duration,
    pub disabled: bool,
    pub alias: Option<String>,
    pub download: DownloadConfig,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self::resolve(&UpgradeConfig::default(), |_| None)
    }
}

impl UpdateSettings {
    /// Merge `config` with variables looked up through `lookup`.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `DEVX_UPDATE_CHANNEL` | channel, overriding `update.channel` |
    /// | `DEVX_UPDATE_CHECK_INTERVAL` | interval, overriding `update.check_interval` |
    /// | `DEVX_DISABLE_UPDATE_CHECK` | `1`, `true` or `yes` disables checks |
    /// | `CI`, `GITHUB_ACTIONS` | `true` disables checks |
    pub fn resolve(config: &UpgradeConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let channel = lookup(ENV_UPDATE_CHANNEL)
            .or_else(|| config.channel.clone())
            .map(|c| UpdateChannel::parse_lenient(&c))
            .unwrap_or_default();

        let interval = lookup(ENV_CHECK_INTERVAL).or_else(|| config.check_interval.clone());
        let check_interval = parse_check_interval(interval.as_deref());

        let flag = |name: &str, accepted: &[&str]| {
            lookup(name).is_some_and(|v| accepted.iter().any(|a| v.trim().eq_ignore_ascii_case(a)))
        };
        let disabled = config.disabled
            || flag(ENV_DISABLE_UPDATE_CHECK, &["1", "true", "yes"])
            || flag("CI", &["true"])
            || flag("GITHUB_ACTIONS", &["true"]);

        let alias = Some(config.alias.trim().to_string()).filter(|a| !a.is_empty());

        Self {
            channel,
            check_interval,
            disabled,
            alias,
            download: config.download.clone(),
        }
    }

    /// [`UpdateSettings::resolve`] against the process environment.
    pub fn from_env(config: &UpgradeConfig) -> Self {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Humantime label of the check interval, e.g. `12h`.
    #[must_use]
    pub fn check_interval_label(&self) -> String {
        humantime_serde::re::humantime::format_duration(self.check_interval).to_string()
    }
}

/// Parse a humantime interval, falling back to 24h when absent or invalid and
/// raising anything under an hour to one hour.
#[must_use]
pub fn parse_check_interval(value: Option<&str>) -> Duration {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_CHECK_INTERVAL;
    };

    match humantime_serde::re::humantime::parse_duration(raw) {
        Ok(interval) if interval < MIN_CHECK_INTERVAL => {
            debug!("Check interval {} below minimum; using 1h", raw);
            MIN_CHECK_INTERVAL
        }
        Ok(interval) => interval,
        Err(e) => {
            warn!("Invalid update check interval {:?} ({}); using 24h", raw, e);
            DEFAULT_CHECK_INTERVAL
        }
    }
}
