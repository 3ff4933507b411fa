//! Release resolution against the release-hosting API.
//!
//! [`ReleaseResolver`] picks the release for an [`UpdateChannel`] and the archive
//! for the running [`Platform`]. The listing itself comes from a [`ReleaseSource`];
//! production code uses [`GitHubReleaseSource`], tests substitute a static list.
//!
//! Selection relies entirely on the host's newest-first ordering:
//!
//! | Channel | Picks |
//! |---|---|
//! | `stable` | first non-draft, non-prerelease release |
//! | `beta`, `edge` | first non-draft release, prerelease or not |
//!
//! `beta` and `edge` currently share the same prerelease-inclusive behavior.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::{ENV_GITHUB_TOKEN, GITHUB_API_BASE, RELEASE_API_TIMEOUT, RELEASES_PER_PAGE};
use crate::core::UpdateError;
use crate::utils::Platform;

/// Named update track controlling which release is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    /// Only non-prerelease builds
    #[default]
    Stable,
    /// Newest build including prereleases
    Beta,
    /// Same selection as beta
    Edge,
}

impl UpdateChannel {
    /// Parses a channel name case-insensitively; anything unrecognized is `Stable`.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "beta" => Self::Beta,
            "edge" => Self::Edge,
            "stable" | "" => Self::Stable,
            other => {
                debug!("Unknown update channel '{}', using stable", other);
                Self::Stable
            }
        }
    }

    /// Whether prerelease builds may be selected.
    #[must_use]
    pub const fn includes_prereleases(self) -> bool {
        matches!(self, Self::Beta | Self::Edge)
    }
}

impl FromStr for UpdateChannel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::Edge => "edge",
        };
        f.write_str(name)
    }
}

/// A release as listed by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub assets: Vec<ReleaseFile>,
}

/// A downloadable file attached to a [`Release`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// The resolved archive for one release and platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub version_tag: String,
    pub is_prerelease: bool,
    pub asset_name: String,
    pub download_url: String,
    /// URL of the `checksums.txt` asset, when the release has one
    pub checksum_manifest_url: Option<String>,
    pub release_notes: String,
    pub release_url: String,
}

/// Read-only access to a project's releases, newest first.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Human-readable identity of the project, e.g. `owner/repo`.
    fn repository(&self) -> String;

    /// Lists releases in creation-time-descending order.
    async fn fetch_releases(&self, cancel: &CancellationToken)
    -> Result<Vec<Release>, UpdateError>;
}

/// Release listing through the GitHub REST API.
///
/// When a token is configured the authenticated request is tried first and the
/// anonymous API is used as a fallback, so an expired token never blocks updates.
#[derive(Debug, Clone)]
pub struct GitHubReleaseSource {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
    user_agent: String,
}

impl GitHubReleaseSource {
    pub fn new(client: reqwest::Client, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: None,
            user_agent: format!("devx/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Points the source at another API root (GitHub Enterprise, test servers).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Picks a token from `DEVX_GITHUB_TOKEN`, `GITHUB_TOKEN`, then `GH_TOKEN`.
    pub fn token_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        [ENV_GITHUB_TOKEN, "GITHUB_TOKEN", "GH_TOKEN"]
            .into_iter()
            .filter_map(&lookup)
            .find(|value| !value.trim().is_empty())
    }

    fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={}",
            self.api_base, self.owner, self.repo, RELEASES_PER_PAGE
        )
    }

    async fn request(&self, token: Option<&str>) -> Result<Vec<Release>, UpdateError> {
        let url = self.releases_url();
        let mut request = self
            .client
            .get(&url)
            .timeout(RELEASE_API_TIMEOUT)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, &self.user_agent);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| UpdateError::ReleaseApi {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if is_rate_limited(status, response.headers()) {
            return Err(UpdateError::RateLimited {
                url,
            });
        }
        if !status.is_success() {
            return Err(UpdateError::ReleaseApi {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        response.json::<Vec<Release>>().await.map_err(|e| UpdateError::ReleaseApi {
            url,
            reason: format!("invalid response body: {e}"),
        })
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    async fn fetch_releases(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, UpdateError> {
        let fetch = async {
            if let Some(token) = self.token.as_deref() {
                match self.request(Some(token)).await {
                    Ok(releases) => return Ok(releases),
                    Err(e) => {
                        warn!("Authenticated release lookup failed ({}), retrying anonymously", e);
                    }
                }
            }
            self.request(None).await
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpdateError::cancelled("Release lookup")),
            result = fetch => result,
        }
    }
}

/// Chooses releases and platform archives for a project.
#[derive(Clone)]
pub struct ReleaseResolver {
    source: Arc<dyn ReleaseSource>,
    project_name: String,
}

impl fmt::Debug for ReleaseResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseResolver")
            .field("repository", &self.source.repository())
            .field("project_name", &self.project_name)
            .finish()
    }
}

impl ReleaseResolver {
    /// `project_name` is the archive prefix, as in `<project>_<os>_<arch>.tar.gz`.
    pub fn new(source: Arc<dyn ReleaseSource>, project_name: impl Into<String>) -> Self {
        Self {
            source,
            project_name: project_name.into(),
        }
    }

    #[must_use]
    pub fn repository(&self) -> String {
        self.source.repository()
    }

    /// Returns the release the channel currently points at.
    pub async fn resolve_release(
        &self,
        channel: UpdateChannel,
        cancel: &CancellationToken,
    ) -> Result<Release, UpdateError> {
        debug!("Resolving {} release for {}", channel, self.source.repository());
        let releases = self.source.fetch_releases(cancel).await?;
        select_release(&releases, channel, &self.source.repository()).cloned()
    }

    /// Returns the release and the archive matching `platform`.
    pub async fn resolve(
        &self,
        channel: UpdateChannel,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<ReleaseAsset, UpdateError> {
        let release = self.resolve_release(channel, cancel).await?;
        self.asset_for(&release, platform)
    }

    /// Finds the platform archive and checksum manifest within `release`.
    pub fn asset_for(
        &self,
        release: &Release,
        platform: &Platform,
    ) -> Result<ReleaseAsset, UpdateError> {
        let prefix = format!("{}_", self.project_name);
        let suffix = platform.asset_suffix();

        let mut matching = release
            .assets
            .iter()
            .filter(|asset| asset.name.starts_with(&prefix) && asset.name.ends_with(&suffix));
        let archive = matching.next().ok_or_else(|| UpdateError::NoMatchingAsset {
            tag: release.tag_name.clone(),
            pattern: suffix.clone(),
        })?;
        if let Some(extra) = matching.next() {
            warn!(
                "Release {} has several archives for {}; using {} over {}",
                release.tag_name, platform, archive.name, extra.name
            );
        }

        let checksum_manifest_url = release
            .assets
            .iter()
            .find(|asset| asset.name.ends_with("checksums.txt"))
            .map(|asset| asset.browser_download_url.clone());

        Ok(ReleaseAsset {
            version_tag: release.tag_name.clone(),
            is_prerelease: release.prerelease,
            asset_name: archive.name.clone(),
            download_url: archive.browser_download_url.clone(),
            checksum_manifest_url,
            release_notes: release.body.as_deref().unwrap_or_default().trim().to_string(),
            release_url: release.html_url.clone(),
        })
    }
}

/// Applies channel rules to a newest-first release list.
pub fn select_release<'a>(
    releases: &'a [Release],
    channel: UpdateChannel,
    project: &str,
) -> Result<&'a Release, UpdateError> {
    if releases.is_empty() {
        return Err(UpdateError::NoReleasesFound {
            project: project.to_string(),
        });
    }

    let mut published = releases.iter().filter(|r| !r.draft);
    let selected = if channel.includes_prereleases() {
        published.next().ok_or_else(|| UpdateError::NoBetaReleasesFound {
            project: project.to_string(),
            channel: channel.to_string(),
        })?
    } else {
        published.find(|r| !r.prerelease).ok_or_else(|| UpdateError::NoReleasesFound {
            project: project.to_string(),
        })?
    };

    if selected.tag_name.trim().is_empty() {
        return Err(UpdateError::EmptyTagName);
    }
    Ok(selected)
}
