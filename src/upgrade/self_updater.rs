use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{BINARY_NAME, DEFAULT_REPO_NAME, DEFAULT_REPO_OWNER};
use crate::core::UpdateError;
use crate::upgrade::alias::{AliasInstaller, AliasOutcome};
use crate::upgrade::cache::{UpdateCacheData, UpdateCheckCache};
use crate::upgrade::config::UpdateSettings;
use crate::upgrade::download::Downloader;
use crate::upgrade::extract::{ArchiveExtractor, find_binary, install_binary};
use crate::upgrade::release::{GitHubReleaseSource, ReleaseAsset, ReleaseResolver, ReleaseSource};
use crate::upgrade::verification::ChecksumVerifier;
use crate::upgrade::version_check::{CheckStatus, UpdateCheckResult, VersionChecker, is_newer};
use crate::utils::{Platform, devx_dir, ensure_dir, remove_file_if_exists};

/// Options for [`SelfUpdater::install`].
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install even when the cache or the release says there is nothing newer.
    pub force: bool,
    /// Create the short alias next to the executable.
    pub create_alias: bool,
    /// Overall budget for the whole install; exceeding it cancels the pipeline.
    pub deadline: Option<Duration>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            create_alias: true,
            deadline: None,
        }
    }
}

/// What [`SelfUpdater::install`] did.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Disabled,
    UpToDate(UpdateCheckResult),
    Installed(InstallReport),
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub previous_version: String,
    pub installed_version: String,
    pub executable: PathBuf,
    /// SHA-256 of the verified archive
    pub digest: String,
    pub bytes: u64,
    pub resumed: bool,
    pub alias: Option<AliasOutcome>,
    pub release_url: String,
}

/// Self-update pipeline for the devx binary.
///
/// `SelfUpdater` wires the stages together: release resolution, resumable
/// download, checksum verification, safe extraction, atomic replacement of the
/// executable, and the optional alias. Every collaborator is injected through
/// [`SelfUpdaterBuilder`], so tests can point it at a mock server, a temporary
/// install target and a manual clock.
///
/// # Examples
///
/// ## Check for Updates
/// ```rust,no_run
/// use devx::config::GlobalConfig;
/// use devx::upgrade::{SelfUpdater, UpdateSettings};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = GlobalConfig::load().await?;
/// let updater = SelfUpdater::from_environment(UpdateSettings::from_env(&config.update))?;
///
/// if let Some(result) = updater.check(&CancellationToken::new()).await? {
///     println!("{} -> {}", result.current_version, result.latest_version);
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Install the Latest Release
/// ```rust,no_run
/// use devx::upgrade::{InstallOptions, SelfUpdater, UpdateOutcome, UpdateSettings};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(updater: SelfUpdater) -> anyhow::Result<()> {
/// match updater.install(InstallOptions::default(), &CancellationToken::new()).await? {
///     UpdateOutcome::Installed(report) => println!("now on {}", report.installed_version),
///     UpdateOutcome::UpToDate(_) => println!("already up to date"),
///     UpdateOutcome::Disabled => println!("updates are disabled"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SelfUpdater {
    resolver: Arc<ReleaseResolver>,
    checker: Arc<VersionChecker>,
    cache: Arc<UpdateCheckCache>,
    settings: UpdateSettings,
    downloader: Downloader,
    verifier: ChecksumVerifier,
    extractor: ArchiveExtractor,
    platform: Platform,
    binary_name: String,
    install_target: PathBuf,
    download_dir: PathBuf,
}

/// Builder for [`SelfUpdater`].
pub struct SelfUpdaterBuilder {
    source: Arc<dyn ReleaseSource>,
    settings: UpdateSettings,
    state_dir: PathBuf,
    install_target: PathBuf,
    download_dir: Option<PathBuf>,
    cache: Option<Arc<UpdateCheckCache>>,
    client: Option<reqwest::Client>,
    platform: Option<Platform>,
    current_version: Option<String>,
    binary_name: Option<String>,
    extractor: Option<ArchiveExtractor>,
}

impl SelfUpdaterBuilder {
    /// Explicit download directory; defaults to `<state_dir>/downloads`.
    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Pre-built cache, e.g. one with an injected clock.
    #[must_use]
    pub fn cache(mut self, cache: Arc<UpdateCheckCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    #[must_use]
    pub fn current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn binary_name(mut self, name: impl Into<String>) -> Self {
        self.binary_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Fails if the download configuration is invalid.
    pub fn build(self) -> Result<SelfUpdater, UpdateError> {
        let client = self.client.unwrap_or_default();
        let platform = self.platform.unwrap_or_else(Platform::current);
        let binary_name = self.binary_name.unwrap_or_else(|| BINARY_NAME.to_string());
        let current_version =
            self.current_version.unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(UpdateCheckCache::new(&self.state_dir, self.settings.check_interval))
        });

        let resolver = Arc::new(ReleaseResolver::new(self.source, binary_name.clone()));
        let checker = Arc::new(
            VersionChecker::new(
                resolver.clone(),
                cache.clone(),
                self.settings.channel,
                current_version,
            )
            .disabled(self.settings.disabled),
        );

        Ok(SelfUpdater {
            downloader: Downloader::new(client.clone(), self.settings.download.clone())?,
            verifier: ChecksumVerifier::new(client),
            extractor: self.extractor.unwrap_or_default(),
            download_dir: self.download_dir.unwrap_or_else(|| self.state_dir.join("downloads")),
            resolver,
            checker,
            cache,
            settings: self.settings,
            platform,
            binary_name,
            install_target: self.install_target,
        })
    }
}

impl SelfUpdater {
    /// Start building an updater.
    ///
    /// `state_dir` holds the update cache (and downloads, unless overridden);
    /// `install_target` is the executable that gets replaced.
    pub fn builder(
        source: Arc<dyn ReleaseSource>,
        settings: UpdateSettings,
        state_dir: impl Into<PathBuf>,
        install_target: impl Into<PathBuf>,
    ) -> SelfUpdaterBuilder {
        SelfUpdaterBuilder {
            source,
            settings,
            state_dir: state_dir.into(),
            install_target: install_target.into(),
            download_dir: None,
            cache: None,
            client: None,
            platform: None,
            current_version: None,
            binary_name: None,
            extractor: None,
        }
    }

    /// Updater for the running executable, backed by GitHub releases and `~/.devx`.
    pub fn from_environment(settings: UpdateSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.download.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;
        let token = GitHubReleaseSource::token_from_env(|name| std::env::var(name).ok());
        let source = GitHubReleaseSource::new(client.clone(), DEFAULT_REPO_OWNER, DEFAULT_REPO_NAME)
            .with_token(token);

        let state_dir = devx_dir()?;
        let install_target =
            std::env::current_exe().context("Failed to locate the running executable")?;

        Ok(Self::builder(Arc::new(source), settings, state_dir, install_target)
            .client(client)
            .build()?)
    }

    pub fn current_version(&self) -> &str {
        self.checker.current_version()
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    pub fn install_target(&self) -> &Path {
        &self.install_target
    }

    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    pub fn checker(&self) -> Arc<VersionChecker> {
        self.checker.clone()
    }

    /// Cached-or-fresh update check. `None` when checks are disabled.
    pub async fn check(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<UpdateCheckResult>, UpdateError> {
        match self.checker.check(cancel).await? {
            CheckStatus::Disabled => Ok(None),
            CheckStatus::Checked(result) => Ok(Some(result)),
        }
    }

    /// Fresh cache record, without touching the network.
    pub fn status(&self) -> Option<UpdateCheckResult> {
        self.checker.cached()
    }

    pub fn clear_cache(&self) -> Result<(), UpdateError> {
        self.cache.clear()
    }

    /// Run the full pipeline and replace the executable if a newer release exists.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the pipeline with the stage's [`UpdateError`];
    /// the live executable is only touched by the final rename. Alias problems
    /// are reported in the [`InstallReport`] and never fail the install.
    pub async fn install(
        &self,
        options: InstallOptions,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, UpdateError> {
        let token = cancel.child_token();
        let timer = options.deadline.map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                debug!("Install deadline of {:?} reached", deadline);
                token.cancel();
            })
        });

        let result = self.run_install(&options, &token).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        result
    }

    async fn run_install(
        &self,
        options: &InstallOptions,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, UpdateError> {
        if self.settings.disabled {
            info!("Updates are disabled");
            return Ok(UpdateOutcome::Disabled);
        }

        if !options.force {
            if let Some(cached) = self.checker.cached().filter(|c| !c.update_available) {
                debug!("Cache says {} is current", cached.current_version);
                return Ok(UpdateOutcome::UpToDate(cached));
            }
        }

        let asset = self.resolver.resolve(self.settings.channel, &self.platform, cancel).await?;
        let newer = is_newer(&asset.version_tag, self.current_version());
        if !newer && !options.force {
            info!("Already on the latest version ({})", self.current_version());
            let stored = self.store_check(&asset, false)?;
            return Ok(UpdateOutcome::UpToDate(stored));
        }

        info!("Installing {} from {}", asset.version_tag, asset.download_url);
        let release_dir = self.download_dir.join(release_dir_name(&asset.version_tag));
        ensure_dir(&release_dir, 0o700).map_err(|e| UpdateError::Other {
            message: format!("{e:#}"),
        })?;
        self.prune_downloads(&release_dir);
        let archive = release_dir.join(&asset.asset_name);
        let download = self.downloader.download(&asset.download_url, &archive, cancel).await?;

        let manifest_url =
            asset.checksum_manifest_url.as_deref().ok_or_else(|| UpdateError::ManifestFetchFailed {
                url: asset.release_url.clone(),
                reason: format!("release {} has no checksum manifest", asset.version_tag),
            })?;
        let digest = self.verifier.verify_from_manifest(&archive, manifest_url, cancel).await?;

        self.unpack_and_replace(&archive, &release_dir).await?;

        let alias = match (&self.settings.alias, options.create_alias) {
            (Some(name), true) => {
                Some(AliasInstaller::new(name.as_str()).ensure(&self.install_target))
            }
            _ => None,
        };

        self.store_check(&asset, false)?;
        if let Err(e) = remove_file_if_exists(&archive) {
            warn!("Failed to remove downloaded archive {}: {}", archive.display(), e);
        }
        if let Err(e) = std::fs::remove_dir(&release_dir) {
            debug!("Keeping {}: {}", release_dir.display(), e);
        }

        info!("Updated {} -> {}", self.current_version(), asset.version_tag);
        Ok(UpdateOutcome::Installed(InstallReport {
            previous_version: self.current_version().to_string(),
            installed_version: asset.version_tag,
            executable: self.install_target.clone(),
            digest,
            bytes: download.bytes,
            resumed: download.resumed,
            alias,
            release_url: asset.release_url,
        }))
    }

    /// Drop partial downloads left behind by attempts at other releases.
    fn prune_downloads(&self, keep: &Path) {
        let Ok(entries) = std::fs::read_dir(&self.download_dir) else {
            return;
        };
        for path in entries.filter_map(Result::ok).map(|e| e.path()) {
            if path == keep {
                continue;
            }
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match removed {
                Ok(()) => debug!("Removed stale download {}", path.display()),
                Err(e) => warn!("Failed to remove stale download {}: {}", path.display(), e),
            }
        }
    }

    async fn unpack_and_replace(
        &self,
        archive: &Path,
        release_dir: &Path,
    ) -> Result<(), UpdateError> {
        let staging = tempfile::Builder::new().prefix("extract-").tempdir_in(release_dir)?;

        self.extractor.extract(archive, staging.path()).await?;

        let executable = self.platform.executable_name(&self.binary_name);
        let binary = find_binary(staging.path(), &executable).ok_or_else(|| {
            UpdateError::BinaryNotFound {
                binary: executable.clone(),
            }
        })?;

        install_binary(&binary, &self.install_target).await
    }

    fn store_check(
        &self,
        asset: &ReleaseAsset,
        update_available: bool,
    ) -> Result<UpdateCheckResult, UpdateError> {
        let stored = self.cache.store(UpdateCacheData {
            last_check: chrono::Utc::now(),
            current_version: self.current_version().to_string(),
            latest_version: asset.version_tag.clone(),
            update_available,
            release_notes: asset.release_notes.clone(),
            release_url: asset.release_url.clone(),
            check_interval: String::new(),
        })?;

        Ok(UpdateCheckResult {
            current_version: stored.current_version,
            latest_version: stored.latest_version,
            update_available: stored.update_available,
            release_notes: stored.release_notes,
            release_url: stored.release_url,
            checked_at: stored.last_check,
            from_cache: false,
            error: None,
        })
    }
}

/// Directory name for one release's downloads; partial files never carry over
/// between releases because asset names do not include the version.
fn release_dir_name(tag: &str) -> String {
    let name: String = tag
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        format!("release-{}", name.len())
    } else {
        name
    }
}
