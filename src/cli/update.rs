//! `devx update` subcommands.
//!
//! # Examples
//!
//! ```bash
//! devx update check                  # Check for a newer release (cached)
//! devx update install                # Install the newest release for the channel
//! devx update install --force        # Reinstall even if already current
//! devx update install --no-alias     # Skip creating the `dx` alias
//! devx update status                 # Show the last cached check
//! devx update clear-cache            # Forget the last check
//! ```

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use humantime_serde::re::humantime;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::GlobalConfig;
use crate::upgrade::alias::AliasOutcome;
use crate::upgrade::{
    InstallOptions, SelfUpdater, UpdateChannel, UpdateCheckResult, UpdateOutcome, UpdateSettings,
    VersionChecker,
};
use crate::utils::progress::spinner;

#[derive(Args, Debug)]
pub struct UpdateCommand {
    #[command(subcommand)]
    pub action: UpdateAction,

    /// Release channel for this invocation (stable, beta, edge).
    ///
    /// Overrides `DEVX_UPDATE_CHANNEL` and `update.channel` from the config file.
    #[arg(long, global = true, value_name = "CHANNEL")]
    pub channel: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum UpdateAction {
    /// Check whether a newer release is available.
    Check,

    /// Download, verify and install the newest release.
    Install {
        /// Install even if the current version is already the newest.
        #[arg(long)]
        force: bool,

        /// Do not create the short command alias.
        #[arg(long)]
        no_alias: bool,

        /// Abort the install if it takes longer than this (e.g. `5m`).
        #[arg(long, value_name = "DURATION", value_parser = parse_deadline)]
        timeout: Option<Duration>,
    },

    /// Show the cached result of the last check without network access.
    Status,

    /// Remove the cached update check.
    ClearCache,
}

fn parse_deadline(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl UpdateCommand {
    /// Runs the subcommand. `show_progress` is false under `--quiet`.
    pub async fn execute(self, show_progress: bool) -> Result<()> {
        let config = GlobalConfig::load().await.context("Failed to load devx configuration")?;
        let mut settings = UpdateSettings::from_env(&config.update);
        if let Some(channel) = self.channel.as_deref() {
            settings.channel = UpdateChannel::parse_lenient(channel);
        }
        debug!("Update settings: {:?}", settings);

        let updater = SelfUpdater::from_environment(settings)?;
        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = match self.action {
            UpdateAction::Check => check(&updater, &cancel, show_progress).await,
            UpdateAction::Install {
                force,
                no_alias,
                timeout,
            } => {
                let options = InstallOptions {
                    force,
                    create_alias: !no_alias,
                    deadline: timeout,
                };
                install(&updater, options, &cancel, show_progress).await
            }
            UpdateAction::Status => {
                status(&updater);
                Ok(())
            }
            UpdateAction::ClearCache => clear_cache(&updater),
        };

        ctrl_c.abort();
        result
    }
}

async fn check(
    updater: &SelfUpdater,
    cancel: &CancellationToken,
    show_progress: bool,
) -> Result<()> {
    let progress = spinner("Checking for updates...", show_progress);
    let result = updater.check(cancel).await;
    progress.finish_and_clear();

    match result.context("Failed to check for updates")? {
        None => print_disabled(),
        Some(result) if result.update_available => {
            VersionChecker::display_update_notification(&result);
            print_notes(&result);
        }
        Some(result) => {
            println!(
                "{}",
                format!("You are on the latest version ({})", result.current_version).green()
            );
        }
    }
    Ok(())
}

async fn install(
    updater: &SelfUpdater,
    options: InstallOptions,
    cancel: &CancellationToken,
    show_progress: bool,
) -> Result<()> {
    let progress = spinner("Installing latest release...", show_progress);
    let outcome = updater.install(options, cancel).await;
    progress.finish_and_clear();

    match outcome.context("Update failed")? {
        UpdateOutcome::Disabled => print_disabled(),
        UpdateOutcome::UpToDate(result) => {
            println!(
                "{}",
                format!("Already on the latest version ({})", result.current_version).green()
            );
        }
        UpdateOutcome::Installed(report) => {
            println!(
                "{}",
                format!("Updated devx {} -> {}", report.previous_version, report.installed_version)
                    .green()
                    .bold()
            );
            println!("  Executable: {}", report.executable.display());
            println!("  SHA-256:    {}", report.digest.dimmed());
            if report.resumed {
                println!("  {}", "Download resumed from a previous attempt".dimmed());
            }
            match report.alias {
                Some(AliasOutcome::Created(path)) => println!("  Alias:      {}", path.display()),
                Some(AliasOutcome::Failed(reason)) => {
                    eprintln!("{} alias not created: {}", "warning:".yellow(), reason);
                }
                Some(AliasOutcome::AlreadyPresent(_)) | None => {}
            }
        }
    }
    Ok(())
}

fn status(updater: &SelfUpdater) {
    let settings = updater.settings();
    println!("Channel:         {}", settings.channel);
    println!("Check interval:  {}", settings.check_interval_label());
    println!("Checks enabled:  {}", if settings.disabled { "no" } else { "yes" });
    println!("Cache file:      {}", updater.cache_path().display());
    println!();

    match updater.status() {
        Some(result) => {
            println!(
                "{}",
                VersionChecker::format_version_info(
                    updater.current_version(),
                    Some(result.latest_version.as_str())
                )
            );
            println!("Last checked:    {}", result.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            println!("Current version: {}", updater.current_version());
            println!("{}", "No recent update check; run `devx update check`".dimmed());
        }
    }
}

fn clear_cache(updater: &SelfUpdater) -> Result<()> {
    updater.clear_cache().context("Failed to clear the update cache")?;
    println!("{}", "Update cache cleared".green());
    Ok(())
}

fn print_disabled() {
    println!(
        "{}",
        "Update checks are disabled (DEVX_DISABLE_UPDATE_CHECK, CI or config)".yellow()
    );
}

fn print_notes(result: &UpdateCheckResult) {
    if result.release_notes.is_empty() {
        return;
    }
    println!();
    for line in result.release_notes.lines().take(20) {
        println!("  {}", line.dimmed());
    }
    println!();
}
