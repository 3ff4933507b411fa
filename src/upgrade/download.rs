//! Resilient HTTP downloads with bounded retry, backoff, resume and cancellation.
//!
//! Bytes are streamed into a sibling `<dest>.tmp` file which is renamed onto
//! `<dest>` only after the transfer is complete, so `dest` either holds the full
//! artifact or nothing.
//!
//! # Retry classification
//!
//! | Outcome | Retried | Partial file |
//! |---|---|---|
//! | HTTP 4xx | no, and no backoff sleep | removed |
//! | 5xx, transport error, attempt timeout, short body | up to `max_retries` | kept for resume |
//! | cancellation | no | kept for resume |
//!
//! Backoff before retry *n* is `min(max_delay, initial_delay * backoff_multiplier^(n-1))`,
//! fed to `tokio-retry` as a finite delay schedule.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::utils::{remove_file_if_exists, tmp_path};

/// Tunables for [`Downloader`].
///
/// Durations accept humantime strings (`"500ms"`, `"30s"`) when read from the
/// `[update.download]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Budget for one attempt, independent of the overall retry budget.
    #[serde(with = "humantime_serde")]
    pub per_attempt_timeout: Duration,
    pub enable_resume: bool,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            per_attempt_timeout: Duration::from_secs(60),
            enable_resume: true,
            user_agent: format!("devx-downloader/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DownloadConfig {
    /// Checks `max_delay >= initial_delay` and `backoff_multiplier > 1`.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.max_delay < self.initial_delay {
            return Err(UpdateError::InvalidDownloadConfig {
                reason: format!(
                    "max_delay ({:?}) is shorter than initial_delay ({:?})",
                    self.max_delay, self.initial_delay
                ),
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 1.0) {
            return Err(UpdateError::InvalidDownloadConfig {
                reason: format!("backoff_multiplier must be > 1, got {}", self.backoff_multiplier),
            });
        }
        if self.per_attempt_timeout.is_zero() {
            return Err(UpdateError::InvalidDownloadConfig {
                reason: "per_attempt_timeout must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Delay slept before retry `n` (1-based).
    #[must_use]
    pub fn delay_for_retry(&self, n: u32) -> Duration {
        let exponent = i32::try_from(n.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// The full finite schedule of backoff delays, one per retry.
    pub fn backoff_schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|n| self.delay_for_retry(n))
    }
}

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Final size of the destination file
    pub bytes: u64,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Whether the successful attempt continued an existing partial file
    pub resumed: bool,
}

#[derive(Debug)]
enum AttemptError {
    /// 4xx: the server will not change its mind
    Rejected { status: u16 },
    /// 5xx, transport failure, timeout, short body
    Transient(String),
    /// Local filesystem failure
    Local(std::io::Error),
}

impl AttemptError {
    const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Streams URLs to disk according to a [`DownloadConfig`].
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Fails with [`UpdateError::InvalidDownloadConfig`] if `config` is inconsistent.
    pub fn new(client: reqwest::Client, config: DownloadConfig) -> Result<Self, UpdateError> {
        config.validate()?;
        Ok(Self {
            client,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `url` to `dest`.
    ///
    /// An existing `<dest>.tmp` from an earlier run is resumed when resume is
    /// enabled. Cancelling `cancel` aborts the in-flight request or the pending
    /// backoff sleep and yields [`UpdateError::Cancelled`].
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, UpdateError> {
        let partial = tmp_path(dest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if !self.config.enable_resume {
            remove_file_if_exists(&partial)?;
        }

        let attempts = AtomicU32::new(0);
        let resumed = AtomicBool::new(false);
        let (attempts_ref, resumed_ref, partial_ref) = (&attempts, &resumed, &partial);

        let retry = RetryIf::spawn(
            self.config.backoff_schedule(),
            move || {
                let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
                self.attempt(url, partial_ref, attempt, resumed_ref)
            },
            |error: &AttemptError| {
                let retry = error.is_retryable();
                if retry {
                    warn!("Download attempt for {} failed: {:?}", url, error);
                }
                retry
            },
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Download of {} cancelled; partial file kept at {}", url, partial.display());
                return Err(UpdateError::cancelled(format!("Download of {url}")));
            }
            outcome = retry => outcome,
        };

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(bytes) => {
                fs::rename(&partial, dest).await?;
                debug!("Downloaded {} ({} bytes, {} attempts)", url, bytes, attempts);
                Ok(DownloadReport {
                    bytes,
                    attempts,
                    resumed: resumed.load(Ordering::SeqCst),
                })
            }
            Err(AttemptError::Rejected {
                status,
            }) => {
                remove_file_if_exists(&partial)?;
                Err(UpdateError::DownloadRejected {
                    url: url.to_string(),
                    status,
                })
            }
            Err(AttemptError::Transient(last_error)) => Err(UpdateError::DownloadRetriesExhausted {
                url: url.to_string(),
                attempts,
                last_error,
            }),
            Err(AttemptError::Local(e)) => Err(UpdateError::IoError(e)),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        partial: &Path,
        attempt: u32,
        resumed: &AtomicBool,
    ) -> Result<u64, AttemptError> {
        debug!("Download attempt {} for {}", attempt, url);
        let transfer = self.transfer(url, partial, resumed);
        match tokio::time::timeout(self.config.per_attempt_timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Transient(format!(
                "attempt timed out after {:?}",
                self.config.per_attempt_timeout
            ))),
        }
    }

    async fn transfer(
        &self,
        url: &str,
        partial: &Path,
        resumed: &AtomicBool,
    ) -> Result<u64, AttemptError> {
        let offset = if self.config.enable_resume {
            fs::metadata(partial).await.map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        let mut request = self.client.get(url).header(USER_AGENT, &self.config.user_agent);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let mut response =
            request.send().await.map_err(|e| AttemptError::Transient(e.to_string()))?;
        let status = response.status();

        let (append, expected_len) = match status {
            StatusCode::PARTIAL_CONTENT if offset > 0 => {
                match parse_content_range(response.headers()) {
                    Some((start, total)) if start == offset => {
                        let expected =
                            total.or_else(|| response.content_length().map(|len| offset + len));
                        (true, expected)
                    }
                    _ => {
                        discard_partial(partial).await?;
                        return Err(AttemptError::Transient(
                            "server answered with an unexpected Content-Range".to_string(),
                        ));
                    }
                }
            }
            StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
                // partial file does not fit the remote resource; start over
                discard_partial(partial).await?;
                return Err(AttemptError::Transient(format!(
                    "range bytes={offset}- not satisfiable"
                )));
            }
            s if s.is_success() => {
                if offset > 0 {
                    debug!("Server ignored range request for {}; restarting from zero", url);
                }
                (false, response.content_length())
            }
            s if s.is_client_error() => {
                return Err(AttemptError::Rejected {
                    status: s.as_u16(),
                });
            }
            s => return Err(AttemptError::Transient(format!("HTTP {s}"))),
        };

        let opened = if append {
            fs::OpenOptions::new().append(true).open(partial).await
        } else {
            fs::OpenOptions::new().create(true).write(true).truncate(true).open(partial).await
        };
        let mut file = opened.map_err(AttemptError::Local)?;

        let mut size = if append { offset } else { 0 };
        while let Some(chunk) =
            response.chunk().await.map_err(|e| AttemptError::Transient(e.to_string()))?
        {
            file.write_all(&chunk).await.map_err(AttemptError::Local)?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(AttemptError::Local)?;
        file.sync_all().await.map_err(AttemptError::Local)?;
        drop(file);

        if let Some(expected) = expected_len {
            if size > expected {
                discard_partial(partial).await?;
                return Err(AttemptError::Transient(format!(
                    "received {size} bytes but server announced {expected}"
                )));
            }
            if size < expected {
                return Err(AttemptError::Transient(format!(
                    "connection closed after {size} of {expected} bytes"
                )));
            }
        }

        resumed.store(append, Ordering::SeqCst);
        Ok(size)
    }
}

async fn discard_partial(partial: &Path) -> Result<(), AttemptError> {
    match fs::remove_file(partial).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AttemptError::Local(e)),
    }
}

/// Parses `Content-Range: bytes <start>-<end>/<total|*>` into `(start, total)`.
fn parse_content_range(headers: &HeaderMap) -> Option<(u64, Option<u64>)> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes ")?;
    let (span, total) = range.split_once('/')?;
    let (start, _end) = span.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}
