//! Error handling for devx
//!
//! The update pipeline reports failures through one strongly-typed enum,
//! [`UpdateError`], grouped by the stage that produced them. The CLI layer works
//! with [`anyhow::Error`] and converts whatever reaches `main` into an
//! [`ErrorContext`] through [`user_friendly_error`], which attaches details and an
//! actionable suggestion for terminal display.
//!
//! # Error Categories
//!
//! - **Resolution**: [`UpdateError::NoReleasesFound`], [`UpdateError::NoBetaReleasesFound`],
//!   [`UpdateError::ReleaseApi`], [`UpdateError::RateLimited`], [`UpdateError::NoMatchingAsset`]
//! - **Download**: [`UpdateError::DownloadRejected`], [`UpdateError::DownloadRetriesExhausted`],
//!   [`UpdateError::Cancelled`]
//! - **Integrity**: [`UpdateError::ManifestFetchFailed`], [`UpdateError::ManifestEntryMissing`],
//!   [`UpdateError::ChecksumMismatch`]
//! - **Extraction and install**: [`UpdateError::ExtractionFailed`],
//!   [`UpdateError::BinaryNotFound`], [`UpdateError::InstallFailed`]
//! - **Cache**: [`UpdateError::CacheWrite`]
//!
//! None of these are fatal to the host process: a caller can always keep running the
//! currently installed version.
//!
//! # Examples
//!
//! ```rust,no_run
//! use devx::core::{UpdateError, user_friendly_error};
//!
//! let error = UpdateError::RateLimited {
//!     url: "https://api.github.com/repos/devx-tools/devx/releases".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The error type for every stage of the self-update pipeline.
///
/// Variants carry enough context (URLs, asset names, paths) to produce an
/// actionable message without access to the call site.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The release host returned no releases at all.
    #[error("No releases found for {project}")]
    NoReleasesFound {
        /// `owner/repo` identity that was queried
        project: String,
    },

    /// A prerelease-inclusive channel was requested but nothing selectable exists.
    #[error("No {channel} release found for {project}")]
    NoBetaReleasesFound {
        /// `owner/repo` identity that was queried
        project: String,
        /// The channel that was requested (`beta` or `edge`)
        channel: String,
    },

    /// The release host answered with an error or an unreadable body.
    #[error("Release API request to {url} failed: {reason}")]
    ReleaseApi {
        /// Endpoint that was called
        url: String,
        /// Status or transport failure description
        reason: String,
    },

    /// The release host rejected the request because of rate limiting.
    #[error("Release API rate limit exceeded for {url}")]
    RateLimited {
        /// Endpoint that was called
        url: String,
    },

    /// The selected release carries an empty tag.
    #[error("Selected release has an empty tag name")]
    EmptyTagName,

    /// The selected release has no archive for the running platform.
    #[error("Release {tag} has no asset matching '{pattern}'")]
    NoMatchingAsset {
        /// Tag of the selected release
        tag: String,
        /// Platform suffix that was searched for
        pattern: String,
    },

    /// The server answered a download with a client error (4xx).
    ///
    /// Retrying cannot help, so the partial file has already been removed.
    #[error("Download of {url} was rejected with HTTP {status}")]
    DownloadRejected {
        /// URL being downloaded
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Every attempt failed with a transient error.
    ///
    /// The partial file is kept so a later run can resume it.
    #[error("Download of {url} failed after {attempts} attempts: {last_error}")]
    DownloadRetriesExhausted {
        /// URL being downloaded
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Description of the final failure
        last_error: String,
    },

    /// The operation was aborted by a cancellation token or deadline.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// What was running when the signal fired
        operation: String,
    },

    /// A [`DownloadConfig`](crate::upgrade::DownloadConfig) violates its invariants.
    #[error("Invalid download configuration: {reason}")]
    InvalidDownloadConfig {
        /// Which invariant was violated
        reason: String,
    },

    /// The checksum manifest could not be fetched or read.
    #[error("Failed to fetch checksum manifest from {url}: {reason}")]
    ManifestFetchFailed {
        /// Manifest URL (empty when the release has none)
        url: String,
        /// Failure description
        reason: String,
    },

    /// The manifest has no line for the downloaded archive.
    #[error("Checksum manifest has no entry for {asset}")]
    ManifestEntryMissing {
        /// Archive file name that was looked up
        asset: String,
    },

    /// The downloaded archive does not hash to the published digest.
    #[error("Checksum mismatch for {asset}")]
    ChecksumMismatch {
        /// Archive file name
        asset: String,
        /// Digest published in the manifest
        expected: String,
        /// Digest computed locally
        actual: String,
    },

    /// The archive stream could not be read or the destination could not be prepared.
    #[error("Failed to extract {archive}: {reason}")]
    ExtractionFailed {
        /// Archive path
        archive: String,
        /// Failure description
        reason: String,
    },

    /// The archive unpacked cleanly but does not contain the executable.
    #[error("Binary '{binary}' not found in release archive")]
    BinaryNotFound {
        /// Executable name that was expected
        binary: String,
    },

    /// The new executable could not be moved into place.
    #[error("Failed to install new binary at {path}: {reason}")]
    InstallFailed {
        /// Target executable path
        path: String,
        /// Failure description
        reason: String,
    },

    /// The update-check cache could not be persisted.
    #[error("Failed to write update-check cache {path}: {reason}")]
    CacheWrite {
        /// Cache file path
        path: String,
        /// Failure description
        reason: String,
    },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration in {file}: {reason}")]
    ConfigError {
        /// Config file path
        file: String,
        /// Parse failure description
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl UpdateError {
    /// Shorthand for [`UpdateError::Cancelled`].
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether this error came from a cancellation signal rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl Clone for UpdateError {
    fn clone(&self) -> Self {
        match self {
            Self::NoReleasesFound {
                project,
            } => Self::NoReleasesFound {
                project: project.clone(),
            },
            Self::NoBetaReleasesFound {
                project,
                channel,
            } => Self::NoBetaReleasesFound {
                project: project.clone(),
                channel: channel.clone(),
            },
            Self::ReleaseApi {
                url,
                reason,
            } => Self::ReleaseApi {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::RateLimited {
                url,
            } => Self::RateLimited {
                url: url.clone(),
            },
            Self::EmptyTagName => Self::EmptyTagName,
            Self::NoMatchingAsset {
                tag,
                pattern,
            } => Self::NoMatchingAsset {
                tag: tag.clone(),
                pattern: pattern.clone(),
            },
            Self::DownloadRejected {
                url,
                status,
            } => Self::DownloadRejected {
                url: url.clone(),
                status: *status,
            },
            Self::DownloadRetriesExhausted {
                url,
                attempts,
                last_error,
            } => Self::DownloadRetriesExhausted {
                url: url.clone(),
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            Self::Cancelled {
                operation,
            } => Self::Cancelled {
                operation: operation.clone(),
            },
            Self::InvalidDownloadConfig {
                reason,
            } => Self::InvalidDownloadConfig {
                reason: reason.clone(),
            },
            Self::ManifestFetchFailed {
                url,
                reason,
            } => Self::ManifestFetchFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::ManifestEntryMissing {
                asset,
            } => Self::ManifestEntryMissing {
                asset: asset.clone(),
            },
            Self::ChecksumMismatch {
                asset,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                asset: asset.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::ExtractionFailed {
                archive,
                reason,
            } => Self::ExtractionFailed {
                archive: archive.clone(),
                reason: reason.clone(),
            },
            Self::BinaryNotFound {
                binary,
            } => Self::BinaryNotFound {
                binary: binary.clone(),
            },
            Self::InstallFailed {
                path,
                reason,
            } => Self::InstallFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::CacheWrite {
                path,
                reason,
            } => Self::CacheWrite {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                file,
                reason,
            } => Self::ConfigError {
                file: file.clone(),
                reason: reason.clone(),
            },
            // io::Error is not Clone; keep kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// Details are rendered in yellow and suggestions in green by [`ErrorContext::display`].
///
/// ```rust,no_run
/// use devx::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::EmptyTagName)
///     .with_suggestion("Try again later")
///     .with_details("The release host returned a malformed release");
///
/// println!("{}", context);
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`UpdateError`] anywhere in the chain, [`std::io::Error`] kinds that
/// users commonly hit during installation, and TOML parse errors from the config
/// file. Anything else is rendered with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()) {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdateError::InstallFailed {
                    path: "unknown".to_string(),
                    reason: io_error.to_string(),
                })
                .with_suggestion(
                    "Re-run with write access to the install directory, \
                     or reinstall devx into a user-writable location",
                )
                .with_details(
                    "devx replaces its own executable and needs write access to its directory",
                );
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdateError::Other {
                    message: io_error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::ConfigError {
            file: "config.toml".to_string(),
            reason: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of ~/.devx/config.toml");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::Other {
        message,
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::RateLimited { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Set GITHUB_TOKEN (or DEVX_GITHUB_TOKEN) to raise the limit, or try again later",
            )
            .with_details("Unauthenticated GitHub API access is limited to 60 requests per hour"),

        UpdateError::ReleaseApi { .. } => ErrorContext::new(error)
            .with_suggestion("Check your internet connection and try again"),

        UpdateError::NoBetaReleasesFound { .. } => ErrorContext::new(error)
            .with_suggestion("Switch to the stable channel with DEVX_UPDATE_CHANNEL=stable"),

        UpdateError::NoMatchingAsset { pattern, .. } => {
            let details = format!(
                "Release archives are named <project>_<os>_<arch>.tar.gz; none ends in {pattern}"
            );
            ErrorContext::new(error)
                .with_suggestion(
                    "This release may have no prebuilt binary for your platform; build from source",
                )
                .with_details(details)
        }

        UpdateError::DownloadRetriesExhausted { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Run the update again later; the partial download is kept and will be resumed",
            )
            .with_details("The server kept failing with transient errors"),

        UpdateError::DownloadRejected { status, .. } => {
            let details =
                format!("The server answered HTTP {status}, which will not succeed on retry");
            ErrorContext::new(error)
                .with_suggestion("The release asset may have been removed; check the release page")
                .with_details(details)
        }

        UpdateError::ChecksumMismatch { expected, actual, .. } => {
            let details = format!(
                "Expected {expected}, computed {actual}. The downloaded file has been deleted"
            );
            ErrorContext::new(error)
                .with_suggestion(
                    "Retry the update; if this persists, the archive may have been tampered with",
                )
                .with_details(details)
        }

        UpdateError::ManifestFetchFailed { .. } | UpdateError::ManifestEntryMissing { .. } => {
            ErrorContext::new(error)
                .with_suggestion("Retry later; devx refuses to install an archive it cannot verify")
        }

        UpdateError::InstallFailed { .. } => ErrorContext::new(error)
            .with_suggestion(if cfg!(windows) {
                "Close other running devx processes, or run as Administrator"
            } else {
                "Check write permissions on the install directory"
            }),

        UpdateError::CacheWrite { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Check permissions on ~/.devx, or set DEVX_DISABLE_UPDATE_CHECK=1 to skip checks",
            ),

        _ => ErrorContext::new(error),
    }
}
