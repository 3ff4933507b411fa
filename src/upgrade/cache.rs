//! On-disk record of the last update check.
//!
//! The record lives at `~/.devx/update-check.json` and lets repeated
//! invocations skip the network until the check interval has elapsed. Writes go
//! through a sibling `.tmp` file and a rename; the file is readable only by its
//! owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::UPDATE_CACHE_FILE;
use crate::core::UpdateError;
use crate::utils::{atomic_write, ensure_dir, remove_file_if_exists, tmp_path};

/// Source of "now" for cache freshness decisions.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Persisted result of an update check.
///
/// # Serialization
///
/// Serialized as pretty JSON. Unknown fields are ignored and missing string
/// fields default to empty, so records written by other versions still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCacheData {
    /// When the check ran; stamped by [`UpdateCheckCache::store`].
    pub last_check: DateTime<Utc>,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub release_url: String,
    /// Human-readable check interval in effect when stored, e.g. `12h`.
    #[serde(default)]
    pub check_interval: String,
}

/// File-backed update-check cache with a fixed time-to-live.
#[derive(Debug)]
pub struct UpdateCheckCache {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    lock: RwLock<()>,
}

impl UpdateCheckCache {
    /// Cache stored as `update-check.json` inside `dir`.
    pub fn new(dir: &Path, ttl: Duration) -> Self {
        Self::with_clock(dir, ttl, Arc::new(SystemClock))
    }

    /// Like [`UpdateCheckCache::new`] with an injected clock.
    ///
    /// A leftover `.tmp` file from an interrupted write is removed.
    pub fn with_clock(dir: &Path, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let path = dir.join(UPDATE_CACHE_FILE);
        match remove_file_if_exists(&tmp_path(&path)) {
            Ok(true) => debug!("Removed stale cache temp file"),
            Ok(false) => {}
            Err(e) => warn!("Could not remove stale cache temp file: {}", e),
        }

        Self {
            path,
            ttl,
            clock,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the record if it exists, parses, and is within the TTL.
    ///
    /// A record stamped in the future is treated as invalid.
    pub fn get(&self) -> Option<UpdateCacheData> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let data = self.read_record()?;

        let age = self.clock.now().signed_duration_since(data.last_check);
        let fresh = chrono::Duration::from_std(self.ttl)
            .is_ok_and(|ttl| age >= chrono::Duration::zero() && age <= ttl);
        if fresh {
            Some(data)
        } else {
            debug!("Update cache expired (age {}s)", age.num_seconds());
            None
        }
    }

    /// Stamp `data` with the current time and interval label and persist it.
    pub fn store(&self, mut data: UpdateCacheData) -> Result<UpdateCacheData, UpdateError> {
        data.last_check = self.clock.now();
        data.check_interval = humantime_serde::re::humantime::format_duration(self.ttl).to_string();

        let content = serde_json::to_vec_pretty(&data).map_err(|e| self.write_error(e))?;

        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(dir) = self.path.parent() {
            ensure_dir(dir, 0o700).map_err(|e| self.write_error(format!("{e:#}")))?;
        }
        atomic_write(&self.path, &content, 0o600).map_err(|e| self.write_error(format!("{e:#}")))?;

        debug!("Stored update check in {}", self.path.display());
        Ok(data)
    }

    /// Whether a fresh record is absent.
    pub fn is_expired(&self) -> bool {
        self.get().is_none()
    }

    /// Delete the record. Clearing a missing record succeeds.
    pub fn clear(&self) -> Result<(), UpdateError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        if remove_file_if_exists(&self.path)? {
            debug!("Cleared update cache");
        }
        Ok(())
    }

    fn read_record(&self) -> Option<UpdateCacheData> {
        let content = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&content) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("Ignoring unreadable update cache: {}", e);
                None
            }
        }
    }

    fn write_error(&self, reason: impl std::fmt::Display) -> UpdateError {
        UpdateError::CacheWrite {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
