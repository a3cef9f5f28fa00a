//! Heartbeat-based worktree locking (§4.3.1): one lock file per worktree
//! holding `{pid, host, heartbeat_timestamp}`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stale threshold (§4.3.1 step 2, P7): a lock whose heartbeat is older than
/// this is considered abandoned and may be stolen.
pub const STALE_AFTER: Duration = Duration::from_secs(120);
/// Heartbeat rewrite interval while a worker holds the lock.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub pid: u32,
    pub host: String,
    pub heartbeat_timestamp: DateTime<Utc>,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            pid: std::process::id(),
            host: hostname(),
            heartbeat_timestamp: Utc::now(),
        }
    }

    pub fn age(&self) -> ChronoDuration {
        Utc::now() - self.heartbeat_timestamp
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > ChronoDuration::from_std(threshold).unwrap_or(ChronoDuration::zero())
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// A held (or about-to-be-acquired) lock over a single worktree.
pub struct WorktreeLock {
    path: PathBuf,
}

pub enum Acquisition {
    Acquired(WorktreeLock),
    /// Lock was live (heartbeat not stale); caller should not steal it.
    Contended,
    /// Lock was stale and has been stolen; the previous owner's spec should
    /// be reported failed with reason "stale process" by the caller.
    Stolen(WorktreeLock),
}

impl WorktreeLock {
    pub fn lock_path(worktree_path: &Path) -> PathBuf {
        worktree_path.join(".weft-lock.json")
    }

    /// Attempt to acquire the lock for `worktree_path` (§4.3.1 steps 1-3).
    pub fn acquire(worktree_path: &Path) -> Result<Acquisition> {
        let path = Self::lock_path(worktree_path);

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read lock file {}", path.display()))?;
            let existing: Heartbeat = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse lock file {}", path.display()))?;

            if !existing.is_stale(STALE_AFTER) {
                return Ok(Acquisition::Contended);
            }

            Self::write(&path, &Heartbeat::now())?;
            return Ok(Acquisition::Stolen(WorktreeLock { path }));
        }

        Self::write(&path, &Heartbeat::now())?;
        Ok(Acquisition::Acquired(WorktreeLock { path }))
    }

    pub fn heartbeat(&self) -> Result<()> {
        Self::write(&self.path, &Heartbeat::now())
    }

    pub fn release(self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove lock file {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn read(worktree_path: &Path) -> Result<Option<Heartbeat>> {
        let path = Self::lock_path(worktree_path);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(path: &Path, heartbeat: &Heartbeat) -> Result<()> {
        let serialized = serde_json::to_string_pretty(heartbeat)?;
        std::fs::write(path, serialized)
            .with_context(|| format!("failed to write lock file {}", path.display()))?;
        Ok(())
    }
}

/// Whether a lock at `worktree_path` is currently stale, without acquiring
/// it. Used by resume (§4.1.4) to decide whether a `running` spec's lock
/// should be treated as abandoned.
pub fn is_stale(worktree_path: &Path) -> Result<bool> {
    match WorktreeLock::read(worktree_path)? {
        Some(hb) => Ok(hb.is_stale(STALE_AFTER)),
        None => bail!("no lock file present at {}", worktree_path.display()),
    }
}
