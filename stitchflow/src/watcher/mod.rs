//! File stability watcher.
//!
//! Uploaded files are considered fully written once they exist and have a
//! non-zero size. The watcher probes a batch of paths in rounds until every
//! path passes, or gives up once its timeout has elapsed.

use crate::errors::StitchflowError;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default sleep between probe rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bound on the whole check.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Outcome of one stability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StabilityCheckResult {
    /// Every path exists and is non-empty.
    Ready {
        /// Probe rounds performed; 0 for an empty set.
        rounds: u32,
        /// Time spent polling.
        waited: Duration,
    },
    /// The timeout elapsed with at least one path still missing or empty.
    TimedOut {
        /// Paths that failed the last probe.
        pending: Vec<PathBuf>,
        /// Probe rounds performed.
        rounds: u32,
        /// Time spent polling.
        waited: Duration,
    },
}

impl StabilityCheckResult {
    /// Returns true for `Ready`.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Time spent polling.
    #[must_use]
    pub const fn waited(&self) -> Duration {
        match self {
            Self::Ready { waited, .. } | Self::TimedOut { waited, .. } => *waited,
        }
    }

    /// Converts `TimedOut` into [`StitchflowError::StabilityTimeout`].
    pub fn into_result(self) -> Result<(), StitchflowError> {
        match self {
            Self::Ready { .. } => Ok(()),
            Self::TimedOut {
                pending, waited, ..
            } => Err(StitchflowError::StabilityTimeout {
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                pending,
            }),
        }
    }
}

/// Polls file metadata until a batch of files is fully written.
#[derive(Debug, Clone, Copy)]
pub struct StabilityWatcher {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for StabilityWatcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StabilityWatcher {
    /// Creates a watcher with the given timeout and the default interval.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Sets the interval between probe rounds.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The configured interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits until every path exists with a non-zero size.
    ///
    /// An empty set is ready immediately. If the first round passes the
    /// watcher never sleeps. Otherwise it returns no later than
    /// `timeout + poll_interval` after it was called, plus the cost of
    /// the final probe.
    pub async fn wait_until_stable(&self, paths: &[PathBuf]) -> StabilityCheckResult {
        let start = Instant::now();
        if paths.is_empty() {
            return StabilityCheckResult::Ready {
                rounds: 0,
                waited: Duration::ZERO,
            };
        }

        let deadline = start + self.timeout;
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            let pending = pending_paths(paths).await;
            let now = Instant::now();

            if pending.is_empty() {
                debug!(rounds, files = paths.len(), "uploads stable");
                return StabilityCheckResult::Ready {
                    rounds,
                    waited: now - start,
                };
            }

            if now >= deadline {
                debug!(rounds, pending = pending.len(), "stability check timed out");
                return StabilityCheckResult::TimedOut {
                    pending,
                    rounds,
                    waited: now - start,
                };
            }

            trace!(round = rounds, pending = pending.len(), "files not yet written");
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Returns the paths that are missing, unreadable, or empty.
async fn pending_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let probes = join_all(paths.iter().map(|path| is_written(path))).await;
    paths
        .iter()
        .zip(probes)
        .filter(|(_, written)| !written)
        .map(|(path, _)| path.clone())
        .collect()
}

async fn is_written(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}
