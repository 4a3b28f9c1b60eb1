//! Serialization of stitcher runs that share an output directory.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per output directory.
///
/// The stitcher writes fixed filenames, so two runs targeting the same
/// directory would overwrite each other's images. Holding the guard from
/// [`OutputLocks::acquire`] across the run and the artifact read keeps at
/// most one run in flight per directory.
#[derive(Debug, Default)]
pub struct OutputLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl OutputLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of `dir`.
    pub async fn acquire(&self, dir: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of directories seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no directory was ever locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
