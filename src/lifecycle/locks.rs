//! Per-Volume Exclusive Sections
//!
//! Lifecycle-mutating operations on the same volume id run one at a time;
//! operations on distinct ids proceed concurrently.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Guard held for the duration of a per-volume exclusive section.
///
/// Dropping it releases the mutex and removes the table entry once no
/// other task holds or waits on it.
pub struct VolumeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    locks: Arc<LockMap>,
}

impl Drop for VolumeGuard {
    fn drop(&mut self) {
        // Release first so our own clone no longer counts
        self.guard.take();
        prune(&self.locks, &self.id);
    }
}

/// Table of lazily created per-id async mutexes
#[derive(Default)]
pub struct LockTable {
    locks: Arc<LockMap>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the exclusive section for `id`, waiting for any current holder
    pub async fn lock(&self, id: &str) -> VolumeGuard {
        let lock = self.locks.entry(id.to_string()).or_default().clone();
        VolumeGuard {
            guard: Some(lock.lock_owned().await),
            id: id.to_string(),
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Drop the mutex for `id` if nobody holds or waits on it
fn prune(locks: &LockMap, id: &str) {
    locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
}
