//! Per-cluster exclusion of concurrent backups.

use crate::utils::{Result, SidecarError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Advisory locks keyed by cluster name
#[derive(Clone, Default)]
pub struct ClusterLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Held for the whole start-to-stop window of one backup.
///
/// Dropping the last guard of a cluster removes its entry from the map.
pub struct ClusterGuard {
    cluster: String,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ClusterGuard {
    pub fn cluster(&self) -> &str {
        &self.cluster
    }
}

impl Drop for ClusterGuard {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        if let Some(guard) = self.guard.take() {
            // map entry + this guard: nobody else is waiting on the lock
            if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) == 2 {
                locks.remove(&self.cluster);
            }
        }
    }
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock of `cluster`, failing if a backup already holds it.
    pub fn try_acquire(&self, cluster: &str) -> Result<ClusterGuard> {
        let lock = lock_map(&self.locks)
            .entry(cluster.to_string())
            .or_default()
            .clone();

        let guard = lock
            .try_lock_owned()
            .map_err(|_| SidecarError::BackupInProgress(cluster.to_string()))?;

        Ok(ClusterGuard {
            cluster: cluster.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        })
    }

    /// Whether a backup currently holds the lock of `cluster`
    pub fn is_locked(&self, cluster: &str) -> bool {
        lock_map(&self.locks)
            .get(cluster)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of clusters with a lock entry
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}
