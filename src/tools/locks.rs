//! Per-(tool, host mount) serialization
//!
//! Some tools keep a database in their mounted config directory and corrupt
//! it when two runs share it. Profiles flagged `exclusive_mounts` take one
//! lock per host mount path before running.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockKey = (String, PathBuf);

/// Registry of mount locks, shared by every invocation of one runtime
#[derive(Debug, Default)]
pub struct MountLocks {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct MountGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl MountGuard {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl MountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every host path for `tool`
    ///
    /// Paths are locked in sorted order, so two invocations sharing several
    /// mounts cannot deadlock.
    pub async fn acquire<'a, I>(&self, tool: &str, host_paths: I) -> MountGuard
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let ordered: BTreeSet<&Path> = host_paths.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());

        for path in ordered {
            let lock = self.lock_for(tool, path);
            debug!(tool, path = %path.display(), "Waiting for mount lock");
            guards.push(lock.lock_owned().await);
        }

        MountGuard { guards }
    }

    fn lock_for(&self, tool: &str, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((tool.to_string(), path.to_path_buf()))
            .or_default()
            .clone()
    }

    /// Number of distinct (tool, path) locks created so far
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
