//! Named mutual exclusion for serializing sibling mutations
//!
//! Some remote entities only tolerate one mutation at a time across all of
//! their children (e.g., a cluster that rejects concurrent application
//! changes). Callers serialize those mutations by locking on the shared
//! parent's name before issuing the request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of named asynchronous locks
///
/// Locks are created lazily on first use and never removed; the set of names
/// in play is bounded by the resources under management.
#[derive(Debug, Default)]
pub struct MutexKv {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guard for a named lock; the lock is released when the guard is dropped
#[derive(Debug)]
pub struct NamedGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl NamedGuard {
    /// The key this guard is holding
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl MutexKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another holder has it
    pub async fn lock(&self, key: &str) -> NamedGuard {
        let entry = {
            let mut entries = self.entries.lock().expect("lock registry poisoned");
            entries.entry(key.to_string()).or_default().clone()
        };

        log::debug!("acquiring named lock {:?}", key);
        NamedGuard {
            key: key.to_string(),
            _guard: entry.lock_owned().await,
        }
    }

    /// Acquire a lock scoped to a resource kind, e.g. one lock space per
    /// parent entity type
    pub async fn lock_scoped(&self, scope: &str, name: &str) -> NamedGuard {
        self.lock(&format!("{scope}/{name}")).await
    }
}
