use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by `K`, created on first use
///
/// An entry lives only while some caller holds or waits on it. Releasing the last
/// guard removes the key, so the map stays as small as the set of busy keys.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyedGuard {
            locks: &self.locks,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        // release first so the map holds the only remaining reference when idle
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
