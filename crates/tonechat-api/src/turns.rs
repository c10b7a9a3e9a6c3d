use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// One async mutex per key, created on first use and dropped again once
/// nobody holds or waits on it.
pub(crate) struct KeyedTurns<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedTurns<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash> KeyedTurns<K> {
    pub(crate) async fn acquire(&self, key: K) -> Turn<'_, K> {
        // Clones happen only under the map lock, so the strong count seen in
        // `Turn::drop` includes every waiter
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();

        Turn {
            key,
            turns: self,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one turn.
pub(crate) struct Turn<'a, K: Copy + Eq + Hash> {
    key: K,
    turns: &'a KeyedTurns<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Copy + Eq + Hash> Drop for Turn<'_, K> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else { return };
        let mut locks = self.turns.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);
        // Only the map and `lock` left: no holder, no waiter
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
