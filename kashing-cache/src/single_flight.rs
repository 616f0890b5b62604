//! Per-key recompute exclusion for [`RecomputeMode::SingleFlight`].
//!
//! [`RecomputeMode::SingleFlight`]: crate::RecomputeMode::SingleFlight

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use tracing::warn;

use crate::lock::mutex_lock;

const SOURCE: &str = "cache::single_flight";

/// Set of keys currently being recomputed.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until no other caller holds `key`, then hold it until the
    /// returned guard drops.
    pub(crate) fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mut busy = mutex_lock(&self.busy, SOURCE, "acquire");
        while busy.contains(key) {
            busy = self.released.wait(busy).unwrap_or_else(|poisoned| {
                warn!(
                    op = "acquire",
                    target_module = SOURCE,
                    lock_kind = "condvar.wait",
                    "Recovered from poisoned cache lock"
                );
                poisoned.into_inner()
            });
        }
        busy.insert(key.to_string());
        KeyGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    pub(crate) fn is_held(&self, key: &str) -> bool {
        mutex_lock(&self.busy, SOURCE, "is_held").contains(key)
    }
}

/// Holds one key of a [`KeyLocks`] set; releases it on drop.
pub(crate) struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        mutex_lock(&self.locks.busy, SOURCE, "release").remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.acquire("Ship_1_speed");
            assert!(locks.is_held("Ship_1_speed"));
            assert!(!locks.is_held("Ship_2_speed"));
        }
        assert!(!locks.is_held("Ship_1_speed"));
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire("Ship_1_speed");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
