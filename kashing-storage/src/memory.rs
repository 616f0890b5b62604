//! In-memory key-value backend.
//!
//! Expiry is tracked against a monotonic clock that tests can push forward
//! with [`InMemoryBackend::advance_clock`] instead of sleeping.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use kashing_core::{BackendError, KashingResult};

use crate::KvBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    /// `now` is `None` once the test clock has run past the last
    /// representable instant; every expiring entry is dead by then.
    fn is_live(&self, now: Option<Instant>) -> bool {
        match (self.expires_at, now) {
            (None, _) => true,
            (Some(at), Some(now)) => now < at,
            (Some(_), None) => false,
        }
    }
}

/// In-memory backend for testing and single-process use.
#[derive(Debug)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    clock_offset: RwLock<Duration>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock_offset: RwLock::new(Duration::ZERO),
        }
    }

    fn now(&self) -> Option<Instant> {
        let offset = self
            .clock_offset
            .read()
            .map(|offset| *offset)
            .unwrap_or(Duration::ZERO);
        Instant::now().checked_add(offset)
    }

    /// Move the backend's clock forward, expiring entries whose TTL elapsed.
    pub fn advance_clock(&self, by: Duration) {
        if let Ok(mut offset) = self.clock_offset.write() {
            *offset = offset.saturating_add(by);
        }
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = self.now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, entry)| entry.is_live(now))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Remaining time to live of `key`, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.now();
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;
        entry
            .expires_at
            .map(|at| now.map_or(Duration::ZERO, |now| at.saturating_duration_since(now)))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &str) -> KashingResult<Option<String>> {
        let now = self.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> KashingResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> KashingResult<bool> {
        let now = self.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries
            .remove(key)
            .map_or(false, |entry| entry.is_live(now)))
    }

    fn expire(&self, key: &str, ttl: Duration) -> KashingResult<bool> {
        let now = self.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;

        let live = entries.get(key).map_or(false, |entry| entry.is_live(now));
        if !live {
            entries.remove(key);
            return Ok(false);
        }

        if ttl.is_zero() {
            entries.remove(key);
        } else if let Some(entry) = entries.get_mut(key) {
            // A deadline past the last representable instant never arrives.
            entry.expires_at = now.and_then(|now| now.checked_add(ttl));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_returns_none() {
        let backend = InMemoryBackend::new();
        assert!(backend.get("RocketShip_1_title").unwrap().is_none());
    }

    #[test]
    fn test_set_then_get() {
        let backend = InMemoryBackend::new();
        backend.set("k", "\"v\"").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("\"v\""));
        assert_eq!(backend.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_expire_missing_key_reports_false() {
        let backend = InMemoryBackend::new();
        assert!(!backend.expire("k", Duration::from_secs(10)).unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_expire_elapses_with_clock() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();
        assert!(backend.expire("k", Duration::from_secs(10)).unwrap());
        assert!(backend.ttl("k").unwrap() <= Duration::from_secs(10));

        backend.advance_clock(Duration::from_secs(9));
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("1"));

        backend.advance_clock(Duration::from_secs(2));
        assert!(backend.get("k").unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_set_clears_previous_expiry() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();
        backend.expire("k", Duration::from_secs(1)).unwrap();
        backend.set("k", "2").unwrap();
        assert!(backend.ttl("k").is_none());

        backend.advance_clock(Duration::from_secs(5));
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_expire_zero_removes_key() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();
        assert!(backend.expire("k", Duration::ZERO).unwrap());
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn test_delete_expired_key_reports_false() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();
        backend.expire("k", Duration::from_secs(1)).unwrap();
        backend.advance_clock(Duration::from_secs(2));
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn test_expire_with_huge_ttl_keeps_value() {
        let backend = InMemoryBackend::new();
        backend.set("k", "1").unwrap();

        assert!(backend.expire("k", Duration::from_secs(u64::MAX)).unwrap());
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("1"));
        assert!(backend.ttl("k").is_none());

        backend.advance_clock(Duration::from_secs(3600));
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_advance_clock_past_representable_range() {
        let backend = InMemoryBackend::new();
        backend.set("persistent", "1").unwrap();
        backend.set("expiring", "2").unwrap();
        backend.expire("expiring", Duration::from_secs(10)).unwrap();

        backend.advance_clock(Duration::MAX);
        backend.advance_clock(Duration::from_secs(1));

        assert_eq!(backend.get("persistent").unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get("expiring").unwrap(), None);
        assert!(backend.expire("persistent", Duration::from_secs(10)).unwrap());
        assert_eq!(backend.get("persistent").unwrap().as_deref(), Some("1"));
    }
}
