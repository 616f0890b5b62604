//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped backend for single-host deployments.
//!
//! # Value Format
//!
//! Each value is stored as `[expires_at: 8 bytes][utf-8 payload]`, where
//! `expires_at` is a little-endian Unix timestamp in milliseconds and `0`
//! means the key never expires. Expired entries are treated as absent and
//! removed on the next write that touches them.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, `delete`, `expire` and expired-entry cleanup

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use kashing_core::{BackendError, KashingResult};

use crate::KvBackend;

/// Expiry stamp for keys without a TTL.
const NO_EXPIRY: i64 = 0;

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbBackendError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the value format.
    #[error("Corrupt entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbBackendError to KashingError.
impl From<LmdbBackendError> for kashing_core::KashingError {
    fn from(e: LmdbBackendError) -> Self {
        match e {
            LmdbBackendError::EnvOpen(_) | LmdbBackendError::DbOpen(_) | LmdbBackendError::Io(_) => {
                BackendError::Unavailable {
                    reason: e.to_string(),
                }
                .into()
            }
            LmdbBackendError::Corrupt { .. } => BackendError::Protocol {
                operation: "get".to_string(),
                reason: e.to_string(),
            }
            .into(),
            LmdbBackendError::Transaction(_) => BackendError::Transaction {
                reason: e.to_string(),
            }
            .into(),
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn encode_entry(expires_at: i64, value: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + value.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
    bytes
}

fn decode_entry(key: &str, bytes: &[u8]) -> Result<(i64, String), LmdbBackendError> {
    if bytes.len() < 8 {
        return Err(LmdbBackendError::Corrupt {
            key: key.to_string(),
            reason: "entry shorter than expiry header".to_string(),
        });
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&bytes[0..8]);
    let expires_at = i64::from_le_bytes(header);
    let value = String::from_utf8(bytes[8..].to_vec()).map_err(|e| LmdbBackendError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok((expires_at, value))
}

fn is_live(expires_at: i64, now: i64) -> bool {
    expires_at == NO_EXPIRY || now < expires_at
}

/// LMDB-backed key-value store.
///
/// # Example
///
/// ```ignore
/// use kashing_storage::{KvBackend, LmdbBackend};
///
/// let backend = LmdbBackend::new("/tmp/kashing", 64)?;
/// backend.set("RocketShip_7_title", "\"Apollo\"")?;
/// backend.expire("RocketShip_7_title", Duration::from_secs(10))?;
/// ```
pub struct LmdbBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbBackend {
    /// Create a new LMDB backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbBackendError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        tracing::debug!(
            path = %path.as_ref().display(),
            max_size_mb,
            "Opened LMDB backend"
        );
        Ok(Self { env, db })
    }

    /// Read the raw entry for `key`, ignoring expiry.
    fn read_entry(&self, key: &str) -> Result<Option<(i64, String)>, LmdbBackendError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, key.as_bytes()) {
            Ok(Some(bytes)) => decode_entry(key, bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(LmdbBackendError::Transaction(e.to_string())),
        }
    }

    /// Apply `f` to the live entry at `key` inside one write transaction.
    ///
    /// `f` receives the current live value (expired entries are removed
    /// first) and returns the entry to write back, or `None` to delete.
    fn update_entry<F, R>(&self, key: &str, f: F) -> Result<R, LmdbBackendError>
    where
        F: FnOnce(Option<(i64, String)>) -> (Option<(i64, String)>, R),
    {
        let now = now_millis();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        let current = match self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?
        {
            Some(bytes) => {
                let (expires_at, value) = decode_entry(key, bytes)?;
                is_live(expires_at, now).then_some((expires_at, value))
            }
            None => None,
        };

        let (next, result) = f(current);
        match next {
            Some((expires_at, value)) => {
                self.db
                    .put(&mut wtxn, key.as_bytes(), &encode_entry(expires_at, &value))
                    .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
            }
            None => {
                self.db
                    .delete(&mut wtxn, key.as_bytes())
                    .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        Ok(result)
    }
}

impl KvBackend for LmdbBackend {
    fn get(&self, key: &str) -> KashingResult<Option<String>> {
        match self.read_entry(key)? {
            Some((expires_at, value)) if is_live(expires_at, now_millis()) => Ok(Some(value)),
            Some(_) => {
                // Expired: drop it so the file does not keep dead entries.
                tracing::trace!(key, "Removing expired LMDB entry");
                self.update_entry(key, |current| (current, ()))?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> KashingResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_bytes(), &encode_entry(NO_EXPIRY, value))
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> KashingResult<bool> {
        Ok(self.update_entry(key, |current| (None, current.is_some()))?)
    }

    fn expire(&self, key: &str, ttl: Duration) -> KashingResult<bool> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        Ok(self.update_entry(key, |current| match current {
            Some(_) if ttl.is_zero() => (None, true),
            Some((_, value)) => (Some((expires_at, value)), true),
            None => (None, false),
        })?)
    }
}
