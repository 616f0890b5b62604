//! Redis-backed key-value store.
//!
//! Holds one synchronous connection behind a mutex. Expiry uses `PEXPIRE`
//! so sub-second TTLs keep their precision; `PEXPIRE key 0` removes the key,
//! which matches the zero-TTL contract of [`KvBackend::expire`].

use std::sync::Mutex;
use std::time::Duration;

use kashing_core::{BackendConfig, BackendError, KashingResult};
use redis::{Commands, Connection, RedisError};

use crate::KvBackend;

fn protocol(operation: &str, e: RedisError) -> BackendError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        BackendError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        BackendError::Protocol {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Redis backend.
pub struct RedisBackend {
    connection: Mutex<Connection>,
}

impl RedisBackend {
    /// Connect using a resolved [`BackendConfig`].
    pub fn connect(config: &BackendConfig) -> KashingResult<Self> {
        config.validate()?;
        let url = config.connection_url();
        let client = redis::Client::open(url.as_str()).map_err(|e| protocol("open", e))?;
        let connection = client.get_connection().map_err(|e| protocol("connect", e))?;

        tracing::debug!(
            host = %config.host,
            port = config.port,
            database = config.database,
            "Connected to Redis backend"
        );

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Connect using the environment (`REDISTOGO_URL`, `REDIS_URL`, `REDIS_DB_NUM`).
    pub fn from_env() -> KashingResult<Self> {
        Self::connect(&BackendConfig::from_env()?)
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, BackendError>,
    ) -> KashingResult<T> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| BackendError::LockPoisoned)?;
        Ok(f(&mut connection)?)
    }
}

impl KvBackend for RedisBackend {
    fn get(&self, key: &str) -> KashingResult<Option<String>> {
        self.with_connection(|conn| conn.get(key).map_err(|e| protocol("GET", e)))
    }

    fn set(&self, key: &str, value: &str) -> KashingResult<()> {
        self.with_connection(|conn| conn.set(key, value).map_err(|e| protocol("SET", e)))
    }

    fn delete(&self, key: &str) -> KashingResult<bool> {
        self.with_connection(|conn| {
            conn.del::<_, i64>(key)
                .map(|removed| removed > 0)
                .map_err(|e| protocol("DEL", e))
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> KashingResult<bool> {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.with_connection(|conn| {
            conn.pexpire::<_, bool>(key, millis)
                .map_err(|e| protocol("PEXPIRE", e))
        })
    }
}
