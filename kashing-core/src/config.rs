//! Backend connection configuration
//!
//! The connection is resolved once at process start. Sources, in priority
//! order: `REDISTOGO_URL`, `REDIS_URL`, then the local default. The logical
//! database index comes from `REDIS_DB_NUM` and defaults to 0.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConfigError, KashingResult};

/// Hosted-Redis override, consulted first.
pub const REDISTOGO_URL_VAR: &str = "REDISTOGO_URL";
/// Generic Redis URL.
pub const REDIS_URL_VAR: &str = "REDIS_URL";
/// Numeric logical database index.
pub const REDIS_DB_NUM_VAR: &str = "REDIS_DB_NUM";
/// Used when neither URL variable is set.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

const DEFAULT_PORT: u16 = 6379;

/// Connection settings for the key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
}

impl BackendConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> KashingResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> KashingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (source, raw_url) = [REDISTOGO_URL_VAR, REDIS_URL_VAR]
            .into_iter()
            .find_map(|var| lookup(var).filter(|v| !v.is_empty()).map(|v| (var, v)))
            .unwrap_or(("default", DEFAULT_REDIS_URL.to_string()));

        // Non-numeric values count as 0, like an unset variable.
        let database = lookup(REDIS_DB_NUM_VAR)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let mut config = Self::from_url(source, &raw_url)?;
        config.database = database;
        config.validate()?;
        Ok(config)
    }

    fn from_url(source: &str, raw: &str) -> KashingResult<Self> {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
            field: source.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: format!("{} host", source),
            })?
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            password: url.password().map(str::to_string),
            database: 0,
        })
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - host is non-empty
    /// - port is non-zero
    /// - database index is non-negative
    pub fn validate(&self) -> KashingResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "host".to_string(),
            }
            .into());
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: self.port.to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.database < 0 {
            return Err(ConfigError::InvalidValue {
                field: REDIS_DB_NUM_VAR.to_string(),
                value: self.database.to_string(),
                reason: "must be non-negative".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Render the connection URL understood by Redis clients.
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            password: None,
            database: 0,
        }
    }
}
