//! Kashing Core - Shared Types
//!
//! Pure data structures shared by the storage backends and the cache engine:
//! the error taxonomy, entity identifiers, dynamic field values and the
//! backend connection configuration. No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod identity;
pub mod value;

pub use config::{
    BackendConfig, DEFAULT_REDIS_URL, REDISTOGO_URL_VAR, REDIS_DB_NUM_VAR, REDIS_URL_VAR,
};
pub use error::{
    BackendError, ConfigError, FieldError, HookError, KashingError, KashingResult,
    SerializationError,
};
pub use identity::{Identifier, CLASS_SENTINEL};
pub use value::FieldValue;
