//! Error types for kashing operations

use thiserror::Error;

/// Key-value backend errors.
///
/// These are never handled inside the engine; they propagate to the caller
/// unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Backend protocol error on {operation}: {reason}")]
    Protocol { operation: String, reason: String },

    #[error("Backend transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Backend lock poisoned")]
    LockPoisoned,
}

/// Field registration and lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("Field not registered: {entity_type}.{field}")]
    NotRegistered { entity_type: String, field: String },

    #[error("Class-level lookup of {entity_type}.{field} resolved an instance-scoped field")]
    MalformedClassLookup { entity_type: String, field: String },
}

/// Serialization errors.
///
/// Custom hook failures are recovered by the serializer; only failures of
/// the default JSON path ever reach a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Store hook failed for {field}: {reason}")]
    StoreHook { field: String, reason: String },

    #[error("Parse hook failed for {field}: {reason}")]
    ParseHook { field: String, reason: String },

    #[error("JSON encoding failed for {field}: {reason}")]
    Json { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Error raised by a user-supplied store or parse hook.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Master error type for all kashing errors.
#[derive(Debug, Clone, Error)]
pub enum KashingError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Field error: {0}")]
    Field(#[from] FieldError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for kashing operations.
pub type KashingResult<T> = Result<T, KashingError>;

// =============================================================================
// TESTS
// =============================================================================
