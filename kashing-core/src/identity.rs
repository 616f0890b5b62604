//! Identity types for cached entities

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rendering of the class-level sentinel identifier.
pub const CLASS_SENTINEL: &str = "0";

/// Identifier of a cached entity instance, or the class-level sentinel.
///
/// The identifier is rendered into cache keys through its [`fmt::Display`]
/// form. `Class` always renders as `0`, which means an instance with the
/// integer id `0` shares the class-level keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// Class-wide entry, not tied to any instance.
    Class,
    /// Integer primary key.
    Int(i64),
    /// UUID primary key.
    Uuid(Uuid),
    /// Any other primary key, rendered verbatim.
    Text(String),
}

impl Identifier {
    /// Returns true for the class-level sentinel.
    pub fn is_class(&self) -> bool {
        matches!(self, Self::Class)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => f.write_str(CLASS_SENTINEL),
            Self::Int(id) => write!(f, "{}", id),
            Self::Uuid(id) => write!(f, "{}", id),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for Identifier {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<Uuid> for Identifier {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}
