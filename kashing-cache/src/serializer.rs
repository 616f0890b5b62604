//! Value <-> stored text.
//!
//! Encoding applies the field's store hook (if any) and JSON-encodes the
//! result. Decoding applies the parse hook (if any), otherwise JSON-decodes
//! and upgrades timestamp-shaped strings to time values. Hook failures fall
//! back to the default path; the fallback is reported through the
//! `hook_failed` flag and a warning.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use kashing_core::{FieldValue, HookError, KashingResult, SerializationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::registry::{FieldSpec, ParseHook, StoreHook};
use crate::traits::CacheableEntity;

/// Storage format of `time` fields.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S GMT%z";

static TIMESTAMP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(\.\d+)?\s*(Z|z|UTC|GMT)?\s*([+-]\d{2}:?\d{2})?$",
    )
    .expect("Invalid timestamp regex")
});

/// Result of [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Text written to the backend.
    pub text: String,
    /// The store hook failed and the original value was encoded instead.
    pub hook_failed: bool,
}

/// Result of [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Decoded value; `None` when nothing was stored.
    pub value: Option<FieldValue>,
    /// The parse hook failed and the default decoder was used instead.
    pub hook_failed: bool,
}

impl Decoded {
    fn absent() -> Self {
        Self {
            value: None,
            hook_failed: false,
        }
    }
}

/// Encode a produced value for storage.
pub fn encode<E: CacheableEntity>(value: &FieldValue, spec: &FieldSpec<E>) -> KashingResult<Encoded> {
    let (stored, hook_failed) = match spec.store_hook() {
        Some(store) => match store(value) {
            Ok(stored) => (stored, false),
            Err(e) => {
                let err = SerializationError::StoreHook {
                    field: spec.name().to_string(),
                    reason: e.to_string(),
                };
                warn!(
                    entity_type = E::entity_type(),
                    field = spec.name(),
                    error = %err,
                    "Store hook failed, encoding the unconverted value"
                );
                (value.clone(), true)
            }
        },
        None => (value.clone(), false),
    };

    let text = to_json_text(&stored).map_err(|reason| SerializationError::Json {
        field: spec.name().to_string(),
        reason,
    })?;
    Ok(Encoded { text, hook_failed })
}

/// Decode stored text. `None` in, absent out.
pub fn decode<E: CacheableEntity>(raw: Option<&str>, spec: &FieldSpec<E>) -> Decoded {
    let Some(raw) = raw else {
        return Decoded::absent();
    };

    if let Some(parse) = spec.parse_hook() {
        match parse(raw) {
            Ok(value) => {
                return Decoded {
                    value: Some(value),
                    hook_failed: false,
                }
            }
            Err(e) => {
                let err = SerializationError::ParseHook {
                    field: spec.name().to_string(),
                    reason: e.to_string(),
                };
                warn!(
                    entity_type = E::entity_type(),
                    field = spec.name(),
                    error = %err,
                    "Parse hook failed, falling back to JSON decoding"
                );
                return Decoded {
                    value: Some(decode_default(raw)),
                    hook_failed: true,
                };
            }
        }
    }

    Decoded {
        value: Some(decode_default(raw)),
        hook_failed: false,
    }
}

/// JSON-encode a value without any hooks.
pub fn encode_default(value: &FieldValue) -> KashingResult<String> {
    to_json_text(value).map_err(|reason| {
        SerializationError::Json {
            field: String::new(),
            reason,
        }
        .into()
    })
}

/// JSON-decode stored text, upgrading timestamp-shaped strings.
///
/// Text that is not valid JSON comes back as a plain string value.
pub fn decode_default(raw: &str) -> FieldValue {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => match looks_like_timestamp(&s).then(|| parse_timestamp(&s)).flatten() {
            Some(time) => FieldValue::Time(time),
            None => FieldValue::Json(Value::String(s)),
        },
        Ok(value) => FieldValue::Json(value),
        Err(_) => FieldValue::Json(Value::String(raw.to_string())),
    }
}

fn to_json_text(value: &FieldValue) -> Result<String, String> {
    serde_json::to_string(&value.to_json()).map_err(|e| e.to_string())
}

/// True if `s` has the shape of an ISO-8601-like timestamp.
pub fn looks_like_timestamp(s: &str) -> bool {
    TIMESTAMP_PATTERN.is_match(s.trim())
}

/// Parse the timestamp renderings the cache encounters: RFC 3339, the
/// `time` storage format and offset-less `YYYY-MM-DD HH:MM:SS` (read as
/// UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = s.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(time);
    }

    let mut text = trimmed.replace("GMT", " ").replace("UTC", " ");
    if text.ends_with('Z') || text.ends_with('z') {
        text.pop();
        text.push_str(" +0000");
    }
    let text = text
        .replacen(['T', 't'], " ", 1)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for format in [
        "%Y-%m-%d %H:%M:%S%.f %z",
        "%Y-%m-%d %H:%M:%S%.f %:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
    ] {
        if let Ok(time) = DateTime::parse_from_str(&text, format) {
            return Some(time);
        }
    }

    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Store hook installed by the `time` option.
pub fn time_store_hook() -> StoreHook {
    Arc::new(|value: &FieldValue| -> Result<FieldValue, HookError> {
        if value.is_null() {
            return Ok(FieldValue::null());
        }
        let time = value
            .as_time()
            .or_else(|| value.as_str().and_then(parse_timestamp))
            .ok_or_else(|| HookError::new(format!("not a timestamp: {}", value.to_json())))?;
        Ok(FieldValue::from(time.format(TIME_FORMAT).to_string()))
    })
}

/// Parse hook installed by the `time` option.
pub fn time_parse_hook() -> ParseHook {
    Arc::new(|raw: &str| -> Result<FieldValue, HookError> {
        let text = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Null) => return Ok(FieldValue::null()),
            Ok(Value::String(s)) => s,
            _ => raw.to_string(),
        };
        parse_timestamp(&text)
            .map(FieldValue::Time)
            .ok_or_else(|| HookError::new(format!("unparseable timestamp: {text}")))
    })
}
