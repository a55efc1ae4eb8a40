//! Per-call correlation id.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of hex characters kept from the underlying v4 UUID.
pub const CORRELATION_ID_LEN: usize = 8;

/// Opaque per-call identifier used to namespace log lines and artifacts.
///
/// Generated once per HTTP call from a random v4 UUID, truncated to
/// [`CORRELATION_ID_LEN`] lowercase hex characters. Uses `Arc<str>` so the
/// id can be cloned into spans, paths and responses without reallocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(Arc::from(&hex[..CORRELATION_ID_LEN]))
    }

    /// Wrap an existing id string (tests, replays).
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id has the generated shape: 8 lowercase hex chars.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == CORRELATION_ID_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}
