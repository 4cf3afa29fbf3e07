use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version number of a stored document, used for optimistic concurrency control.
///
/// A document that does not exist yet is at version 0. The first insert
/// produces version 1 and every successful update increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a document that has never been written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version assigned by the first insert.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true if no write has happened yet.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A document as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document kind (e.g. "Order", "Invoice").
    pub kind: String,

    /// Document id, unique within its kind.
    pub id: Uuid,

    /// Current version of the document.
    pub version: Version,

    /// Global insertion sequence, used for stable ordering.
    pub sequence: i64,

    /// The document body.
    pub body: serde_json::Value,

    /// Indexed field values used by query-by-field lookups.
    pub lookup: BTreeMap<String, String>,

    /// When the document was first inserted.
    pub created_at: DateTime<Utc>,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Deserializes the body into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.body.clone())
    }

    /// Returns true if every `(field, value)` pair matches the lookup index.
    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        fields
            .iter()
            .all(|(field, value)| self.lookup.get(field) == Some(value))
    }
}
