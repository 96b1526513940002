//! Document storage.
//!
//! Documents are flat maps of field name to [`FieldValue`], addressed by
//! collection and key. Writers may leave timestamps to the backend with
//! [`FieldValue::ServerTimestamp`].

mod firestore;
mod memory;
mod sqlite;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Timestamp(DateTime<Utc>),
    /// Write-only: replaced with the backend's clock when committed.
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

pub type Document = BTreeMap<String, FieldValue>;

/// Replace server timestamp sentinels with `now`.
pub(crate) fn resolve_server_timestamps(mut document: Document, now: DateTime<Utc>) -> Document {
    for value in document.values_mut() {
        if *value == FieldValue::ServerTimestamp {
            *value = FieldValue::Timestamp(now);
        }
    }
    document
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Store returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("Invalid document key: {0:?}")]
    InvalidKey(String),
    #[error("Credential error: {0}")]
    Credentials(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document; `None` if it does not exist.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document, replacing any existing one.
    async fn set(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError>;

    /// Write a document only if none exists. Returns whether it was created.
    async fn create(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_server_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut document = Document::new();
        document.insert("ip".to_string(), "203.0.113.5".into());
        document.insert("lastLogin".to_string(), FieldValue::ServerTimestamp);

        let resolved = resolve_server_timestamps(document, now);
        assert_eq!(resolved["ip"], FieldValue::String("203.0.113.5".to_string()));
        assert_eq!(resolved["lastLogin"], FieldValue::Timestamp(now));
    }

    #[test]
    fn test_field_value_accessors() {
        let now = Utc::now();
        assert_eq!(FieldValue::from("a").as_str(), Some("a"));
        assert_eq!(FieldValue::from("a").as_timestamp(), None);
        assert_eq!(FieldValue::Timestamp(now).as_timestamp(), Some(now));
        assert_eq!(FieldValue::ServerTimestamp.as_str(), None);
    }

    #[test]
    fn test_field_value_json_shape() {
        let json = serde_json::to_string(&FieldValue::from("x")).unwrap();
        assert_eq!(json, r#"{"string":"x"}"#);
    }
}
