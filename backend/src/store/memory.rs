use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{resolve_server_timestamps, Document, DocumentStore, StoreError};

/// Process-local document store.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(String, String), Document>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that changed a document.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    /// Whether a collection holds no documents.
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError> {
        let document = resolve_server_timestamps(document, Utc::now());
        self.documents
            .write()
            .await
            .insert((collection.to_string(), key.to_string()), document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().await;
        let id = (collection.to_string(), key.to_string());
        if documents.contains_key(&id) {
            return Ok(false);
        }

        documents.insert(id, resolve_server_timestamps(document, Utc::now()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;

    fn doc(ip: &str) -> Document {
        let mut document = Document::new();
        document.insert("ip".to_string(), ip.into());
        document.insert("lastLogin".to_string(), FieldValue::ServerTimestamp);
        document
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get("user_ips", "u1").await.unwrap().is_none());
        assert!(store.is_empty("user_ips").await);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_fills_timestamp() {
        let store = MemoryStore::new();
        store.set("user_ips", "u1", doc("1.1.1.1")).await.unwrap();
        store.set("user_ips", "u1", doc("2.2.2.2")).await.unwrap();

        let stored = store.get("user_ips", "u1").await.unwrap().unwrap();
        assert_eq!(stored["ip"].as_str(), Some("2.2.2.2"));
        assert!(stored["lastLogin"].as_timestamp().is_some());
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.len("user_ips").await, 1);
    }

    #[tokio::test]
    async fn test_create_does_not_overwrite() {
        let store = MemoryStore::new();
        assert!(store.create("users", "u1", doc("1.1.1.1")).await.unwrap());
        assert!(!store.create("users", "u1", doc("2.2.2.2")).await.unwrap());

        let stored = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored["ip"].as_str(), Some("1.1.1.1"));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_separate() {
        let store = MemoryStore::new();
        store.set("users", "u1", doc("1.1.1.1")).await.unwrap();
        assert!(store.get("user_ips", "u1").await.unwrap().is_none());
        assert!(!store.is_empty("users").await);
        assert!(store.is_empty("user_ips").await);
        assert_eq!(store.len("users").await, 1);
        assert_eq!(store.len("user_ips").await, 0);
    }
}
