use std::sync::Arc;

use crate::models::{UserIpRecord, UserProfile, USERS_COLLECTION, USER_IPS_COLLECTION};
use crate::store::{DocumentStore, StoreError};

/// User profiles and IP records on top of a [`DocumentStore`].
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create the user's profile unless one exists. Returns whether it was created.
    ///
    /// An existing profile is never modified.
    pub async fn ensure_profile(&self, uid: &str, email: &str) -> Result<bool, StoreError> {
        if self.store.get(USERS_COLLECTION, uid).await?.is_some() {
            return Ok(false);
        }

        let created = self
            .store
            .create(USERS_COLLECTION, uid, UserProfile::new_document(uid, email))
            .await?;

        if created {
            tracing::info!(uid = %uid, "Created new user");
        } else {
            tracing::debug!(uid = %uid, "User created concurrently, keeping existing profile");
        }
        Ok(created)
    }

    #[cfg(test)]
    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.store
            .get(USERS_COLLECTION, uid)
            .await?
            .map(|document| UserProfile::from_document(&document))
            .transpose()
    }

    /// Overwrite the user's IP record with `ip` and a fresh server timestamp.
    pub async fn record_ip(&self, uid: &str, ip: &str) -> Result<(), StoreError> {
        self.store
            .set(USER_IPS_COLLECTION, uid, UserIpRecord::login_document(ip))
            .await
    }

    pub async fn ip_record(&self, uid: &str) -> Result<Option<UserIpRecord>, StoreError> {
        self.store
            .get(USER_IPS_COLLECTION, uid)
            .await?
            .map(|document| UserIpRecord::from_document(&document))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_ensure_profile_creates_once() {
        let store = Arc::new(MemoryStore::new());
        let repo = UserRepository::new(store.clone());

        assert!(repo.ensure_profile("u1", "a@example.com").await.unwrap());
        let first = repo.profile("u1").await.unwrap().unwrap();

        assert!(!repo.ensure_profile("u1", "changed@example.com").await.unwrap());
        let second = repo.profile("u1").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(second.email, "a@example.com");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_record_ip_overwrites() {
        let repo = UserRepository::new(Arc::new(MemoryStore::new()));

        repo.record_ip("u1", "203.0.113.5").await.unwrap();
        repo.record_ip("u1", "198.51.100.7").await.unwrap();

        let record = repo.ip_record("u1").await.unwrap().unwrap();
        assert_eq!(record.ip, "198.51.100.7");
    }

    #[tokio::test]
    async fn test_ip_record_missing() {
        let repo = UserRepository::new(Arc::new(MemoryStore::new()));
        assert!(repo.ip_record("nobody").await.unwrap().is_none());
        assert!(repo.profile("nobody").await.unwrap().is_none());
    }
}
