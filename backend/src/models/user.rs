use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Document, FieldValue, StoreError};

/// User profile created on first successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User ID from Firebase (sub claim)
    pub uid: String,
    /// Email from the identity provider (empty if the user has none)
    pub email: String,
    /// When the user first authenticated
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Document for a new profile; `createdAt` is assigned by the store.
    pub fn new_document(uid: &str, email: &str) -> Document {
        let mut document = Document::new();
        document.insert("uid".to_string(), uid.into());
        document.insert("email".to_string(), email.into());
        document.insert("createdAt".to_string(), FieldValue::ServerTimestamp);
        document
    }

    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let field = |name: &str| {
            document
                .get(name)
                .ok_or_else(|| StoreError::Malformed(format!("user profile missing {}", name)))
        };

        Ok(Self {
            uid: field("uid")?
                .as_str()
                .ok_or_else(|| StoreError::Malformed("uid is not a string".to_string()))?
                .to_string(),
            email: field("email")?
                .as_str()
                .ok_or_else(|| StoreError::Malformed("email is not a string".to_string()))?
                .to_string(),
            created_at: field("createdAt")?
                .as_timestamp()
                .ok_or_else(|| StoreError::Malformed("createdAt is not a timestamp".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::resolve_server_timestamps;

    #[test]
    fn test_new_document_fields() {
        let document = UserProfile::new_document("u1", "a@example.com");
        assert_eq!(document["uid"].as_str(), Some("u1"));
        assert_eq!(document["email"].as_str(), Some("a@example.com"));
        assert_eq!(document["createdAt"], FieldValue::ServerTimestamp);
    }

    #[test]
    fn test_from_resolved_document() {
        let now = Utc::now();
        let document = resolve_server_timestamps(UserProfile::new_document("u1", ""), now);
        let profile = UserProfile::from_document(&document).unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.email, "");
        assert_eq!(profile.created_at, now);
    }

    #[test]
    fn test_unresolved_timestamp_is_malformed() {
        let document = UserProfile::new_document("u1", "a@example.com");
        assert!(matches!(
            UserProfile::from_document(&document),
            Err(StoreError::Malformed(_))
        ));
    }
}
