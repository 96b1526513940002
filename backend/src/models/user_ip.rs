use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Document, FieldValue, StoreError};

/// The most recent address a user logged in from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIpRecord {
    pub ip: String,
    pub last_login: DateTime<Utc>,
}

impl UserIpRecord {
    /// Document for a login from `ip`; `lastLogin` is assigned by the store.
    pub fn login_document(ip: &str) -> Document {
        let mut document = Document::new();
        document.insert("ip".to_string(), ip.into());
        document.insert("lastLogin".to_string(), FieldValue::ServerTimestamp);
        document
    }

    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let ip = document
            .get("ip")
            .and_then(FieldValue::as_str)
            .ok_or_else(|| StoreError::Malformed("user ip record missing ip".to_string()))?;
        let last_login = document
            .get("lastLogin")
            .and_then(FieldValue::as_timestamp)
            .ok_or_else(|| StoreError::Malformed("user ip record missing lastLogin".to_string()))?;

        Ok(Self {
            ip: ip.to_string(),
            last_login,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::resolve_server_timestamps;

    #[test]
    fn test_login_document_round_trip() {
        let now = Utc::now();
        let document = resolve_server_timestamps(UserIpRecord::login_document("203.0.113.5"), now);
        let record = UserIpRecord::from_document(&document).unwrap();
        assert_eq!(record.ip, "203.0.113.5");
        assert_eq!(record.last_login, now);
    }

    #[test]
    fn test_missing_ip_is_malformed() {
        let mut document = Document::new();
        document.insert("lastLogin".to_string(), FieldValue::Timestamp(Utc::now()));
        assert!(matches!(
            UserIpRecord::from_document(&document),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_ip_is_kept() {
        let document = resolve_server_timestamps(UserIpRecord::login_document(""), Utc::now());
        assert_eq!(UserIpRecord::from_document(&document).unwrap().ip, "");
    }
}
