//! HTTP API bodies.
//!
//! Field names follow the camelCase JSON used by browser clients
//! (`idToken`, `lastLogin`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error message for `POST /get-ip` without a token.
pub const MISSING_ID_TOKEN: &str = "Missing ID token";
/// Error message for any verification or storage failure on `POST /get-ip`.
pub const INVALID_TOKEN_OR_INTERNAL: &str = "Invalid ID token or internal error";
/// Error message for `GET /get-ip-by-uid/` without a uid.
pub const MISSING_UID: &str = "Missing UID";
/// Error message when no IP record is stored for a uid.
pub const NO_IP_DATA: &str = "No IP data found for this UID";
/// Error message for storage failures on lookups.
pub const SERVER_ERROR: &str = "Server error";

/// POST /get-ip request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetIpRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl GetIpRequest {
    pub fn new(id_token: impl Into<String>) -> Self {
        Self {
            id_token: Some(id_token.into()),
        }
    }

    /// The token, if present and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.id_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// POST /get-ip success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIpResponse {
    pub uid: String,
    pub email: String,
    pub ip: String,
}

/// GET /get-ip-by-uid/:uid success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpLookupResponse {
    pub uid: String,
    pub ip: String,
    pub last_login: DateTime<Utc>,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
