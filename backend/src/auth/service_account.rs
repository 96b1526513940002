use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::AuthError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const SCOPES: &str = "https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/identitytoolkit \
                      https://www.googleapis.com/auth/cloud-platform";

/// Lifetime requested for each assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are renewed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Google service account key, as downloaded from the Firebase console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    scope: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// OAuth2 access tokens for Google APIs, minted from a service account key.
pub struct AccessTokenProvider {
    http_client: Client,
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    encoding_key: EncodingKey,
    cached: RwLock<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(
        http_client: Client,
        key: &ServiceAccountKey,
        token_uri: Option<&str>,
    ) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::Credentials(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            http_client,
            client_email: key.client_email.clone(),
            key_id: key.private_key_id.clone(),
            token_uri: token_uri.unwrap_or(&key.token_uri).to_string(),
            encoding_key,
            cached: RwLock::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cached token is near expiry.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud: &self.token_uri,
            scope: SCOPES,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let header = Header {
            alg: Algorithm::RS256,
            kid: self.key_id.clone(),
            ..Default::default()
        };

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Credentials(format!("Failed to sign assertion: {}", e)))
    }

    async fn fetch_token(&self) -> Result<CachedToken, AuthError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        tracing::debug!("Requesting access token from {}", self.token_uri);

        let response = self
            .http_client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Credentials(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Credentials(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Credentials(format!("Invalid token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_service_account_key;

    #[test]
    fn test_token_uri_defaults_to_google() {
        let key = ServiceAccountKey::from_json(
            r#"{"project_id": "p", "client_email": "c@p.iam.gserviceaccount.com", "private_key": "k"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
        assert!(key.private_key_id.is_none());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = test_service_account_key("http://localhost/token");
        let debug = format!("{:?}", key);
        assert!(debug.contains("demo-project"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_invalid_private_key_is_rejected() {
        let mut key = test_service_account_key("http://localhost/token");
        key.private_key = "not a pem".to_string();
        let result = AccessTokenProvider::new(Client::new(), &key, None);
        assert!(matches!(result, Err(AuthError::Credentials(_))));
    }

    #[test]
    fn test_token_uri_override() {
        let key = test_service_account_key("http://localhost/token");
        let provider =
            AccessTokenProvider::new(Client::new(), &key, Some("http://override/token")).unwrap();
        assert_eq!(provider.token_uri, "http://override/token");
    }

    #[test]
    fn test_assertion_is_signed_for_token_uri() {
        let key = test_service_account_key("http://localhost/token");
        let provider = AccessTokenProvider::new(Client::new(), &key, None).unwrap();
        let assertion = provider.assertion(Utc::now()).unwrap();
        let header = jsonwebtoken::decode_header(&assertion).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("test-key-id"));
    }

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let fresh = CachedToken {
            access_token: "a".to_string(),
            expires_at: now + Duration::seconds(600),
        };
        let stale = CachedToken {
            access_token: "b".to_string(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }
}
