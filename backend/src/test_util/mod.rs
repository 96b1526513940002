//! Helpers shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::{AuthError, IdentityVerifier, ServiceAccountKey, UserRecord, VerifiedToken};
use crate::config::FirebaseConfig;
use crate::store::{Document, DocumentStore, StoreError};
use crate::AppState;

pub const TEST_PROJECT_ID: &str = "demo-project";
pub const TEST_KID: &str = "test-key";

/// 2048-bit RSA key used to sign test tokens and service account assertions.
pub const TEST_KEY_PEM: &str = include_str!("test_key.pem");
/// Base64url modulus of [`TEST_KEY_PEM`].
pub const TEST_KEY_N: &str = "9AMJczSEl2_lvi9Ifia4j6GgzSbnQ_FcVEQWqBz0bkKvcc6pEsPkdYixWw5ULw9WiMdfH5iWj8N5VFkiXkHZfjxO4T9g7TiG1jHdBeV_ckMUxw4ECqCM3MJ5S6jvHBaQZ4HDRa6GKulZFQhB-rvssv-QVK80_LGc3tKRsck7zlKRzgQuTxPQ_zm8M93lIiVdSETkSzIRf2D_EOZw5Ky8eevQwy_IjoxiBDEwccxMT3U14gx_opcvO2-GEe4FHwGS1W9rpZyAiZG1MTcx5pgKveOcXZJyfn1PVxDEU5I4gI_C2k3Hf3HwCYYH5eSaaSij9X_vWAwPMrfSVhFWBjpqIw";
pub const TEST_KEY_E: &str = "AQAB";

/// Config whose Google endpoints all point at `base_url` (a mock server).
pub fn mock_firebase_config(base_url: &str) -> FirebaseConfig {
    FirebaseConfig {
        service_account: Some(test_service_account_json(&format!("{}/token", base_url))),
        project_id: Some(TEST_PROJECT_ID.to_string()),
        jwks_url: format!("{}/jwks", base_url),
        identity_toolkit_url: format!("{}/identitytoolkit/v1", base_url),
        firestore_url: format!("{}/firestore/v1", base_url),
        token_uri: None,
    }
}

pub fn test_state(
    verifier: Arc<dyn IdentityVerifier>,
    store: Arc<dyn DocumentStore>,
) -> Arc<AppState> {
    Arc::new(AppState::new(verifier, store))
}

/// JWK set publishing the test key under `kid`.
pub fn test_jwks(kid: &str) -> Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": TEST_KEY_N,
            "e": TEST_KEY_E
        }]
    })
}

pub fn test_service_account_key(token_uri: &str) -> ServiceAccountKey {
    ServiceAccountKey {
        project_id: TEST_PROJECT_ID.to_string(),
        client_email: format!("relay@{}.iam.gserviceaccount.com", TEST_PROJECT_ID),
        private_key: TEST_KEY_PEM.to_string(),
        private_key_id: Some("test-key-id".to_string()),
        token_uri: token_uri.to_string(),
    }
}

pub fn test_service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "project_id": TEST_PROJECT_ID,
        "private_key_id": "test-key-id",
        "private_key": TEST_KEY_PEM,
        "client_email": format!("relay@{}.iam.gserviceaccount.com", TEST_PROJECT_ID),
        "token_uri": token_uri
    })
    .to_string()
}

/// Sign arbitrary claims with the test key.
pub fn sign_test_token(claims: &Value, kid: &str) -> String {
    let header = Header {
        alg: Algorithm::RS256,
        kid: Some(kid.to_string()),
        ..Default::default()
    };
    let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).expect("Invalid test key");

    encode(&header, claims, &key).expect("Failed to encode JWT")
}

/// Claims of a Firebase ID token valid for the next hour.
pub fn id_token_claims(project_id: &str, uid: &str, email: Option<&str>) -> Value {
    let now = Utc::now();
    let mut claims = json!({
        "iss": format!("https://securetoken.google.com/{}", project_id),
        "aud": project_id,
        "auth_time": now.timestamp(),
        "user_id": uid,
        "sub": uid,
        "iat": now.timestamp(),
        "exp": (now + Duration::hours(1)).timestamp(),
    });
    if let Some(email) = email {
        claims["email"] = json!(email);
    }
    claims
}

pub fn generate_test_id_token(project_id: &str, uid: &str, email: Option<&str>, kid: &str) -> String {
    sign_test_token(&id_token_claims(project_id, uid, email), kid)
}

pub fn generate_expired_id_token(project_id: &str, uid: &str, kid: &str) -> String {
    let now = Utc::now();
    let mut claims = id_token_claims(project_id, uid, None);
    claims["iat"] = json!((now - Duration::hours(2)).timestamp());
    claims["exp"] = json!((now - Duration::hours(1)).timestamp());
    sign_test_token(&claims, kid)
}

/// Identity verifier backed by a fixed token table.
#[derive(Default)]
pub struct FakeVerifier {
    tokens: HashMap<String, String>,
    users: HashMap<String, Option<String>>,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `uid`, and know the user's profile.
    pub fn with_user(mut self, token: &str, uid: &str, email: Option<&str>) -> Self {
        self.tokens.insert(token.to_string(), uid.to_string());
        self.users.insert(uid.to_string(), email.map(String::from));
        self
    }

    /// Accept `token` for `uid`, but fail the profile lookup.
    pub fn with_unknown_user(mut self, token: &str, uid: &str) -> Self {
        self.tokens.insert(token.to_string(), uid.to_string());
        self
    }

    /// Number of verification attempts.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let uid = self
            .tokens
            .get(id_token)
            .ok_or_else(|| AuthError::InvalidToken("unknown test token".to_string()))?;

        Ok(VerifiedToken { uid: uid.clone() })
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        self.users
            .get(uid)
            .map(|email| UserRecord {
                uid: uid.to_string(),
                email: email.clone(),
            })
            .ok_or_else(|| AuthError::UserNotFound(uid.to_string()))
    }
}

/// Document store whose every operation fails.
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, _collection: &str, _key: &str) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }

    async fn set(&self, _collection: &str, _key: &str, _document: Document) -> Result<(), StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }

    async fn create(
        &self,
        _collection: &str,
        _key: &str,
        _document: Document,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }
}
