use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::AuthError;

/// Issuer prefix of Firebase ID tokens; the project id follows.
const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Unknown `kid`s refetch the key set at most this often.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Key set lifetime when the response carries no `Cache-Control: max-age`.
const DEFAULT_KEYS_LIFETIME: Duration = Duration::from_secs(3600);

/// Longest `sub` Firebase will issue.
const MAX_SUBJECT_LEN: usize = 128;

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[allow(dead_code)]
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Claims of a Firebase ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub exp: u64,
}

/// Verifies Firebase ID tokens against Google's published signing keys.
///
/// Keys are fetched lazily and cached for the lifetime Google publishes in
/// `Cache-Control: max-age`; once that passes the set is refetched before the
/// next verification. A token naming an unknown `kid` also triggers one
/// refetch (rate limited by [`MIN_REFRESH_INTERVAL`]).
pub struct JwksClient {
    http_client: Client,
    jwks_uri: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
    keys_expire_at: RwLock<Option<Instant>>,
    issuer: String,
    audience: String,
}

impl JwksClient {
    pub fn new(http_client: Client, jwks_uri: &str, project_id: &str) -> Self {
        Self {
            http_client,
            jwks_uri: jwks_uri.to_string(),
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            keys_expire_at: RwLock::new(None),
            issuer: format!("{}{}", ISSUER_PREFIX, project_id),
            audience: project_id.to_string(),
        }
    }

    /// Fetch the key set, replacing the cached keys. Returns the number of usable keys.
    pub async fn refresh_keys(&self) -> Result<usize, AuthError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);
        *self.last_refresh.write().await = Some(Instant::now());

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let lifetime = max_age(response.headers()).unwrap_or(DEFAULT_KEYS_LIFETIME);
        let response: JwksResponse = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                match DecodingKey::from_rsa_components(n, e) {
                    Ok(key) => {
                        keys.insert(jwk.kid.clone(), key);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                    }
                }
            }
        }

        *self.keys_expire_at.write().await = Some(Instant::now() + lifetime);

        tracing::info!("Loaded {} JWKS keys, valid for {}s", keys.len(), lifetime.as_secs());
        Ok(keys.len())
    }

    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn refresh_allowed(&self) -> bool {
        match *self.last_refresh.read().await {
            Some(at) => at.elapsed() >= MIN_REFRESH_INTERVAL,
            None => true,
        }
    }

    /// Whether the cached key set has outlived its published lifetime.
    async fn keys_expired(&self) -> bool {
        match *self.keys_expire_at.read().await {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if self.keys_expired().await {
            tracing::debug!("JWKS cache expired");
            self.refresh_keys().await?;
        } else if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        } else if self.refresh_allowed().await {
            self.refresh_keys().await?;
        }

        self.cached_key(kid)
            .await
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Verify a Firebase ID token and return its claims.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "Unexpected algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("Missing kid in token header".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        if claims.sub.is_empty() || claims.sub.len() > MAX_SUBJECT_LEN {
            return Err(AuthError::InvalidToken("Invalid sub claim".to_string()));
        }

        Ok(claims)
    }
}

/// `max-age` directive of a `Cache-Control` header.
fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|directive| {
            let (name, seconds) = directive.trim().split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            seconds.trim().trim_matches('"').parse().ok()
        })
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{generate_test_id_token, TEST_KID};

    #[test]
    fn test_issuer_and_audience_follow_project() {
        let client = JwksClient::new(Client::new(), "http://localhost/jwks", "demo-project");
        assert_eq!(client.issuer, "https://securetoken.google.com/demo-project");
        assert_eq!(client.audience, "demo-project");
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let client = JwksClient::new(Client::new(), "http://localhost/jwks", "demo-project");
        let result = client.verify("not-a-jwt").await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_unknown_kid_without_refresh_budget() {
        let client = JwksClient::new(Client::new(), "http://localhost/jwks", "demo-project");
        *client.last_refresh.write().await = Some(Instant::now());

        let token = generate_test_id_token("demo-project", "u1", None, TEST_KID);
        let result = client.verify(&token).await;
        assert!(matches!(result, Err(AuthError::KeyNotFound(kid)) if kid == TEST_KID));
    }

    #[tokio::test]
    async fn test_expired_cache_refetches_even_for_known_kid() {
        let client = JwksClient::new(Client::new(), "http://127.0.0.1:9/jwks", "demo-project");
        *client.last_refresh.write().await = Some(Instant::now());
        *client.keys_expire_at.write().await = Some(Instant::now());

        let token = generate_test_id_token("demo-project", "u1", None, TEST_KID);
        let result = client.verify(&token).await;
        assert!(matches!(result, Err(AuthError::JwksFetchError(_))));
    }

    #[tokio::test]
    async fn test_keys_not_expired_before_first_fetch() {
        let client = JwksClient::new(Client::new(), "http://localhost/jwks", "demo-project");
        assert!(!client.keys_expired().await);
    }

    #[test]
    fn test_max_age_from_cache_control() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CACHE_CONTROL,
            "public, max-age=19964, must-revalidate, no-transform".parse().unwrap(),
        );
        assert_eq!(max_age(&headers), Some(Duration::from_secs(19964)));
    }

    #[test]
    fn test_max_age_missing_or_invalid() {
        assert_eq!(max_age(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, "no-cache".parse().unwrap());
        assert_eq!(max_age(&headers), None);

        headers.insert(CACHE_CONTROL, "max-age=soon".parse().unwrap());
        assert_eq!(max_age(&headers), None);
    }

    #[tokio::test]
    async fn test_refresh_allowed_initially() {
        let client = JwksClient::new(Client::new(), "http://localhost/jwks", "demo-project");
        assert!(client.refresh_allowed().await);
    }
}
