use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AccessTokenProvider, AuthError, IdentityVerifier, JwksClient, UserRecord, VerifiedToken};
use crate::config::FirebaseConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Firebase Authentication: ID token verification and user lookup.
pub struct FirebaseAuth {
    http_client: Client,
    jwks: JwksClient,
    tokens: Arc<AccessTokenProvider>,
    project_id: String,
    identity_toolkit_url: String,
}

impl FirebaseAuth {
    pub fn new(
        http_client: Client,
        tokens: Arc<AccessTokenProvider>,
        project_id: &str,
        config: &FirebaseConfig,
    ) -> Self {
        Self {
            jwks: JwksClient::new(http_client.clone(), &config.jwks_url, project_id),
            http_client,
            tokens,
            project_id: project_id.to_string(),
            identity_toolkit_url: config.identity_toolkit_url.trim_end_matches('/').to_string(),
        }
    }

    /// Load the signing keys ahead of the first request.
    pub async fn prefetch_keys(&self) -> Result<usize, AuthError> {
        self.jwks.refresh_keys().await
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseAuth {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError> {
        let claims = self.jwks.verify(id_token).await?;
        Ok(VerifiedToken { uid: claims.sub })
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        let access_token = self.tokens.access_token().await?;
        let url = format!(
            "{}/projects/{}/accounts:lookup",
            self.identity_toolkit_url, self.project_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&LookupRequest { local_id: [uid] })
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Upstream(format!(
                "accounts:lookup returned {}: {}",
                status, body
            )));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("Invalid accounts:lookup response: {}", e)))?;

        lookup
            .users
            .into_iter()
            .find(|u| u.local_id == uid)
            .map(|u| UserRecord {
                uid: u.local_id,
                email: u.email,
            })
            .ok_or_else(|| AuthError::UserNotFound(uid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_request_body() {
        let json = serde_json::to_value(LookupRequest { local_id: ["u1"] }).unwrap();
        assert_eq!(json, serde_json::json!({ "localId": ["u1"] }));
    }

    #[test]
    fn test_lookup_response_without_users() {
        let response: LookupResponse =
            serde_json::from_str(r#"{"kind": "identitytoolkit#GetAccountInfoResponse"}"#).unwrap();
        assert!(response.users.is_empty());
    }

    #[test]
    fn test_lookup_response_user_without_email() {
        let response: LookupResponse =
            serde_json::from_str(r#"{"users": [{"localId": "u1", "emailVerified": false}]}"#)
                .unwrap();
        assert_eq!(response.users[0].local_id, "u1");
        assert!(response.users[0].email.is_none());
    }
}
