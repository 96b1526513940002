use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use ip_relay_common::api::{self, GetIpRequest, GetIpResponse, IpLookupResponse};

use crate::auth::AuthError;
use crate::client_ip::ClientIp;
use crate::error::ApiError;
use crate::store::StoreError;
use crate::AppState;

/// Why a login failed. Both kinds reach the client as the same 401.
#[derive(Debug, thiserror::Error)]
enum LoginError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LoginError {
    fn log(&self) {
        match self {
            LoginError::Auth(e) => tracing::warn!(category = "auth", "Error in /get-ip: {}", e),
            LoginError::Storage(e) => {
                tracing::error!(category = "storage", "Error in /get-ip: {}", e)
            }
        }
    }
}

async fn register_and_record(
    state: &AppState,
    id_token: &str,
    ip: String,
) -> Result<GetIpResponse, LoginError> {
    let verified = state.verifier.verify_id_token(id_token).await?;
    let user = state.verifier.get_user(&verified.uid).await?;
    let email = user.email.unwrap_or_default();

    state.users.ensure_profile(&verified.uid, &email).await?;

    tracing::info!(uid = %verified.uid, email = %email, ip = %ip, "User login");
    state.users.record_ip(&verified.uid, &ip).await?;

    Ok(GetIpResponse {
        uid: verified.uid,
        email,
        ip,
    })
}

/// POST /get-ip - verify an ID token, register the user and record their IP
async fn get_ip(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    request: Option<Json<GetIpRequest>>,
) -> Result<Json<GetIpResponse>, ApiError> {
    let id_token = request
        .as_ref()
        .and_then(|Json(request)| request.token())
        .ok_or(ApiError::MissingInput(api::MISSING_ID_TOKEN))?;

    register_and_record(&state, id_token, ip)
        .await
        .map(Json)
        .map_err(|e| {
            e.log();
            ApiError::Unauthorized
        })
}

/// GET /get-ip-by-uid/:uid - last recorded IP of a user
async fn get_ip_by_uid(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<IpLookupResponse>, ApiError> {
    if uid.trim().is_empty() {
        return Err(ApiError::MissingInput(api::MISSING_UID));
    }

    match state.users.ip_record(&uid).await {
        Ok(Some(record)) => Ok(Json(IpLookupResponse {
            uid,
            ip: record.ip,
            last_login: record.last_login,
        })),
        Ok(None) => Err(ApiError::NotFound(api::NO_IP_DATA)),
        Err(e) => {
            tracing::error!(uid = %uid, "Error fetching IP data: {}", e);
            Err(ApiError::Internal)
        }
    }
}

async fn missing_uid() -> ApiError {
    ApiError::MissingInput(api::MISSING_UID)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get-ip", post(get_ip))
        .route("/get-ip-by-uid/", get(missing_uid))
        .route("/get-ip-by-uid/:uid", get(get_ip_by_uid))
        .with_state(state)
}
