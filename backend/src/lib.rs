pub mod auth;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod routes;
pub mod store;
pub mod test_util;

pub use auth::{FirebaseAuth, IdentityVerifier};
pub use crate::config::Config;
pub use repository::UserRepository;
pub use store::DocumentStore;

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub users: UserRepository,
}

impl AppState {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            verifier,
            users: UserRepository::new(store),
        }
    }
}

/// Build the full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::ip::router(state))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
