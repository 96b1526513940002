use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use ip_relay_backend::auth::{AccessTokenProvider, FirebaseAuth};
use ip_relay_backend::config::StoreBackend;
use ip_relay_backend::store::{DocumentStore, FirestoreStore, MemoryStore, SqliteStore};
use ip_relay_backend::{logging, AppState, Config};

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    logging::init_tracing(&config.logging);

    tracing::info!("Starting ip-relay {}", env!("CARGO_PKG_VERSION"));

    // Initialize components
    let service_account = config.service_account()?;
    let project_id = config.project_id(&service_account);
    let http_client = reqwest::Client::new();

    let tokens = Arc::new(AccessTokenProvider::new(
        http_client.clone(),
        &service_account,
        config.firebase.token_uri.as_deref(),
    )?);

    let verifier = FirebaseAuth::new(
        http_client.clone(),
        tokens.clone(),
        &project_id,
        &config.firebase,
    );
    if let Err(e) = verifier.prefetch_keys().await {
        tracing::warn!("Could not prefetch token signing keys, will retry on demand: {}", e);
    }

    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Firestore => Arc::new(FirestoreStore::new(
            http_client,
            tokens,
            &config.firebase.firestore_url,
            &project_id,
        )?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::new(&config.store.sqlite_path)?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!(
        "Firebase project {}, {:?} store",
        project_id,
        config.store.backend
    );

    let state = Arc::new(AppState::new(Arc::new(verifier), store));
    let app = ip_relay_backend::app(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
