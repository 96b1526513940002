//! Configuration for the relay.

use std::env;

use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::auth::ServiceAccountKey;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub firebase: FirebaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Firebase project access.
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    /// Service account key as a JSON string (FIREBASE_SERVICE_ACCOUNT).
    #[serde(default)]
    pub service_account: Option<String>,
    /// Overrides the service account's project_id.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    #[serde(default = "default_identity_toolkit_url")]
    pub identity_toolkit_url: String,
    #[serde(default = "default_firestore_url")]
    pub firestore_url: String,
    /// Overrides the service account's token_uri.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            service_account: None,
            project_id: None,
            jwks_url: default_jwks_url(),
            identity_toolkit_url: default_identity_toolkit_url(),
            firestore_url: default_firestore_url(),
            token_uri: None,
        }
    }
}

/// Which document store backs the `users` and `user_ips` collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Firestore,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database path, only read by the sqlite backend.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Missing required environment variable: FIREBASE_SERVICE_ACCOUNT")]
    MissingServiceAccount,
    #[error("Invalid service account JSON: {0}")]
    InvalidServiceAccount(String),
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_jwks_url() -> String {
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
        .to_string()
}
fn default_identity_toolkit_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}
fn default_firestore_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}
fn default_sqlite_path() -> String {
    "./data/ip-relay.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. `PORT` and `FIREBASE_SERVICE_ACCOUNT`
    /// 2. Environment variables (RELAY__SECTION__KEY format)
    /// 3. config.toml file (if present)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("port", env::var("PORT").ok())?
            .set_override_option(
                "firebase.service_account",
                env::var("FIREBASE_SERVICE_ACCOUNT").ok(),
            )?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a TOML document on top of the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(ConfigLoader::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?)
    }

    /// Parse the configured service account key.
    pub fn service_account(&self) -> Result<ServiceAccountKey, ConfigError> {
        let json = self
            .firebase
            .service_account
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingServiceAccount)?;

        ServiceAccountKey::from_json(json)
            .map_err(|e| ConfigError::InvalidServiceAccount(e.to_string()))
    }

    /// The Firebase project to verify tokens for and store documents in.
    pub fn project_id(&self, key: &ServiceAccountKey) -> String {
        self.firebase
            .project_id
            .clone()
            .unwrap_or_else(|| key.project_id.clone())
    }
}
