use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{resolve_server_timestamps, Document, DocumentStore, StoreError};

/// SQLite-backed document store for local deployments.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                fields TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )",
            [],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("Document store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write(&self, sql: &str, collection: &str, key: &str, document: Document) -> Result<usize, StoreError> {
        let now = Utc::now();
        let fields = serde_json::to_string(&resolve_server_timestamps(document, now))
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(sql, params![collection, key, fields, now.to_rfc3339()])
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let fields: Option<String> = {
            let conn = self
                .conn
                .lock()
                .map_err(|e| StoreError::Database(e.to_string()))?;

            conn.query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?
        };

        fields
            .map(|f| serde_json::from_str(&f).map_err(|e| StoreError::Malformed(e.to_string())))
            .transpose()
    }

    async fn set(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError> {
        self.write(
            "INSERT OR REPLACE INTO documents (collection, key, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            collection,
            key,
            document,
        )?;
        tracing::debug!("Stored {}/{}", collection, key);
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<bool, StoreError> {
        let inserted = self.write(
            "INSERT OR IGNORE INTO documents (collection, key, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            collection,
            key,
            document,
        )?;
        Ok(inserted == 1)
    }
}
