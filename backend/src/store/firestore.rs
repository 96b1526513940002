use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{Document, DocumentStore, FieldValue, StoreError};
use crate::auth::AccessTokenProvider;

/// Firestore REST document.
#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Cloud Firestore over its REST API.
pub struct FirestoreStore {
    http_client: Client,
    tokens: Arc<AccessTokenProvider>,
    /// `projects/{project}/databases/(default)`
    database: String,
    documents_url: Url,
}

impl FirestoreStore {
    pub fn new(
        http_client: Client,
        tokens: Arc<AccessTokenProvider>,
        base_url: &str,
        project_id: &str,
    ) -> Result<Self, StoreError> {
        let database = format!("projects/{}/databases/(default)", project_id);
        let documents_url = Url::parse(&format!(
            "{}/{}/documents",
            base_url.trim_end_matches('/'),
            database
        ))
        .map_err(|e| StoreError::Request(format!("Invalid Firestore URL: {}", e)))?;

        Ok(Self {
            http_client,
            tokens,
            database,
            documents_url,
        })
    }

    fn document_name(&self, collection: &str, key: &str) -> String {
        format!("{}/documents/{}/{}", self.database, collection, key)
    }

    fn document_url(&self, collection: &str, key: &str) -> Result<Url, StoreError> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Request("Firestore URL cannot be a base".to_string()))?
            .push(collection)
            .push(key);
        Ok(url)
    }

    fn commit_url(&self) -> String {
        format!("{}:commit", self.documents_url)
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        self.tokens
            .access_token()
            .await
            .map_err(|e| StoreError::Credentials(e.to_string()))
    }

    fn commit_body(&self, collection: &str, key: &str, document: &Document, must_not_exist: bool) -> Value {
        let mut fields = Map::new();
        let mut transforms = Vec::new();

        for (name, value) in document {
            match encode_value(value) {
                Some(encoded) => {
                    fields.insert(name.clone(), encoded);
                }
                None => transforms.push(json!({
                    "fieldPath": field_path(name),
                    "setToServerValue": "REQUEST_TIME",
                })),
            }
        }

        let mut write = json!({
            "update": {
                "name": self.document_name(collection, key),
                "fields": fields,
            }
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = Value::Array(transforms);
        }
        if must_not_exist {
            write["currentDocument"] = json!({ "exists": false });
        }

        json!({ "writes": [write] })
    }

    async fn commit(&self, body: &Value) -> Result<Response, StoreError> {
        let token = self.access_token().await?;
        self.http_client
            .post(self.commit_url())
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        validate_key(key)?;
        let url = self.document_url(collection, key)?;
        let token = self.access_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let (status, error) = read_error(response).await;
            return Err(StoreError::Upstream {
                status,
                message: error.message,
            });
        }

        let document: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        Ok(Some(decode_fields(document.fields)))
    }

    async fn set(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError> {
        validate_key(key)?;
        let body = self.commit_body(collection, key, &document, false);
        let response = self.commit(&body).await?;

        if !response.status().is_success() {
            let (status, error) = read_error(response).await;
            return Err(StoreError::Upstream {
                status,
                message: error.message,
            });
        }

        tracing::debug!("Committed {}/{}", collection, key);
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<bool, StoreError> {
        validate_key(key)?;
        let body = self.commit_body(collection, key, &document, true);
        let response = self.commit(&body).await?;

        if response.status().is_success() {
            return Ok(true);
        }

        let (status, error) = read_error(response).await;
        if status == StatusCode::CONFLICT.as_u16()
            || error.status == "ALREADY_EXISTS"
            || error.status == "FAILED_PRECONDITION"
        {
            tracing::debug!("{}/{} already exists", collection, key);
            return Ok(false);
        }

        Err(StoreError::Upstream {
            status,
            message: error.message,
        })
    }
}

async fn read_error(response: Response) -> (u16, ErrorBody) {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => envelope.error,
        Err(_) => ErrorBody {
            message: text,
            ..Default::default()
        },
    };
    (status, body)
}

/// Firestore document ids cannot contain `/`, be `.` or `..`, or look like `__name__`.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let reserved = key.len() >= 4 && key.starts_with("__") && key.ends_with("__");
    if key.is_empty() || key.contains('/') || key == "." || key == ".." || reserved {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn encode_value(value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::String(s) => Some(json!({ "stringValue": s })),
        FieldValue::Timestamp(ts) => Some(json!({
            "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true)
        })),
        FieldValue::ServerTimestamp => None,
    }
}

fn decode_value(value: &Value) -> Option<FieldValue> {
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Some(FieldValue::String(s.to_string()));
    }
    value
        .get("timestampValue")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
}

fn decode_fields(fields: Map<String, Value>) -> Document {
    fields
        .into_iter()
        .filter_map(|(name, value)| match decode_value(&value) {
            Some(decoded) => Some((name, decoded)),
            None => {
                tracing::debug!("Skipping unsupported Firestore field {}", name);
                None
            }
        })
        .collect()
}
