//! HTTP implementation of the graph query protocol.
//!
//! Speaks a transactional commit endpoint: one POST carrying a statement
//! plus named parameters, answered with self-describing columns and rows.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::GatewaySettings;
use crate::error::GatewayError;
use crate::gateway::{GraphGateway, GraphSchema};
use crate::types::GraphRecord;

const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label";
const RELATIONSHIP_TYPES_QUERY: &str =
    "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType";
const PROPERTY_KEYS_QUERY: &str = "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey";

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Gateway backed by the store's HTTP transaction endpoint.
pub struct HttpGateway {
    client: reqwest::Client,
    commit_url: String,
    username: Option<String>,
    password: Option<String>,
    deadline: Duration,
    schema_cache: RwLock<Option<GraphSchema>>,
}

impl HttpGateway {
    pub fn new(settings: &GatewaySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            commit_url: format!(
                "{}/db/{}/tx/commit",
                settings.endpoint.trim_end_matches('/'),
                settings.database
            ),
            username: None,
            password: None,
            deadline: settings.query_timeout(),
            schema_cache: RwLock::new(None),
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    async fn post_statement(
        &self,
        query: &str,
        params: Value,
    ) -> Result<Vec<GraphRecord>, GatewayError> {
        let body = json!({
            "statements": [{ "statement": query, "parameters": params }]
        });

        let mut request = self.client.post(&self.commit_url).json(&body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = tokio::time::timeout(self.deadline, request.send())
            .await
            .map_err(|_| GatewayError::Timeout(self.deadline))?
            .map_err(classify_transport_error)?;

        let parsed: TxResponse = tokio::time::timeout(self.deadline, response.json())
            .await
            .map_err(|_| GatewayError::Timeout(self.deadline))?
            .map_err(|e| GatewayError::Query(format!("malformed store response: {e}")))?;

        if let Some(error) = parsed.errors.first() {
            return Err(GatewayError::Query(format!(
                "{}: {}",
                error.code, error.message
            )));
        }

        let result = parsed.results.into_iter().next().unwrap_or(TxResult {
            columns: Vec::new(),
            data: Vec::new(),
        });

        let records = result
            .data
            .into_iter()
            .map(|row| {
                GraphRecord::from_pairs(
                    result
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.row.into_iter())
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        Ok(records)
    }

    async fn fetch_schema(&self) -> Result<GraphSchema, GatewayError> {
        let node_labels = self.fetch_column(LABELS_QUERY, "label").await?;
        let relationship_types = self
            .fetch_column(RELATIONSHIP_TYPES_QUERY, "relationshipType")
            .await?;
        let property_names = self.fetch_column(PROPERTY_KEYS_QUERY, "propertyKey").await?;

        Ok(GraphSchema {
            node_labels,
            relationship_types,
            property_names,
        })
    }

    async fn fetch_column(&self, query: &str, column: &str) -> Result<Vec<String>, GatewayError> {
        let records = self.post_statement(query, json!({})).await?;
        Ok(records
            .iter()
            .filter_map(|record| record.get_str(column).map(str::to_string))
            .collect())
    }
}

fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(Duration::ZERO)
    } else {
        GatewayError::Connection(error.to_string())
    }
}

#[async_trait]
impl GraphGateway for HttpGateway {
    async fn execute(&self, query: &str, params: Value) -> Result<Vec<GraphRecord>, GatewayError> {
        debug!(query, "executing graph query");
        self.post_statement(query, params).await
    }

    async fn schema(&self) -> Result<GraphSchema, GatewayError> {
        if let Some(schema) = self.schema_cache.read().await.clone() {
            return Ok(schema);
        }
        self.refresh_schema().await
    }

    async fn refresh_schema(&self) -> Result<GraphSchema, GatewayError> {
        let schema = self.fetch_schema().await?;
        *self.schema_cache.write().await = Some(schema.clone());
        Ok(schema)
    }
}
