//! ChromaDB-backed [`VectorStore`] implementation.
//!
//! Talks to a Chroma server over its v1 REST API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | heartbeat | `GET /api/v1/heartbeat` |
//! | open collection | `POST /api/v1/collections` (`get_or_create`, cosine space) |
//! | lookup / filter | `POST /api/v1/collections/{id}/get` |
//! | upsert | `POST /api/v1/collections/{id}/upsert` |
//! | delete | `POST /api/v1/collections/{id}/delete` |
//! | count | `GET /api/v1/collections/{id}/count` |
//!
//! Chroma only accepts flat metadata (string, number, boolean), which is
//! exactly what [`Metadata`](crate::models::Metadata) can hold.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::{flatten_metadata, metadata_to_json, MetadataValue, StoredRecord, UpsertRecord};

use super::{MetadataFilter, VectorStore};

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection_id: String,
}

impl ChromaStore {
    /// Connect to the server at `url` and get or create `collection`.
    ///
    /// # Errors
    ///
    /// Fails if the server is unreachable or rejects the collection request.
    pub async fn connect(url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{}/api/v1/collections", base_url))
            .json(&json!({
                "name": collection,
                "metadata": { "hnsw:space": "cosine" },
                "get_or_create": true,
            }))
            .send()
            .await
            .with_context(|| format!("Chroma server not reachable at {}", base_url))?;
        let body = check(resp).await?;

        let collection_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Invalid Chroma response: missing collection id"))?
            .to_string();

        tracing::debug!(collection, collection_id = %collection_id, "chroma collection ready");

        Ok(Self {
            client,
            base_url,
            collection_id,
        })
    }

    fn endpoint(&self, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, self.collection_id, op
        )
    }

    async fn post(&self, op: &str, body: &Value) -> Result<Value> {
        let resp = self.client.post(self.endpoint(op)).json(body).send().await?;
        check(resp).await
    }
}

/// Return the JSON body of a successful response, or an error with the body text.
async fn check(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        bail!("Chroma API error {}: {}", status, body_text);
    }
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn include_fields(include_embeddings: bool) -> Value {
    if include_embeddings {
        json!(["embeddings", "documents", "metadatas"])
    } else {
        json!(["documents", "metadatas"])
    }
}

fn filter_to_where(filter: &MetadataFilter) -> Value {
    let value = match &filter.value {
        MetadataValue::Str(s) => json!(s),
        MetadataValue::Int(i) => json!(i),
        MetadataValue::Float(f) => json!(f),
        MetadataValue::Bool(b) => json!(b),
    };
    let mut clause = serde_json::Map::new();
    clause.insert(filter.key.clone(), value);
    Value::Object(clause)
}

/// Parse the column-oriented body of a `/get` response into records.
pub(crate) fn parse_get_response(body: &Value, include_embeddings: bool) -> Result<Vec<StoredRecord>> {
    let ids = body
        .get("ids")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Invalid Chroma response: missing ids array"))?;

    let column = |name: &str| body.get(name).and_then(|v| v.as_array());
    let embeddings = column("embeddings");
    let documents = column("documents");
    let metadatas = column("metadatas");

    let mut records = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let id = id
            .as_str()
            .ok_or_else(|| anyhow!("Invalid Chroma response: id is not a string"))?;

        let embedding = if include_embeddings {
            embeddings
                .and_then(|e| e.get(i))
                .and_then(|v| v.as_array())
                .filter(|v| !v.is_empty())
                .map(|v| {
                    v.iter()
                        .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                        .collect::<Vec<f32>>()
                })
        } else {
            None
        };

        let document = documents
            .and_then(|d| d.get(i))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let metadata = match metadatas.and_then(|m| m.get(i)) {
            Some(v) => flatten_metadata(v)?,
            None => Default::default(),
        };

        records.push(StoredRecord {
            id: id.to_string(),
            embedding,
            document,
            metadata,
        });
    }

    Ok(records)
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn heartbeat(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await
            .with_context(|| format!("Chroma server not reachable at {}", self.base_url))?;
        check(resp).await?;
        Ok(())
    }

    async fn get_by_ids(
        &self,
        ids: &[String],
        include_embeddings: bool,
    ) -> Result<Vec<StoredRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .post(
                "get",
                &json!({ "ids": ids, "include": include_fields(include_embeddings) }),
            )
            .await?;
        parse_get_response(&body, include_embeddings)
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<StoredRecord>> {
        let body = self
            .post(
                "get",
                &json!({ "where": filter_to_where(filter), "include": include_fields(false) }),
            )
            .await?;
        parse_get_response(&body, false)
    }

    async fn upsert(&self, records: &[UpsertRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| metadata_to_json(&r.metadata)).collect::<Vec<_>>(),
        });
        self.post("upsert", &body).await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("delete", &json!({ "ids": ids })).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let resp = self.client.get(self.endpoint("count")).send().await?;
        let body = check(resp).await?;
        body.as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| anyhow!("Invalid Chroma response: count is not a number"))
    }

    async fn peek(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let body = self
            .post("get", &json!({ "limit": limit, "include": include_fields(false) }))
            .await?;
        parse_get_response(&body, false)
    }
}
