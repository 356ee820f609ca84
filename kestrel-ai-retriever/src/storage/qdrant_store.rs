//! Qdrant implementation of [`VectorStore`] over its REST API.
//!
//! Passages are stored with the payload layout LangChain-style loaders use
//! (`page_content` plus a `metadata` object), so collections filled by other
//! tools can be searched as well.

use super::{CollectionInfo, PassageSummary, RetrievedPassage, StoredPoint, VectorStore, rank};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use half::f16;
use serde_json::{Value, json};
use std::collections::BTreeMap;

const CONTENT_KEY: &str = "page_content";
const METADATA_KEY: &str = "metadata";

/// Qdrant-backed vector store for a single collection.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    collection: String,
    client: reqwest::Client,
}

impl QdrantStore {
    /// Creates a client for `collection` on the server at `base_url`.
    ///
    /// No request is made until the store is used.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            collection: collection.into(),
            client: reqwest::Client::new(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    /// Sends a request and returns the `result` member of the response.
    async fn call(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .with_context(|| format!("qdrant {what} request failed"))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("qdrant {what} returned an unreadable body"))?;

        if !status.is_success() {
            let message = body
                .pointer("/status/error")
                .and_then(|e| e.as_str())
                .unwrap_or("no error message");
            return Err(anyhow!("qdrant {what} failed with HTTP {status}: {message}"));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Qdrant only accepts unsigned integers or UUIDs as point ids, so the hex id
/// is folded into UUID form.
pub fn qdrant_point_id(id: &str) -> String {
    let hex: String = id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .chain(std::iter::repeat('0'))
        .take(32)
        .collect::<String>()
        .to_ascii_lowercase();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn point_body(point: &StoredPoint) -> Value {
    let vector: Vec<f32> = point.vector.iter().map(|v| v.to_f32()).collect();
    json!({
        "id": qdrant_point_id(&point.id),
        "vector": vector,
        "payload": {
            CONTENT_KEY: point.text,
            METADATA_KEY: point.metadata,
            "kestrel_id": point.id,
        }
    })
}

fn payload_metadata(payload: &Value) -> BTreeMap<String, String> {
    payload
        .get(METADATA_KEY)
        .and_then(|m| m.as_object())
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn payload_text(payload: &Value) -> String {
    payload
        .get(CONTENT_KEY)
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Parses the `result` of a search call.
pub fn parse_search_result(result: &Value) -> Result<Vec<RetrievedPassage>> {
    let hits = result
        .as_array()
        .ok_or_else(|| anyhow!("qdrant search result is not an array"))?;

    hits.iter()
        .map(|hit| {
            let score = hit
                .get("score")
                .and_then(|s| s.as_f64())
                .ok_or_else(|| anyhow!("qdrant search hit has no score"))?;
            let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
            Ok(RetrievedPassage {
                text: payload_text(&payload),
                score: score as f32,
                metadata: payload_metadata(&payload),
            })
        })
        .collect()
}

/// Parses the `result` of a collection info call.
pub fn parse_collection_info(name: &str, result: &Value) -> Result<CollectionInfo> {
    let vectors = result
        .pointer("/config/params/vectors")
        .ok_or_else(|| anyhow!("qdrant collection '{name}' has no vector parameters"))?;
    let dimension = vectors
        .get("size")
        .and_then(|s| s.as_u64())
        .ok_or_else(|| {
            anyhow!("qdrant collection '{name}' uses named vectors, expected a single unnamed vector")
        })?;
    let points = result
        .get("points_count")
        .and_then(|p| p.as_u64())
        .unwrap_or(0);

    Ok(CollectionInfo {
        name: name.to_string(),
        dimension: dimension as usize,
        points: points as usize,
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn backend_name(&self) -> &str {
        "qdrant"
    }

    async fn create_collection(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(anyhow!("collection dimension must be greater than zero"));
        }
        let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
        self.call(
            self.request(reqwest::Method::PUT, self.collection_url())
                .json(&body),
            "create collection",
        )
        .await?;

        tracing::info!(
            "Created qdrant collection '{}' with dimension {}",
            self.collection,
            dimension
        );
        Ok(())
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let response = self
            .request(reqwest::Method::GET, self.collection_url())
            .send()
            .await
            .context("qdrant collection info request failed")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("qdrant collection info failed with HTTP {status}"));
        }

        let body: Value = response.json().await?;
        let result = body.get("result").cloned().unwrap_or(Value::Null);
        parse_collection_info(&self.collection, &result).map(Some)
    }

    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let body = json!({ "points": points.iter().map(point_body).collect::<Vec<_>>() });
        self.call(
            self.request(
                reqwest::Method::PUT,
                format!("{}/points?wait=true", self.collection_url()),
            )
            .json(&body),
            "upsert",
        )
        .await?;

        tracing::debug!(
            "Upserted {} points into qdrant collection '{}'",
            points.len(),
            self.collection
        );
        Ok(points.len())
    }

    async fn search(
        &self,
        query: &[f16],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        let vector: Vec<f32> = query.iter().map(|v| v.to_f32()).collect();
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "score_threshold": threshold,
            "with_payload": true,
        });

        let result = self
            .call(
                self.request(
                    reqwest::Method::POST,
                    format!("{}/points/search", self.collection_url()),
                )
                .json(&body),
                "search",
            )
            .await?;

        // The server already filters and orders; re-rank so the contract holds
        // regardless of server-side rounding.
        Ok(rank(parse_search_result(&result)?, top_k, threshold))
    }

    async fn list(&self, limit: usize) -> Result<Vec<PassageSummary>> {
        let body = json!({ "limit": limit, "with_payload": true, "with_vector": false });
        let result = self
            .call(
                self.request(
                    reqwest::Method::POST,
                    format!("{}/points/scroll", self.collection_url()),
                )
                .json(&body),
                "scroll",
            )
            .await?;

        let points = result
            .get("points")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow!("qdrant scroll result has no points"))?;

        Ok(points
            .iter()
            .map(|point| {
                let payload = point.get("payload").cloned().unwrap_or(Value::Null);
                let id = match point.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                PassageSummary {
                    id,
                    text: payload_text(&payload),
                    metadata: payload_metadata(&payload),
                }
            })
            .collect())
    }
}
