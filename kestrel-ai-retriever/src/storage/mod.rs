//! Storage abstraction layer for kestrel-ai-retriever
//!
//! A [`VectorStore`] owns one named collection of embedded passages. Two
//! backends implement it:
//!
//! ```text
//!               ┌─ SqliteStore  (local file or in-memory, cosine scored in process)
//! VectorStore ──┤
//!               └─ QdrantStore  (Qdrant REST API, cosine scored by the server)
//! ```
//!
//! Collections are created out-of-band (the `kestrel-ai-retriever init`
//! command, or Qdrant's own tooling). Callers use [`verify_collection`] at
//! start-up to check that the collection exists and that its dimension matches
//! the embedder's.

use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use serde::Serialize;
use std::collections::BTreeMap;

pub mod qdrant_store;
pub mod sqlite_store;

/// A passage with its vector, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    /// Stable identity; writing the same id twice replaces the earlier point
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub vector: Vec<f16>,
}

impl StoredPoint {
    /// Builds a point whose id is derived from its text and metadata.
    pub fn new(text: String, metadata: BTreeMap<String, String>, vector: Vec<f16>) -> Self {
        let id = point_id(&text, &metadata);
        Self {
            id,
            text,
            metadata,
            vector,
        }
    }
}

/// A passage returned by a similarity search, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

/// A stored passage without its vector, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassageSummary {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Shape and size of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub points: usize,
}

/// Problems with the collection that are fixed by configuration, not retries.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("collection '{collection}' does not exist; create it with dimension {dimension}")]
    Missing { collection: String, dimension: usize },

    #[error(
        "collection '{collection}' stores {actual}-dimensional vectors but the embedder produces {expected}"
    )]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("could not inspect collection '{collection}': {source}")]
    Unavailable {
        collection: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Vector similarity storage for one collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this store reads and writes
    fn collection(&self) -> &str;

    /// Name of the backend, for logs and banners
    fn backend_name(&self) -> &str;

    /// Create the collection for vectors of `dimension` entries
    async fn create_collection(&self, dimension: usize) -> Result<()>;

    /// Describe the collection, or `None` when it does not exist
    async fn collection_info(&self) -> Result<Option<CollectionInfo>>;

    /// Write all points in one operation; either every point is stored or none
    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize>;

    /// Up to `top_k` passages scoring at least `threshold`, highest score first
    async fn search(
        &self,
        query: &[f16],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedPassage>>;

    /// Up to `limit` stored passages in storage order
    async fn list(&self, limit: usize) -> Result<Vec<PassageSummary>>;
}

/// Opens the store addressed by `url`.
///
/// `sqlite::memory:` opens a private in-memory database, `sqlite:<path>` a
/// database file, and anything else is taken as the base URL of a Qdrant server.
pub async fn connect(
    url: &str,
    api_key: Option<String>,
    collection: &str,
) -> Result<std::sync::Arc<dyn VectorStore>> {
    let store: std::sync::Arc<dyn VectorStore> = if url == "sqlite::memory:" {
        std::sync::Arc::new(sqlite_store::SqliteStore::open_memory(collection).await?)
    } else if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        std::sync::Arc::new(
            sqlite_store::SqliteStore::open(std::path::Path::new(path), collection).await?,
        )
    } else {
        std::sync::Arc::new(qdrant_store::QdrantStore::new(url, api_key, collection))
    };

    tracing::debug!(
        "Connected to {} store for collection '{}'",
        store.backend_name(),
        collection
    );
    Ok(store)
}

/// Checks that the store's collection exists with vectors of `dimension` entries.
pub async fn verify_collection(
    store: &dyn VectorStore,
    dimension: usize,
) -> std::result::Result<CollectionInfo, CollectionError> {
    let collection = store.collection().to_string();
    let info = store
        .collection_info()
        .await
        .map_err(|source| CollectionError::Unavailable {
            collection: collection.clone(),
            source,
        })?
        .ok_or_else(|| CollectionError::Missing {
            collection: collection.clone(),
            dimension,
        })?;

    if info.dimension != dimension {
        return Err(CollectionError::DimensionMismatch {
            collection,
            expected: dimension,
            actual: info.dimension,
        });
    }

    tracing::info!(
        "Collection '{}' on {} ready: {} points of dimension {}",
        info.name,
        store.backend_name(),
        info.points,
        info.dimension
    );
    Ok(info)
}

/// Stable identity of a passage: blake3 of its metadata and text, hex encoded.
///
/// Re-ingesting the same document yields the same ids, so the store replaces
/// rather than duplicates its passages.
pub fn point_id(text: &str, metadata: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in metadata {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Cosine similarity of two vectors, computed in f32.
///
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    // One square root, so a vector scored against itself is exactly 1.0
    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        (dot_product / denominator).clamp(-1.0, 1.0)
    }
}

/// Orders passages best first, drops those under `threshold` and keeps `top_k`.
pub(crate) fn rank(
    mut passages: Vec<RetrievedPassage>,
    top_k: usize,
    threshold: f32,
) -> Vec<RetrievedPassage> {
    passages.retain(|p| p.score >= threshold);
    passages.sort_by(|a, b| b.score.total_cmp(&a.score));
    passages.truncate(top_k);
    passages
}
