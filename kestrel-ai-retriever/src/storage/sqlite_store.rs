//! SQLite implementation of [`VectorStore`].
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per collection; the dimension is fixed at creation
//! CREATE TABLE collections (
//!     name TEXT PRIMARY KEY,
//!     dimension INTEGER NOT NULL,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Embedded passages, addressed by (collection, id)
//! CREATE TABLE points (
//!     collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
//!     id TEXT NOT NULL,                -- blake3 hex of metadata + text
//!     content TEXT NOT NULL,
//!     metadata TEXT NOT NULL,          -- JSON object of strings
//!     embedding BLOB NOT NULL,         -- little-endian f16 values
//!     updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
//!     PRIMARY KEY (collection, id)
//! );
//! ```
//!
//! Similarity is computed in process over every point of the collection, which
//! is fine for the few thousand passages a monitoring knowledge base holds.

use super::{
    CollectionInfo, PassageSummary, RetrievedPassage, StoredPoint, VectorStore, cosine_similarity,
    rank,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite-backed vector store for a single collection.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path, collection: impl Into<String>) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .with_context(|| format!("failed to open vector database {}", path.display()))?;

        tracing::info!("Opened vector database {}", path.display());
        Self::new_with_pool(pool, collection.into()).await
    }

    /// Opens a private in-memory database, for tests and throwaway sessions.
    pub async fn open_memory(collection: impl Into<String>) -> Result<Self> {
        // Every connection to sqlite::memory: is a separate database, so keep one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool, collection.into()).await
    }

    async fn new_with_pool(pool: SqlitePool, collection: String) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, collection })
    }

    /// Another handle on the same database, addressing a different collection.
    pub fn with_collection(&self, collection: impl Into<String>) -> Self {
        Self {
            pool: self.pool.clone(),
            collection: collection.into(),
        }
    }

    /// Waits for pending writes and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        let dimension = sqlx::query_scalar::<_, i64>(
            "SELECT dimension FROM collections WHERE name = ?1",
        )
        .bind(&self.collection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(dimension.map(|d| d as usize))
    }
}

// Blobs are little-endian regardless of the host.
fn encode_embedding(vector: &[f16]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    // Blob buffers carry no alignment guarantee, so rebuild values bytewise
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn decode_metadata(raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw).context("stored passage metadata is not a JSON object of strings")
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn create_collection(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(anyhow!("collection dimension must be greater than zero"));
        }
        if let Some(existing) = self.dimension().await? {
            if existing != dimension {
                return Err(anyhow!(
                    "collection '{}' already exists with dimension {}",
                    self.collection,
                    existing
                ));
            }
            return Ok(());
        }

        sqlx::query("INSERT INTO collections (name, dimension) VALUES (?1, ?2)")
            .bind(&self.collection)
            .bind(dimension as i64)
            .execute(&self.pool)
            .await?;
        tracing::info!(
            "Created collection '{}' with dimension {}",
            self.collection,
            dimension
        );
        Ok(())
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let Some(dimension) = self.dimension().await? else {
            return Ok(None);
        };
        let points =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM points WHERE collection = ?1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;

        Ok(Some(CollectionInfo {
            name: self.collection.clone(),
            dimension,
            points: points as usize,
        }))
    }

    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let dimension = self
            .dimension()
            .await?
            .ok_or_else(|| anyhow!("collection '{}' does not exist", self.collection))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dimension) {
            return Err(anyhow!(
                "point {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                self.collection,
                dimension
            ));
        }

        let mut tx = self.pool.begin().await?;
        for point in &points {
            let metadata = serde_json::to_string(&point.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO points (collection, id, content, metadata, embedding, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    updated_at = datetime('now')
                "#,
            )
            .bind(&self.collection)
            .bind(&point.id)
            .bind(&point.text)
            .bind(metadata)
            .bind(encode_embedding(&point.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            "Upserted {} points into '{}'",
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
        let rows = sqlx::query(
            "SELECT content, metadata, embedding FROM points WHERE collection = ?1",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query, &decode_embedding(&embedding));
            if score < threshold {
                continue;
            }
            let metadata: String = row.get("metadata");
            scored.push(RetrievedPassage {
                text: row.get("content"),
                score,
                metadata: decode_metadata(&metadata)?,
            });
        }

        Ok(rank(scored, top_k, threshold))
    }

    async fn list(&self, limit: usize) -> Result<Vec<PassageSummary>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata FROM points WHERE collection = ?1 ORDER BY rowid LIMIT ?2",
        )
        .bind(&self.collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let metadata: String = row.get("metadata");
                Ok(PassageSummary {
                    id: row.get("id"),
                    text: row.get("content"),
                    metadata: decode_metadata(&metadata)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::verify_collection;
    use tempfile::tempdir;

    fn point(text: &str, values: &[f32]) -> StoredPoint {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "test.txt".to_string());
        StoredPoint::new(
            text.to_string(),
            metadata,
            values.iter().map(|&v| f16::from_f32(v)).collect(),
        )
    }

    fn query(values: &[f32]) -> Vec<f16> {
        values.iter().map(|&v| f16::from_f32(v)).collect()
    }

    #[tokio::test]
    async fn test_upsert_and_search() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(3).await?;

        let written = store
            .upsert(vec![
                point("cpu alert", &[1.0, 0.0, 0.0]),
                point("memory alert", &[0.0, 1.0, 0.0]),
                point("cpu and memory", &[0.7, 0.7, 0.0]),
            ])
            .await?;
        assert_eq!(written, 3);

        let results = store.search(&query(&[1.0, 0.1, 0.0]), 2, 0.0).await?;
        assert_eq!(results.len(), 2, "top_k should cap the result count");
        assert_eq!(results[0].text, "cpu alert");
        assert_eq!(results[1].text, "cpu and memory");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].metadata.get("source").unwrap(), "test.txt");

        let info = store.collection_info().await?.unwrap();
        assert_eq!(info.points, 3);
        assert_eq!(info.dimension, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_of_one_without_exact_match_is_empty() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(2).await?;
        store.upsert(vec![point("close", &[1.0, 0.01])]).await?;

        let results = store.search(&query(&[1.0, 0.0]), 4, 1.0).await?;
        assert!(results.is_empty());

        let results = store.search(&query(&[1.0, 0.0]), 4, 0.9).await?;
        assert_eq!(results.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_identity_is_last_writer_wins() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(2).await?;

        let first = point("disk full on db-1", &[1.0, 0.0]);
        let mut second = first.clone();
        second.vector = query(&[0.0, 1.0]);

        store.upsert(vec![first]).await?;
        store.upsert(vec![second]).await?;

        assert_eq!(store.collection_info().await?.unwrap().points, 1);
        let results = store.search(&query(&[0.0, 1.0]), 1, 0.9).await?;
        assert_eq!(results.len(), 1, "the second write should have replaced the vector");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_with_bad_dimension_writes_nothing() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(2).await?;

        let result = store
            .upsert(vec![point("ok", &[1.0, 0.0]), point("bad", &[1.0, 0.0, 0.0])])
            .await;
        assert!(result.is_err());
        assert_eq!(store.collection_info().await?.unwrap().points, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_collection() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("absent").await?;
        assert!(store.collection_info().await?.is_none());
        assert!(store.upsert(vec![point("x", &[1.0])]).await.is_err());
        assert!(matches!(
            verify_collection(&store, 3).await,
            Err(crate::storage::CollectionError::Missing { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_collection_dimension() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(384).await?;

        assert!(verify_collection(&store, 384).await.is_ok());
        assert!(matches!(
            verify_collection(&store, 768).await,
            Err(crate::storage::CollectionError::DimensionMismatch {
                expected: 768,
                actual: 384,
                ..
            })
        ));

        // Re-creating with the same dimension is a no-op, a different one fails
        store.create_collection(384).await?;
        assert!(store.create_collection(768).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_collections_are_isolated() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory("monitor").await?;
        store.create_collection(2).await?;
        let other = store.with_collection("runbooks");
        other.create_collection(2).await?;

        store.upsert(vec![point("in monitor", &[1.0, 0.0])]).await?;
        assert_eq!(other.collection_info().await?.unwrap().points, 0);
        assert!(other.search(&query(&[1.0, 0.0]), 4, 0.0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_database() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("vectors.db");

        {
            let store = SqliteStore::open(&path, "monitor").await?;
            store.create_collection(2).await?;
            store.upsert(vec![point("kept", &[0.0, 1.0])]).await?;
            store.close().await;
        }

        let store = SqliteStore::open(&path, "monitor").await?;
        let listed = store.list(10).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "kept");
        Ok(())
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let vector = query(&[0.25, -1.5, 3.0]);
        let bytes = encode_embedding(&vector);
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode_embedding(&bytes), vector);
    }

    #[test]
    fn test_embedding_blob_is_little_endian() {
        let vector = vec![f16::from_f32(1.0), f16::from_f32(-2.0)];
        // 1.0 is 0x3c00 and -2.0 is 0xc000 in binary16
        assert_eq!(encode_embedding(&vector), vec![0x00, 0x3c, 0x00, 0xc0]);
        assert_eq!(decode_embedding(&[0x00, 0x3c, 0x00, 0xc0]), vector);
    }
}
