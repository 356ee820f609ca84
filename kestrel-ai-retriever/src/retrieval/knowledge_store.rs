//! Embedding-aware front of a [`VectorStore`].

use crate::storage::{
    CollectionError, CollectionInfo, RetrievedPassage, StoredPoint, VectorStore, verify_collection,
};
use anyhow::{Result, anyhow};
use half::f16;
use kestrel_ai_context::PassageChunk;
use kestrel_ai_embed::EmbeddingProvider;
use std::sync::Arc;

/// Pairs an embedder with the store holding its vectors.
///
/// Cheap to clone; independent sessions can share one instance.
#[derive(Clone)]
pub struct KnowledgeStore {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("embedder", &self.embedder.model_name())
            .field("backend", &self.store.backend_name())
            .field("collection", &self.store.collection())
            .finish()
    }
}

impl KnowledgeStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Checks that the collection exists and matches the embedder's dimension.
    pub async fn verify(&self) -> std::result::Result<CollectionInfo, CollectionError> {
        verify_collection(self.store.as_ref(), self.embedder.embedding_dimension()).await
    }

    /// Embeds every chunk, then writes the whole batch at once.
    ///
    /// Nothing is written unless every chunk was embedded. Returns the number
    /// of points written.
    pub async fn upsert(&self, chunks: &[PassageChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let result = self.embedder.embed_texts(&texts).await?;
        if result.len() != chunks.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} chunks",
                result.len(),
                chunks.len()
            ));
        }

        let points: Vec<StoredPoint> = chunks
            .iter()
            .zip(result.embeddings)
            .map(|(chunk, vector)| {
                StoredPoint::new(chunk.text.clone(), chunk.metadata.clone(), vector)
            })
            .collect();

        let written = self.store.upsert(points).await?;
        tracing::info!(
            "Stored {} passages in '{}'",
            written,
            self.store.collection()
        );
        Ok(written)
    }

    /// Similarity search with an already-embedded query.
    pub async fn search(
        &self,
        query_vector: &[f16],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        self.store.search(query_vector, top_k, threshold).await
    }
}
