use super::knowledge_store::KnowledgeStore;
use crate::storage::RetrievedPassage;
use anyhow::{Result, anyhow};

/// Turns a text query into the best matching stored passages.
#[derive(Debug, Clone)]
pub struct Retriever {
    knowledge: KnowledgeStore,
    top_k: usize,
    threshold: f32,
}

impl Retriever {
    /// Creates a retriever returning at most `top_k` passages scoring at least `threshold`.
    pub fn new(knowledge: KnowledgeStore, top_k: usize, threshold: f32) -> Result<Self> {
        if top_k == 0 {
            return Err(anyhow!("top_k must be greater than zero"));
        }
        if !threshold.is_finite() {
            return Err(anyhow!("score threshold must be a finite number"));
        }
        Ok(Self {
            knowledge,
            top_k,
            threshold,
        })
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Retrieves with the configured `top_k` and threshold.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        self.retrieve_with(query, self.top_k, self.threshold).await
    }

    /// Retrieves with explicit limits. An empty result is not an error.
    pub async fn retrieve_with(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        if top_k == 0 {
            return Err(anyhow!("top_k must be greater than zero"));
        }

        let query_vector = self.knowledge.embedder().embed_text(query).await?;
        let passages = self
            .knowledge
            .search(&query_vector, top_k, threshold)
            .await?;

        tracing::debug!(
            "Retrieved {} passages (top_k {}, threshold {}) for query {:?}",
            passages.len(),
            top_k,
            threshold,
            query
        );
        Ok(passages)
    }
}
