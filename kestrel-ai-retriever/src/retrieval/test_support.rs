use async_trait::async_trait;
use half::f16;
use kestrel_ai_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bag-of-words embedder: each word bumps one of `DIMENSION` buckets.
///
/// Texts sharing words score high, identical texts score 1.
pub struct WordBucketEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

pub const DIMENSION: usize = 16;

impl WordBucketEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text.split_whitespace() {
            let bucket = blake3::hash(word.to_lowercase().as_bytes()).as_bytes()[0] as usize;
            vector[bucket % DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for WordBucketEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> kestrel_ai_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbedError::invalid_config("embedding service unavailable"));
        }
        let embeddings = texts
            .iter()
            .map(|t| kestrel_ai_embed::provider::normalize_to_f16(&Self::vector(t)))
            .collect::<Vec<Vec<f16>>>();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "word-bucket"
    }

    fn model_name(&self) -> &str {
        "word-bucket-16"
    }
}
