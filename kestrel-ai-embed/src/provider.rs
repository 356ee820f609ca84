//! Embedding provider trait and the local fastembed implementation

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector, or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Get the model the provider runs
    fn model_name(&self) -> &str;
}

/// Converts a raw vector to unit-length f16.
///
/// The norm is computed in f32 before narrowing so that rounding does not
/// accumulate. Zero vectors are returned unchanged.
pub fn normalize_to_f16(embedding: &[f32]) -> Vec<f16> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    let scale = if norm > 0.0 { 1.0 / norm } else { 1.0 };
    embedding.iter().map(|x| f16::from_f32(x * scale)).collect()
}

/// Ensures every vector has `expected` entries and only finite values.
pub fn check_vectors(vectors: &[Vec<f32>], expected: Option<usize>) -> Result<usize> {
    let dimension = match (expected, vectors.first()) {
        (Some(dimension), _) => dimension,
        (None, Some(first)) => first.len(),
        (None, None) => return Ok(0),
    };
    if dimension == 0 {
        return Err(EmbedError::invalid_config("empty embedding vector"));
    }

    for vector in vectors {
        if vector.len() != dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(EmbedError::invalid_config(
                "non-finite values in embedding",
            ));
        }
    }
    Ok(dimension)
}

/// Maps a fastembed model name to the built-in model it selects.
pub fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name.trim().to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            Ok(EmbeddingModel::NomicEmbedTextV15)
        }
        other => Err(EmbedError::invalid_config(format!(
            "'{other}' is not a built-in fastembed model \
             (try all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5 or nomic-embed-text-v1.5)"
        ))),
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Loaded models shared by every provider in the process, keyed by model and cache dir
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> Result<MutexGuard<'static, HashMap<String, ModelCacheEntry>>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| EmbedError::invalid_config("embedding model cache is poisoned"))
}

fn lock_model(model: &Mutex<TextEmbedding>) -> Result<MutexGuard<'_, TextEmbedding>> {
    model
        .lock()
        .map_err(|_| EmbedError::invalid_config("embedding model lock is poisoned"))
}

/// FastEmbed-based embedding provider running ONNX models in-process
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Loads (downloading on first use) the configured built-in model.
    ///
    /// Models are cached process-wide, so creating a second provider for the
    /// same model is cheap.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let cache_key = Self::cache_key(&config);

        let cached = model_cache()?
            .get(&cache_key)
            .map(|(model, dimension)| (Arc::clone(model), *dimension));
        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", config.model_name());
            return Ok(Self {
                config,
                model,
                dimension,
            });
        }

        tracing::info!("Loading fastembed model: {}", config.model_name());
        let builtin = builtin_model(config.model_name())?;
        let cache_dir = config.cache_dir.clone();

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let mut init_options =
                    InitOptions::new(builtin).with_show_download_progress(false);
                if let Some(dir) = cache_dir {
                    init_options = init_options.with_cache_dir(dir);
                }

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::External { source: e })?;

                // Probe once to learn the dimension and catch broken models early
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::External { source: e })?;
                let dimension = check_vectors(&probe, None)?;
                Ok((model, dimension))
            })
            .await??;

        tracing::info!(
            "Model {} loaded successfully. Dimension: {}",
            config.model_name(),
            dimension
        );

        let model = Arc::new(Mutex::new(model));
        model_cache()?.insert(cache_key, (Arc::clone(&model), dimension));

        Ok(Self {
            config,
            model,
            dimension,
        })
    }

    fn cache_key(config: &EmbedConfig) -> String {
        format!(
            "{}|{}",
            config.model_name().to_ascii_lowercase(),
            config
                .cache_dir
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        )
    }

    /// Clears the process-wide model cache.
    pub fn clear_cache() -> Result<()> {
        model_cache()?.clear();
        tracing::info!("Model cache cleared");
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(&self.model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = lock_model(&model)?;
                guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            check_vectors(&batch, Some(self.dimension))?;
            all_embeddings.extend(batch.iter().map(|v| normalize_to_f16(v)));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }
}
