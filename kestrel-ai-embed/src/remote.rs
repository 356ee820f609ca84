//! Embedding providers backed by HTTP services.
//!
//! Both providers send batches of texts and learn their dimension from a probe
//! request at creation time. Neither sets a request timeout; callers cancel by
//! dropping the future.

use crate::config::{EmbedConfig, EmbedProviderKind};
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, check_vectors, normalize_to_f16};
use async_trait::async_trait;
use serde_json::{Value, json};

const PROBE_TEXT: &str = "dimension probe";

/// Sends `body` to `url` and returns the decoded JSON answer.
async fn post_json(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Value> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| EmbedError::request(provider, e))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(EmbedError::unexpected_response(
            provider,
            format!("HTTP {status}: {text}"),
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| EmbedError::request(provider, e))
}

fn as_vector(provider: &str, value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| EmbedError::unexpected_response(provider, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::unexpected_response(provider, "non-numeric embedding value"))
        })
        .collect()
}

/// Extracts vectors from an Ollama `/api/embed` response.
pub fn parse_ollama_response(body: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = body
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::unexpected_response("ollama", "missing 'embeddings' field"))?;
    embeddings.iter().map(|e| as_vector("ollama", e)).collect()
}

/// Extracts vectors from an OpenAI `/embeddings` response, in input order.
pub fn parse_openai_response(body: &Value) -> Result<Vec<Vec<f32>>> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::unexpected_response("openai", "missing 'data' field"))?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            let embedding = item.get("embedding").ok_or_else(|| {
                EmbedError::unexpected_response("openai", "missing 'embedding' field")
            })?;
            Ok((index, as_vector("openai", embedding)?))
        })
        .collect::<Result<Vec<_>>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

/// Which wire format an [`HttpEmbedder`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    Ollama,
    OpenAi,
}

/// Embedding provider talking to Ollama or an OpenAI-compatible service.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    api: Api,
    config: EmbedConfig,
    base_url: String,
    client: reqwest::Client,
    dimension: usize,
}

impl HttpEmbedder {
    /// Builds the provider and probes the service once to learn the dimension.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut embedder = Self::with_dimension(config, 0)?;
        let probe = embedder.request(&[PROBE_TEXT.to_string()]).await?;
        embedder.dimension = check_vectors(&probe, None)?;

        tracing::info!(
            "Connected to {} embedding model {} at {} (dimension {})",
            embedder.provider_name(),
            embedder.config.model_name(),
            embedder.base_url,
            embedder.dimension
        );
        Ok(embedder)
    }

    /// Builds the provider for a known dimension without contacting the service.
    pub fn with_dimension(config: EmbedConfig, dimension: usize) -> Result<Self> {
        config.validate()?;
        let api = match config.provider {
            EmbedProviderKind::Ollama => Api::Ollama,
            EmbedProviderKind::OpenAi => Api::OpenAi,
            EmbedProviderKind::FastEmbed => {
                return Err(EmbedError::invalid_config(
                    "fastembed runs locally and has no HTTP endpoint",
                ));
            }
        };

        Ok(Self {
            api,
            base_url: config.resolved_base_url(),
            config,
            client: reqwest::Client::new(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        match self.api {
            Api::Ollama => format!("{}/api/embed", self.base_url),
            Api::OpenAi => format!("{}/embeddings", self.base_url),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.config.model_name(),
            "input": texts,
        });

        let response = post_json(
            &self.client,
            self.provider_name(),
            &self.endpoint(),
            self.config.api_key.as_deref(),
            &body,
        )
        .await?;

        let vectors = match self.api {
            Api::Ollama => parse_ollama_response(&response)?,
            Api::OpenAi => parse_openai_response(&response)?,
        };
        if vectors.len() != texts.len() {
            return Err(EmbedError::unexpected_response(
                self.provider_name(),
                format!("asked for {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            tracing::debug!(
                "Requesting {} embeddings from {}",
                batch.len(),
                self.provider_name()
            );
            let vectors = self.request(batch).await?;
            let expected = (self.dimension > 0).then_some(self.dimension);
            check_vectors(&vectors, expected)?;
            embeddings.extend(vectors.iter().map(|v| normalize_to_f16(v)));
        }

        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        match self.api {
            Api::Ollama => "ollama",
            Api::OpenAi => "openai",
        }
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }
}
