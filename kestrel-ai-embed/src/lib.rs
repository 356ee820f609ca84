//! # kestrel-ai-embed
//!
//! Text embeddings behind one async trait, with a local ONNX backend and two
//! HTTP backends.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kestrel_ai_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = create_provider(&EmbedConfig::ollama("nomic-embed-text:latest")).await?;
//!
//! let texts = vec!["disk usage on db-1".to_string(), "p99 latency".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **fastembed**: built-in ONNX models run in-process, downloaded on first use
//! - **ollama**: a local or remote Ollama server (`/api/embed`)
//! - **openai**: any OpenAI-compatible `/embeddings` endpoint
//!
//! Every provider returns unit-length `f16` vectors, so cosine similarity of
//! two embeddings is their dot product.

pub mod config;
pub mod error;
pub mod provider;
pub mod remote;

use std::sync::Arc;

// Re-export main types for easy access
pub use config::{EmbedConfig, EmbedProviderKind};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
pub use remote::HttpEmbedder;

/// Builds and initialises the provider named by `config.provider`.
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    tracing::info!(
        "Creating {} embedding provider for model {}",
        config.provider,
        config.model_name()
    );
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbedProviderKind::FastEmbed => Arc::new(FastEmbedProvider::create(config.clone()).await?),
        EmbedProviderKind::Ollama | EmbedProviderKind::OpenAi => {
            Arc::new(HttpEmbedder::create(config.clone()).await?)
        }
    };
    Ok(provider)
}
