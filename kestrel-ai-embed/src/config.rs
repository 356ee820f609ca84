//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default Ollama endpoint when none is configured.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default OpenAI-compatible endpoint when none is configured.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Which backend produces the vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedProviderKind {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "fastembed")]
    FastEmbed,
}

impl EmbedProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::FastEmbed => "fastembed",
        }
    }
}

impl fmt::Display for EmbedProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbedProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(EmbedError::invalid_config(format!(
                "unknown embedding provider '{other}' (expected ollama, openai or fastembed)"
            ))),
        }
    }
}

/// Configuration for an embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Backend to use
    pub provider: EmbedProviderKind,
    /// Model identifier understood by the backend
    pub model: String,
    /// Service endpoint; the provider's default when absent
    pub base_url: Option<String>,
    /// Passed through as a bearer token, never inspected
    pub api_key: Option<String>,
    /// Maximum number of texts sent per request or inference batch
    pub batch_size: usize,
    /// Where fastembed keeps downloaded model files
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::ollama("nomic-embed-text:latest")
    }
}

impl EmbedConfig {
    pub fn new(provider: EmbedProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key: None,
            batch_size: 32,
            cache_dir: None,
        }
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(EmbedProviderKind::Ollama, model)
    }

    pub fn openai(model: impl Into<String>) -> Self {
        Self::new(EmbedProviderKind::OpenAi, model)
    }

    /// A local ONNX model run through fastembed, e.g. `all-minilm-l6-v2`.
    pub fn fastembed(model: impl Into<String>) -> Self {
        Self {
            batch_size: 16,
            ..Self::new(EmbedProviderKind::FastEmbed, model)
        }
    }

    /// Set the service endpoint (builder style)
    pub fn with_base_url<S: Into<String>>(self, base_url: S) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Set the API key (builder style)
    pub fn with_api_key<S: Into<String>>(self, api_key: S) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the fastembed model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.as_ref().to_path_buf()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// The configured endpoint, or the provider's default, without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        let url = match (&self.base_url, self.provider) {
            (Some(url), _) if !url.trim().is_empty() => url.trim(),
            (_, EmbedProviderKind::OpenAi) => DEFAULT_OPENAI_URL,
            _ => DEFAULT_OLLAMA_URL,
        };
        url.trim_end_matches('/').to_string()
    }

    /// Checks the settings that can be checked without contacting a backend.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("embedding model must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config(
                "embedding batch size must be greater than zero",
            ));
        }
        if let Some(url) = &self.base_url {
            if !url.trim().is_empty()
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(EmbedError::invalid_config(format!(
                    "embedding base URL '{url}' must start with http:// or https://"
                )));
            }
        }
        if self.provider == EmbedProviderKind::FastEmbed {
            crate::provider::builtin_model(&self.model)?;
        }

        tracing::debug!("Embedding configuration validated for {}", self.model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();
        assert_eq!(config.provider, EmbedProviderKind::Ollama);
        assert_eq!(config.model_name(), "nomic-embed-text:latest");
        assert_eq!(config.resolved_base_url(), DEFAULT_OLLAMA_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(
            "OpenAI".parse::<EmbedProviderKind>().unwrap(),
            EmbedProviderKind::OpenAi
        );
        assert_eq!(
            " fastembed ".parse::<EmbedProviderKind>().unwrap(),
            EmbedProviderKind::FastEmbed
        );
        let err = "cohere".parse::<EmbedProviderKind>().unwrap_err();
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn test_base_url_resolution() {
        let config = EmbedConfig::openai("text-embedding-3-small");
        assert_eq!(config.resolved_base_url(), DEFAULT_OPENAI_URL);

        let config = config.with_base_url("http://gateway:8080/v1/");
        assert_eq!(config.resolved_base_url(), "http://gateway:8080/v1");
    }

    #[test]
    fn test_validation_failures() {
        assert!(EmbedConfig::ollama("").validate().is_err());
        assert!(
            EmbedConfig::ollama("nomic-embed-text")
                .with_batch_size(0)
                .validate()
                .is_err()
        );
        assert!(
            EmbedConfig::ollama("nomic-embed-text")
                .with_base_url("localhost:11434")
                .validate()
                .is_err()
        );
        assert!(EmbedConfig::fastembed("not-a-model").validate().is_err());
        assert!(EmbedConfig::fastembed("all-minilm-l6-v2").validate().is_ok());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EmbedProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }
}
