//! Agent configuration.
//!
//! The configuration is a TOML file with `[llm]`, `[embedding]` and `[store]`
//! sections; every key is optional. It is read once at startup:
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! base_url = "https://api.openai.com/v1"
//! api_key = "sk-..."
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text:latest"
//!
//! [store]
//! url = "localhost:6333"
//! collection = "monitor"
//! top_k = 4
//! score_threshold = 0.7
//! ```

use crate::llm::ModelSpec;
use kestrel_ai_embed::{EmbedConfig, EmbedProviderKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".kestrel.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file {path} not found")]
    NotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2:latest".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model cache for the local fastembed provider
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text:latest".to_string(),
            base_url: None,
            api_key: None,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// Qdrant base URL, or `sqlite:<path>` / `sqlite::memory:` for the local store
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub top_k: usize,
    pub score_threshold: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "monitor".to_string(),
            top_k: 4,
            score_threshold: 0.7,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Otherwise the first file found among
    /// [`Config::search_paths`] is used, and the defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            return Self::from_file(path);
        }

        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::info!("No configuration file found, using defaults");
                Self::default().normalized()
            }
        }
    }

    /// Candidate files, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
            let home = PathBuf::from(home);
            paths.push(home.join(CONFIG_FILE_NAME));
            paths.push(home.join(".config").join("kestrel.toml"));
        }
        paths.push(PathBuf::from("/etc/kestrel.toml"));
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded configuration from {}", path.display());
        config.normalized()
    }

    /// Parses TOML text without touching the filesystem.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.normalized()
    }

    /// Adds missing URL schemes, lower-cases provider names, then validates.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.llm.provider = self.llm.provider.trim().to_ascii_lowercase();
        self.embedding.provider = self.embedding.provider.trim().to_ascii_lowercase();
        self.llm.base_url = self.llm.base_url.as_deref().and_then(normalize_url);
        self.embedding.base_url = self.embedding.base_url.as_deref().and_then(normalize_url);
        self.store.url = normalize_url(&self.store.url).unwrap_or_default();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.llm.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::Invalid(format!(
                "unsupported llm provider '{}' (expected ollama or openai)",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm model must not be empty".into()));
        }
        self.embedding
            .provider
            .parse::<EmbedProviderKind>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "embedding model must not be empty".into(),
            ));
        }

        for url in [self.llm.base_url.as_deref(), self.embedding.base_url.as_deref()]
            .into_iter()
            .flatten()
        {
            check_http_url(url)?;
        }
        if self.store.url.is_empty() {
            return Err(ConfigError::Invalid("store url must not be empty".into()));
        }
        if !self.store.url.starts_with("sqlite:") {
            check_http_url(&self.store.url)?;
        }
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store collection must not be empty".into(),
            ));
        }

        if self.store.top_k == 0 {
            return Err(ConfigError::Invalid(
                "store top_k must be greater than zero".into(),
            ));
        }
        if !self.store.score_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "store score_threshold must be a finite number".into(),
            ));
        }
        if self.store.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "store chunk_size must be greater than zero".into(),
            ));
        }
        if self.store.chunk_overlap >= self.store.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "store chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.store.chunk_overlap, self.store.chunk_size
            )));
        }
        Ok(())
    }

    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            provider: self.llm.provider.clone(),
            model: self.llm.model.clone(),
            base_url: self.llm.base_url.clone(),
            api_key: self.llm.api_key.clone(),
        }
    }

    /// Embedding settings for the configured provider.
    ///
    /// An `openai` embedder without its own URL or key borrows the LLM's when
    /// the LLM is also `openai`; the key finally falls back to `OPENAI_API_KEY`.
    pub fn embed_config(&self) -> Result<EmbedConfig, ConfigError> {
        let provider: EmbedProviderKind = self
            .embedding
            .provider
            .parse()
            .map_err(|e: kestrel_ai_embed::EmbedError| ConfigError::Invalid(e.to_string()))?;
        let mut config = EmbedConfig::new(provider, self.embedding.model.clone());

        let shares_llm = provider == EmbedProviderKind::OpenAi && self.llm.provider == "openai";
        let base_url = self
            .embedding
            .base_url
            .clone()
            .or_else(|| shares_llm.then(|| self.llm.base_url.clone()).flatten());
        let api_key = self
            .embedding
            .api_key
            .clone()
            .or_else(|| shares_llm.then(|| self.llm.api_key.clone()).flatten())
            .or_else(|| {
                (provider == EmbedProviderKind::OpenAi)
                    .then(|| std::env::var("OPENAI_API_KEY").ok())
                    .flatten()
            });

        if let Some(url) = base_url {
            config = config.with_base_url(url);
        }
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        if let Some(dir) = &self.embedding.cache_dir {
            config = config.with_cache_dir(dir);
        }
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

/// Trims trailing slashes and adds `http://` to scheme-less URLs.
/// `sqlite:` URLs are returned untouched. Blank input yields `None`.
fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if url.starts_with("sqlite:") {
        return Some(url.to_string());
    }
    let url = url.trim_end_matches('/');
    if url.contains("://") {
        Some(url.to_string())
    } else {
        Some(format!("http://{url}"))
    }
}

fn check_http_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ConfigError::Invalid(format!("invalid URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "URL '{url}' must be an http(s) address"
        ))),
    }
}
