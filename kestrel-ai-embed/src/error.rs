//! Error types for the embedding system

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems, model start-up, remote service failures and
/// malformed vectors. Variants carry the provider or model they concern so a
/// message shown to the user names the failing backend.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the embedding configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport or HTTP status failure talking to a remote embedding service
    #[error("Request to {provider} embedding service failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered, but not with something we can use
    #[error("Unexpected response from {provider} embedding service: {message}")]
    UnexpectedResponse { provider: String, message: String },

    /// A vector whose length differs from the provider's dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wraps an error raised while loading or probing a model.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Wraps an error raised while generating embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn request(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            provider: provider.into(),
            source,
        }
    }

    pub fn unexpected_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
