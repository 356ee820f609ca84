use crate::classify::ClassifyError;
use crate::llm::LlmError;
use kestrel_ai_context::LoadError;

/// Every way a query or startup can fail.
///
/// Errors name the stage that failed and the input it was working on. None of
/// them ends a session except [`AgentError::Configuration`], which only occurs
/// at startup.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to classify query: {0}")]
    Classification(#[source] ClassifyError),

    #[error("failed to retrieve context for {query:?}: {source:#}")]
    Retrieval {
        query: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to generate an answer: {0}")]
    Generation(#[source] LlmError),

    #[error("failed to ingest {name}: {source:#}")]
    Ingest {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no document attached; use /add <path> first")]
    MissingAttachment,

    #[error("configuration error: {0:#}")]
    Configuration(#[source] anyhow::Error),

    #[error("at least one category is required")]
    EmptyCategories,
}

impl From<ClassifyError> for AgentError {
    fn from(error: ClassifyError) -> Self {
        match error {
            ClassifyError::EmptyCategories => AgentError::EmptyCategories,
            other => AgentError::Classification(other),
        }
    }
}

impl AgentError {
    pub fn configuration(error: impl Into<anyhow::Error>) -> Self {
        AgentError::Configuration(error.into())
    }
}
