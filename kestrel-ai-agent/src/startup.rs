use crate::config::Config;
use crate::error::AgentError;
use crate::llm::create_model;
use crate::router::Router;
use kestrel_ai_context::TextSplitter;
use kestrel_ai_embed::create_provider;
use kestrel_ai_retriever::{KnowledgeStore, Retriever, storage};

/// Builds every backend named by `config` and checks the collection.
///
/// Any failure here is a [`AgentError::Configuration`]: the process should
/// report it and exit.
pub async fn build_router(config: &Config) -> Result<Router, AgentError> {
    let model = create_model(&config.model_spec()).map_err(AgentError::configuration)?;

    let embed_config = config.embed_config().map_err(AgentError::configuration)?;
    let embedder = create_provider(&embed_config)
        .await
        .map_err(AgentError::configuration)?;

    let store = storage::connect(
        &config.store.url,
        config.store.api_key.clone(),
        &config.store.collection,
    )
    .await
    .map_err(AgentError::Configuration)?;

    let knowledge = KnowledgeStore::new(embedder, store);
    knowledge.verify().await.map_err(AgentError::configuration)?;

    let retriever = Retriever::new(knowledge, config.store.top_k, config.store.score_threshold)
        .map_err(AgentError::Configuration)?;
    let splitter = TextSplitter::with_defaults(config.store.chunk_size, config.store.chunk_overlap)
        .map_err(AgentError::configuration)?;

    Router::new(model, retriever, splitter)
}
