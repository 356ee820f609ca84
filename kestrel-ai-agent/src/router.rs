//! Query routing.
//!
//! ```text
//! query ─→ Classifier ─┬─ query_monitor ─→ retrieve (+ attachment chunks) ─→ grounded answer
//!                      ├─ update_docs ───→ load + split attachment ─→ KnowledgeStore::upsert
//!                      └─ anything else ─→ "Unknown query type: <label>"
//! ```
//!
//! The router never keeps an attachment. [`Router::resolve`] takes it by value
//! and hands it back in the [`Resolution`] so the caller decides when it is
//! released. Dropping the `resolve` future drops the attachment with it; if a
//! load was in flight the attachment is released when that load finishes.

use crate::classify::{Category, CategoryId, Classifier, Intent};
use crate::error::AgentError;
use crate::llm::{CallOptions, CompletionModel};
use kestrel_ai_context::{DocumentSource, LoadError, LoaderRegistry, PassageChunk, TextSplitter};
use kestrel_ai_retriever::Retriever;
use std::sync::Arc;

/// Outcome of one query plus the attachment it was given.
pub struct Resolution {
    pub outcome: Result<String, AgentError>,
    pub attachment: Option<Box<dyn DocumentSource>>,
}

pub struct Router {
    model: Arc<dyn CompletionModel>,
    classifier: Classifier,
    retriever: Retriever,
    loaders: LoaderRegistry,
    splitter: TextSplitter,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("model", &self.model.model_name())
            .field("classifier", &self.classifier)
            .field("retriever", &self.retriever)
            .field("splitter", &self.splitter)
            .finish()
    }
}

impl Router {
    /// A router over the monitor agent's default categories.
    pub fn new(
        model: Arc<dyn CompletionModel>,
        retriever: Retriever,
        splitter: TextSplitter,
    ) -> Result<Self, AgentError> {
        Self::with_categories(model, Category::defaults(), retriever, splitter)
    }

    pub fn with_categories(
        model: Arc<dyn CompletionModel>,
        categories: Vec<Category>,
        retriever: Retriever,
        splitter: TextSplitter,
    ) -> Result<Self, AgentError> {
        let classifier = Classifier::new(model.clone(), categories)?;
        Ok(Self {
            model,
            classifier,
            retriever,
            loaders: LoaderRegistry::default(),
            splitter,
        })
    }

    pub fn with_loaders(self, loaders: LoaderRegistry) -> Self {
        Self { loaders, ..self }
    }

    pub fn model(&self) -> &Arc<dyn CompletionModel> {
        &self.model
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Classifies `query` and runs the matching handler.
    ///
    /// The attachment comes back untouched in the result whatever the outcome.
    pub async fn resolve(
        &self,
        query: &str,
        mut attachment: Option<Box<dyn DocumentSource>>,
    ) -> Resolution {
        let outcome = self.dispatch(query, &mut attachment).await;
        if let Err(e) = &outcome {
            tracing::warn!("Query failed: {e}");
        }
        Resolution {
            outcome,
            attachment,
        }
    }

    async fn dispatch(
        &self,
        query: &str,
        attachment: &mut Option<Box<dyn DocumentSource>>,
    ) -> Result<String, AgentError> {
        let label = self.classifier.classify(query).await?;

        match Intent::parse(&label) {
            Intent::Known(CategoryId::QueryMonitor) => self.answer(query, attachment).await,
            Intent::Known(CategoryId::UpdateDocs) => self.ingest(attachment).await,
            Intent::Known(CategoryId::Other) => Ok(unknown_query(CategoryId::Other.name())),
            Intent::Unrecognized(label) => Ok(unknown_query(&label)),
        }
    }

    async fn answer(
        &self,
        query: &str,
        attachment: &mut Option<Box<dyn DocumentSource>>,
    ) -> Result<String, AgentError> {
        let passages =
            self.retriever
                .retrieve(query)
                .await
                .map_err(|source| AgentError::Retrieval {
                    query: query.to_string(),
                    source,
                })?;
        let mut context: Vec<String> = passages.into_iter().map(|p| p.text).collect();

        // Attached content is context for this answer only; it is not stored.
        if attachment.is_some() {
            let chunks = self.load_attachment(attachment).await?;
            tracing::debug!("Adding {} attached chunks to the context", chunks.len());
            context.extend(chunks.into_iter().map(|c| c.text));
        }

        let prompt = grounding_prompt(&context, query);
        self.model
            .complete(&prompt, &CallOptions::default())
            .await
            .map_err(AgentError::Generation)
    }

    async fn ingest(
        &self,
        attachment: &mut Option<Box<dyn DocumentSource>>,
    ) -> Result<String, AgentError> {
        let name = attachment
            .as_ref()
            .map(|source| source.name().to_string())
            .ok_or(AgentError::MissingAttachment)?;
        let chunks = self.load_attachment(attachment).await?;

        let written = self
            .retriever
            .knowledge()
            .upsert(&chunks)
            .await
            .map_err(|source| AgentError::Ingest {
                name: name.clone(),
                source,
            })?;

        tracing::info!("Ingested {} as {} passages", name, written);
        Ok(format!("Docs updated successfully: {name}"))
    }

    /// Reads and splits the attachment on the blocking pool, then puts it back
    /// in `slot`.
    async fn load_attachment(
        &self,
        slot: &mut Option<Box<dyn DocumentSource>>,
    ) -> Result<Vec<PassageChunk>, AgentError> {
        let mut source = slot.take().ok_or(AgentError::MissingAttachment)?;
        let name = source.name().to_string();
        let loaders = self.loaders.clone();
        let splitter = self.splitter.clone();

        let (source, chunks) = tokio::task::spawn_blocking(move || {
            let chunks = loaders.load_and_split(&mut *source, &splitter);
            (source, chunks)
        })
        .await
        .map_err(|e| LoadError::Read {
            name,
            source: std::io::Error::other(e),
        })?;

        *slot = Some(source);
        Ok(chunks?)
    }
}

fn unknown_query(label: &str) -> String {
    format!("Unknown query type: {label}")
}

/// Builds the answer prompt: numbered context passages, then the query.
pub fn grounding_prompt(context: &[String], query: &str) -> String {
    let documents = if context.is_empty() {
        "(no documents found)".to_string()
    } else {
        context
            .iter()
            .enumerate()
            .map(|(i, text)| format!("[{}] {}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "You are a monitor agent, you are given the following documents:\n\n\
         {documents}\n\n\
         and the user query is: {query}\n\n\
         You need to answer the user query based on the documents."
    )
}
