//! Scripted stand-ins for the completion, embedding and document backends.

#![allow(dead_code)]

use async_trait::async_trait;
use half::f16;
use kestrel_ai_agent::{CallOptions, CompletionModel, LlmError, Router};
use kestrel_ai_context::{DocumentSource, TextSplitter};
use kestrel_ai_embed::provider::normalize_to_f16;
use kestrel_ai_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use kestrel_ai_retriever::storage::{self, VectorStore};
use kestrel_ai_retriever::{KnowledgeStore, Retriever};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIMENSION: usize = 16;

/// Answers prompts from a fixed script and records every prompt it sees.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _options: &CallOptions) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::UnexpectedResponse {
                provider: "scripted".to_string(),
                model: "script".to_string(),
                message: "script exhausted".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "script"
    }
}

/// A model whose completions never finish. Counts calls started and calls
/// abandoned by dropping their future.
#[derive(Default)]
pub struct HangingModel {
    pub started: AtomicUsize,
    pub abandoned: Arc<AtomicUsize>,
}

struct AbandonGuard(Arc<AtomicUsize>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionModel for HangingModel {
    async fn complete(&self, _prompt: &str, _options: &CallOptions) -> Result<String, LlmError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _guard = AbandonGuard(self.abandoned.clone());
        std::future::pending::<()>().await;
        unreachable!("pending never resolves")
    }

    fn provider_name(&self) -> &str {
        "hanging"
    }

    fn model_name(&self) -> &str {
        "never"
    }
}

/// Bag-of-words embedder; can be switched to fail.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    fn vector(text: &str) -> Vec<f16> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % DIMENSION] += 1.0;
        }
        normalize_to_f16(&vector)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> kestrel_ai_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::invalid_config("embedding service unavailable"));
        }
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| Self::vector(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-16"
    }
}

/// An in-memory document that counts how often it is released.
pub struct TrackedSource {
    name: String,
    bytes: Vec<u8>,
    releases: Arc<AtomicUsize>,
}

impl TrackedSource {
    pub fn new(name: &str, content: &str) -> (Box<dyn DocumentSource>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = Self {
            name: name.to_string(),
            bytes: content.as_bytes().to_vec(),
            releases: releases.clone(),
        };
        (Box::new(source), releases)
    }
}

impl DocumentSource for TrackedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&mut self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a test needs to drive and inspect a router.
pub struct Harness {
    pub router: Arc<Router>,
    pub model: Arc<ScriptedModel>,
    pub embedder: Arc<KeywordEmbedder>,
    pub store: Arc<dyn VectorStore>,
}

impl Harness {
    /// A router over an empty in-memory collection, retrieving every passage
    /// with a non-negative score.
    pub async fn new(replies: &[&str]) -> anyhow::Result<Self> {
        let model = ScriptedModel::new(replies);
        let embedder = KeywordEmbedder::new();
        let store = storage::connect("sqlite::memory:", None, "monitor").await?;
        store.create_collection(DIMENSION).await?;

        let knowledge = KnowledgeStore::new(embedder.clone(), store.clone());
        knowledge.verify().await?;
        let retriever = Retriever::new(knowledge, 4, 0.0)?;
        let router = Router::new(model.clone(), retriever, TextSplitter::with_defaults(500, 50)?)?;

        Ok(Self {
            router: Arc::new(router),
            model,
            embedder,
            store,
        })
    }

    pub async fn stored_points(&self) -> anyhow::Result<usize> {
        Ok(self
            .store
            .collection_info()
            .await?
            .map(|info| info.points)
            .unwrap_or(0))
    }
}
