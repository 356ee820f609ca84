//! kestrel-ai-retriever: vector storage and retrieval for the kestrel agent
//!
//! ## Key Modules
//!
//! - **[`storage`]**: the [`VectorStore`](storage::VectorStore) trait with SQLite and Qdrant backends
//! - **[`retrieval`]**: [`KnowledgeStore`] (embed + write) and [`Retriever`] (embed + search)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kestrel_ai_embed::{EmbedConfig, create_provider};
//! use kestrel_ai_retriever::{KnowledgeStore, Retriever, storage};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let embedder = create_provider(&EmbedConfig::default()).await?;
//! let store = storage::connect("sqlite:.kestrel-ai.db", None, "monitor").await?;
//!
//! let knowledge = KnowledgeStore::new(embedder, store);
//! knowledge.verify().await?;
//!
//! let retriever = Retriever::new(knowledge, 4, 0.7)?;
//! for passage in retriever.retrieve("which hosts ran out of disk?").await? {
//!     println!("{:.3} {}", passage.score, passage.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! PassageChunk → Embedder → StoredPoint → VectorStore (SQLite | Qdrant)
//!                                              ↓
//!        query → Embedder → search ────→ RetrievedPassage (best first)
//! ```

pub mod retrieval;
pub mod storage;

pub use retrieval::knowledge_store::KnowledgeStore;
pub use retrieval::retriever::Retriever;
pub use storage::{CollectionError, CollectionInfo, RetrievedPassage, VectorStore};
