//! kestrel-ai-agent: an intent-routing monitor agent
//!
//! Each query is classified by a language model and then either answered from
//! the knowledge base, used to ingest the pending document, or declined.
//!
//! ## Key Modules
//!
//! - **[`llm`]**: the [`CompletionModel`] trait with Ollama and OpenAI-compatible backends
//! - **[`classify`]**: categories, the classification prompt and [`Intent`] parsing
//! - **[`router`]**: [`Router`], dispatching a classified query to its handler
//! - **[`session`]**: [`Session`], the transcript and the pending attachment
//! - **[`config`]**: TOML configuration discovery and validation
//! - **[`startup`]**: building a [`Router`] from a [`Config`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kestrel_ai_agent::{Config, Session, startup::build_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), kestrel_ai_agent::AgentError> {
//! let config = Config::load(None).map_err(kestrel_ai_agent::AgentError::configuration)?;
//! let mut session = Session::new(Arc::new(build_router(&config).await?));
//!
//! session.add_file("incident-notes.txt")?;
//! println!("{}", session.query("please add this to the monitoring docs").await?);
//! println!("{}", session.query("which hosts are low on disk?").await?);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod llm;
pub mod router;
pub mod session;
pub mod shell;
pub mod startup;

pub use classify::{Category, CategoryId, Classifier, ClassifyError, Intent};
pub use config::{Config, ConfigError};
pub use error::AgentError;
pub use llm::{CallOptions, CompletionModel, LlmError, ModelSpec, create_model};
pub use router::{Resolution, Router};
pub use session::{ChatTurn, Role, Session};
