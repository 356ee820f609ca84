//! Conversation state: the transcript and the pending attachment.

use crate::error::AgentError;
use crate::router::{Resolution, Router};
use kestrel_ai_context::{DocumentSource, FileSource};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl fmt::Display for ChatTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.text)
    }
}

/// One user's conversation with a [`Router`].
///
/// Queries run one at a time (`query` takes `&mut self`). At most one document
/// is pending; it is handed to the next query and released once that query
/// resolves, whatever the outcome.
pub struct Session {
    router: Arc<Router>,
    history: Vec<ChatTurn>,
    pending: Option<Box<dyn DocumentSource>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("turns", &self.history.len())
            .field("pending", &self.pending_name())
            .finish()
    }
}

impl Session {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            history: Vec::new(),
            pending: None,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Opens `path` as the pending attachment.
    ///
    /// A document already pending is released before the file is opened.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<(), AgentError> {
        let path = path.as_ref();
        self.release_attachment();
        let source = FileSource::open(path)?;
        self.attach(Box::new(source), &path.display().to_string());
        Ok(())
    }

    /// Makes `source` the pending attachment, releasing any previous one first.
    pub fn attach(&mut self, source: Box<dyn DocumentSource>, label: &str) {
        self.release_attachment();
        tracing::debug!("Attached {} for the next query", source.name());
        self.pending = Some(source);
        self.history.push(ChatTurn {
            role: Role::System,
            text: format!("File {label} ready for next query"),
        });
    }

    /// Routes `text`, consuming the pending attachment.
    ///
    /// Every response, including the unknown-intent message, is recorded as an
    /// assistant turn. A failed query records only the user turn.
    pub async fn query(&mut self, text: &str) -> Result<String, AgentError> {
        self.history.push(ChatTurn {
            role: Role::User,
            text: text.to_string(),
        });

        let attachment = self.pending.take();
        let Resolution {
            outcome,
            attachment,
        } = self.router.resolve(text, attachment).await;
        if let Some(source) = attachment {
            tracing::debug!("Releasing attachment {}", source.name());
        }

        let response = outcome?;
        self.history.push(ChatTurn {
            role: Role::Assistant,
            text: response.clone(),
        });
        Ok(response)
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn pending_name(&self) -> Option<&str> {
        self.pending.as_ref().map(|source| source.name())
    }

    /// Drops the pending attachment, if any.
    pub fn release_attachment(&mut self) {
        if let Some(source) = self.pending.take() {
            tracing::debug!("Releasing attachment {}", source.name());
        }
    }
}
