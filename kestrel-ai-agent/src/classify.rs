//! Intent classification.
//!
//! One completion picks a category for the user's query. The model's raw
//! answer is kept as-is; [`Intent::parse`] turns it into a [`CategoryId`] when
//! it names one of the built-in categories.

use crate::llm::{CallOptions, CompletionModel, LlmError};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("at least one category is required")]
    EmptyCategories,

    #[error(transparent)]
    Backend(#[from] LlmError),
}

/// A label the classifier may choose, with the description shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// The monitor agent's three categories.
    pub fn defaults() -> Vec<Category> {
        [
            CategoryId::QueryMonitor,
            CategoryId::UpdateDocs,
            CategoryId::Other,
        ]
        .into_iter()
        .map(|id| Category::new(id.name(), id.description()))
        .collect()
    }
}

/// The categories the router knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryId {
    QueryMonitor,
    UpdateDocs,
    Other,
}

impl CategoryId {
    pub fn name(&self) -> &'static str {
        match self {
            CategoryId::QueryMonitor => "query_monitor",
            CategoryId::UpdateDocs => "update_docs",
            CategoryId::Other => "other",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CategoryId::QueryMonitor => "Queries about the monitoring data or metrics",
            CategoryId::UpdateDocs => "Requests to add, update, or manage monitoring documents",
            CategoryId::Other => {
                "Other questions or requests that don't fit into the above categories"
            }
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [
            CategoryId::QueryMonitor,
            CategoryId::UpdateDocs,
            CategoryId::Other,
        ]
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classifier answer, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Known(CategoryId),
    /// The first line of the model's answer when it names no known category.
    Unrecognized(String),
}

impl Intent {
    /// Parses a raw completion.
    ///
    /// Only the first non-empty line counts. A leading `Category:` and
    /// surrounding quotes, backticks, asterisks and trailing periods are
    /// ignored, and names match case-insensitively.
    pub fn parse(raw: &str) -> Intent {
        let line = raw
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");

        let label = match line.get(..9) {
            Some(prefix) if prefix.eq_ignore_ascii_case("category:") => line[9..].trim(),
            _ => line,
        };
        let label = label
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
            .trim_end_matches('.')
            .trim();

        match CategoryId::from_label(label) {
            Some(id) => Intent::Known(id),
            None => Intent::Unrecognized(line.to_string()),
        }
    }
}

/// Picks a category for a query with one completion.
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn CompletionModel>,
    categories: Vec<Category>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("model", &self.model.model_name())
            .field("categories", &self.categories)
            .finish()
    }
}

impl Classifier {
    /// Fails with [`ClassifyError::EmptyCategories`] when `categories` is empty.
    pub fn new(
        model: Arc<dyn CompletionModel>,
        categories: Vec<Category>,
    ) -> Result<Self, ClassifyError> {
        if categories.is_empty() {
            return Err(ClassifyError::EmptyCategories);
        }
        Ok(Self { model, categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn prompt(&self, text: &str) -> String {
        let listing = self
            .categories
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Please classify the following text into one of these categories. \
             Only return the category name.\n\n\
             Categories:\n{listing}\n\n\
             Text: {text}\n\n\
             Category:"
        )
    }

    /// Returns the model's raw answer. Any label is a valid result.
    pub async fn classify(&self, text: &str) -> Result<String, ClassifyError> {
        let label = self
            .model
            .complete(&self.prompt(text), &CallOptions::for_classification())
            .await?;
        tracing::debug!("Classified {:?} as {:?}", text, label.trim());
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct Echo {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionModel for Echo {
        async fn complete(&self, prompt: &str, _: &CallOptions) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }

        fn provider_name(&self) -> &str {
            "echo"
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_parse_known_labels() {
        assert_eq!(
            Intent::parse("query_monitor"),
            Intent::Known(CategoryId::QueryMonitor)
        );
        assert_eq!(
            Intent::parse("  Update_Docs.\n"),
            Intent::Known(CategoryId::UpdateDocs)
        );
        assert_eq!(
            Intent::parse("Category: `other`"),
            Intent::Known(CategoryId::Other)
        );
        assert_eq!(
            Intent::parse("\n**query_monitor**\nbecause it asks about metrics"),
            Intent::Known(CategoryId::QueryMonitor)
        );
    }

    #[test]
    fn test_parse_unrecognized_keeps_label() {
        assert_eq!(
            Intent::parse(" weather \n"),
            Intent::Unrecognized("weather".to_string())
        );
        assert_eq!(Intent::parse(""), Intent::Unrecognized(String::new()));
    }

    #[test]
    fn test_empty_categories_rejected() {
        let model = Arc::new(Echo {
            answer: "other".into(),
            prompts: Mutex::new(Vec::new()),
        });
        assert!(matches!(
            Classifier::new(model, Vec::new()),
            Err(ClassifyError::EmptyCategories)
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_prompt_lists_categories_and_query() {
        let model = Arc::new(Echo {
            answer: "query_monitor\n".into(),
            prompts: Mutex::new(Vec::new()),
        });
        let classifier = Classifier::new(model.clone(), Category::defaults()).unwrap();

        let label = classifier.classify("how full is db-1?").await.unwrap();
        assert_eq!(label, "query_monitor\n");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("query_monitor: Queries about the monitoring data or metrics"));
        assert!(prompt.contains("update_docs: Requests to add, update, or manage"));
        assert!(prompt.contains("Text: how full is db-1?"));
        assert!(prompt.ends_with("Category:"));
        assert!(logs_contain("Classified"));
    }
}
