//! Completion models.
//!
//! A [`CompletionModel`] turns one prompt into one completion string. Two HTTP
//! backends are provided: Ollama's `/api/generate` and any OpenAI-compatible
//! `/chat/completions` endpoint. Requests carry no timeout; dropping the future
//! aborts the request.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unsupported LLM provider: {provider} (expected ollama or openai)")]
    UnsupportedProvider { provider: String },

    #[error("request to {provider} model {model} failed: {source}")]
    Request {
        provider: String,
        model: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {provider} model {model}: {message}")]
    UnexpectedResponse {
        provider: String,
        model: String,
        message: String,
    },
}

/// Optional per-call generation parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
}

impl CallOptions {
    /// Deterministic, short answers.
    pub fn for_classification() -> Self {
        Self {
            temperature: Some(0.0),
            max_tokens: Some(32),
            stop: vec!["\n\n".to_string()],
        }
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Request exactly one completion for `prompt`.
    async fn complete(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Settings naming a completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Builds the model named by `spec.provider`.
pub fn create_model(spec: &ModelSpec) -> Result<Arc<dyn CompletionModel>, LlmError> {
    let base_url = spec
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string());

    let model: Arc<dyn CompletionModel> = match spec.provider.trim().to_ascii_lowercase().as_str()
    {
        "ollama" => Arc::new(OllamaModel::new(
            base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            spec.model.clone(),
        )),
        "openai" => Arc::new(OpenAiModel::new(
            base_url.unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            spec.model.clone(),
            spec.api_key.clone(),
        )),
        other => {
            return Err(LlmError::UnsupportedProvider {
                provider: other.to_string(),
            });
        }
    };

    tracing::info!(
        "Using {} completion model {}",
        model.provider_name(),
        model.model_name()
    );
    Ok(model)
}

async fn post_json(
    client: &reqwest::Client,
    provider: &str,
    model: &str,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Value, LlmError> {
    let request_error = |source| LlmError::Request {
        provider: provider.to_string(),
        model: model.to_string(),
        source,
    };

    let mut request = client.post(url).json(body);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = request.send().await.map_err(request_error)?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(LlmError::UnexpectedResponse {
            provider: provider.to_string(),
            model: model.to_string(),
            message: format!("HTTP {status}: {text}"),
        });
    }
    response.json::<Value>().await.map_err(request_error)
}

/// Ollama `/api/generate` with streaming disabled.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn request_body(&self, prompt: &str, options: &CallOptions) -> Value {
        let mut model_options = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".into(), json!(max_tokens));
        }
        if !options.stop.is_empty() {
            model_options.insert("stop".into(), json!(options.stop));
        }

        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if !model_options.is_empty() {
            body["options"] = Value::Object(model_options);
        }
        body
    }

    pub fn parse_response(&self, body: &Value) -> Result<String, LlmError> {
        body.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| LlmError::UnexpectedResponse {
                provider: "ollama".to_string(),
                model: self.model.clone(),
                message: "missing 'response' field".to_string(),
            })
    }
}

#[async_trait]
impl CompletionModel for OllamaModel {
    async fn complete(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError> {
        tracing::debug!("Sending {} byte prompt to ollama/{}", prompt.len(), self.model);
        let body = post_json(
            &self.client,
            "ollama",
            &self.model,
            &format!("{}/api/generate", self.base_url),
            None,
            &self.request_body(prompt, options),
        )
        .await?;
        self.parse_response(&body)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible `/chat/completions`, prompt sent as one user message.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn request_body(&self, prompt: &str, options: &CallOptions) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !options.stop.is_empty() {
            body["stop"] = json!(options.stop);
        }
        body
    }

    pub fn parse_response(&self, body: &Value) -> Result<String, LlmError> {
        body.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LlmError::UnexpectedResponse {
                provider: "openai".to_string(),
                model: self.model.clone(),
                message: "no choices in completion".to_string(),
            })
    }
}

#[async_trait]
impl CompletionModel for OpenAiModel {
    async fn complete(&self, prompt: &str, options: &CallOptions) -> Result<String, LlmError> {
        tracing::debug!("Sending {} byte prompt to openai/{}", prompt.len(), self.model);
        let body = post_json(
            &self.client,
            "openai",
            &self.model,
            &format!("{}/chat/completions", self.base_url),
            self.api_key.as_deref(),
            &self.request_body(prompt, options),
        )
        .await?;
        self.parse_response(&body)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: &str) -> ModelSpec {
        ModelSpec {
            provider: provider.to_string(),
            model: "llama3.2:latest".to_string(),
            base_url: None,
            api_key: None,
        }
    }

    #[test]
    fn test_create_model_by_provider() {
        let model = create_model(&spec("ollama")).unwrap();
        assert_eq!(model.provider_name(), "ollama");
        assert_eq!(model.model_name(), "llama3.2:latest");

        let model = create_model(&spec("OpenAI")).unwrap();
        assert_eq!(model.provider_name(), "openai");

        let err = create_model(&spec("bard")).err().unwrap();
        assert!(matches!(err, LlmError::UnsupportedProvider { .. }));
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn test_ollama_body() {
        let model = OllamaModel::new(DEFAULT_OLLAMA_URL, "llama3.2:latest");

        let body = model.request_body("hello", &CallOptions::default());
        assert_eq!(body["stream"], false);
        assert_eq!(body["prompt"], "hello");
        assert!(body.get("options").is_none());

        let body = model.request_body("hello", &CallOptions::for_classification());
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["num_predict"], 32);
    }

    #[test]
    fn test_ollama_response() {
        let model = OllamaModel::new(DEFAULT_OLLAMA_URL, "llama3.2:latest");
        let body = json!({"model": "llama3.2:latest", "response": "query_monitor", "done": true});
        assert_eq!(model.parse_response(&body).unwrap(), "query_monitor");
        assert!(model.parse_response(&json!({"error": "boom"})).is_err());
    }

    #[test]
    fn test_openai_body_and_response() {
        let model = OpenAiModel::new(DEFAULT_OPENAI_URL, "gpt-4o-mini", Some("sk-test".into()));

        let body = model.request_body("hi", &CallOptions::for_classification());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 32);
        assert_eq!(body["stop"][0], "\n\n");

        let response = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "update_docs"}}]
        });
        assert_eq!(model.parse_response(&response).unwrap(), "update_docs");
        assert!(model.parse_response(&json!({"choices": []})).is_err());
    }
}
