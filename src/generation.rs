//! Text generation backends for the chat flow.
//!
//! A [`GenerationClient`] turns a [`GenerationRequest`] (system prompt,
//! recent history, assembled knowledge blocks, user message) into the
//! assistant's reply. Failures are reported as [`GenerationError`], which is
//! kept separate from retrieval errors so the chat flow can fall back to the
//! chatbot's canned reply without losing the distinction in logs.
//!
//! # Providers
//!
//! | Config Value | Client | Endpoint |
//! |-------------|--------|----------|
//! | `"disabled"` | [`DisabledClient`] | none |
//! | `"openai"` | [`OpenAiClient`] | `POST {endpoint}/chat/completions` |
//! | `"gemini"` | [`GeminiClient`] | `POST {endpoint}/models/{model}:generateContent` |
//!
//! Both HTTP clients retry HTTP 429, 5xx and network errors with exponential
//! backoff (1s, 2s, 4s, ... capped at 32s). Other 4xx responses fail at once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use knowbase_core::models::ChatMessage;

use crate::config::GenerationConfig;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation is disabled")]
    Disabled,
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("generation API returned no text")]
    EmptyResponse,
}

/// Everything a backend needs to produce one reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    /// Prior messages of the conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// Knowledge blocks from [`knowbase_core::context::assemble`].
    pub knowledge: Vec<String>,
    pub message: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// Render the single-prompt form sent to the model.
    ///
    /// ```text
    /// {system prompt}
    ///
    /// {role}: {content}
    /// ...
    ///
    ///
    ///
    /// Base de conhecimento:
    /// {block}
    ///
    /// {block}
    ///
    /// Usuário: {message}
    /// Assistente:
    /// ```
    ///
    /// The knowledge section is omitted entirely when there are no blocks.
    pub fn prompt(&self) -> String {
        let history = self
            .history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let knowledge = if self.knowledge.is_empty() {
            String::new()
        } else {
            format!("\n\nBase de conhecimento:\n{}", self.knowledge.join("\n\n"))
        };

        format!(
            "{}\n\n{}\n\n{}\n\nUsuário: {}\nAssistente:",
            self.system_prompt, history, knowledge, self.message
        )
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Always fails with [`GenerationError::Disabled`], so every chat reply is
/// the chatbot's fallback message.
pub struct DisabledClient;

#[async_trait]
impl GenerationClient for DisabledClient {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    top_p: f64,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required"))?;
        Ok(Self {
            http: http_client(config)?,
            endpoint: endpoint_or(config, OPENAI_ENDPOINT),
            model,
            api_key,
            top_p: config.top_p,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt() }],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "top_p": self.top_p,
        });
        let url = format!("{}/chat/completions", self.endpoint);
        let auth = format!("Bearer {}", self.api_key);
        let json = post_json(
            &self.http,
            &url,
            ("Authorization", auth.as_str()),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    top_p: f64,
    top_k: u32,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required"))?;
        Ok(Self {
            http: http_client(config)?,
            endpoint: endpoint_or(config, GEMINI_ENDPOINT),
            model,
            api_key,
            top_p: config.top_p,
            top_k: config.top_k,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt() }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "topP": self.top_p,
                "topK": self.top_k,
                "maxOutputTokens": request.max_tokens,
            },
        });
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let json = post_json(
            &self.http,
            &url,
            ("x-goog-api-key", self.api_key.as_str()),
            &body,
            self.max_retries,
        )
        .await?;
        parse_gemini_response(&json)
    }
}

fn http_client(config: &GenerationConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn endpoint_or(config: &GenerationConfig, default: &str) -> String {
    config
        .endpoint
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// POST `body` to `url`, retrying rate limits, server errors and network
/// failures up to `max_retries` times.
async fn post_json(
    http: &reqwest::Client,
    url: &str,
    auth: (&str, &str),
    body: &Value,
    max_retries: u32,
) -> Result<Value, GenerationError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(
                attempt,
                delay_secs = delay.as_secs(),
                error = ?last_err,
                "retrying generation request"
            );
            tokio::time::sleep(delay).await;
        }

        let resp = http
            .post(url)
            .header(auth.0, auth.1)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = GenerationError::Api {
                    status: status.as_u16(),
                    body: body_text,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(GenerationError::Request(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or(GenerationError::EmptyResponse))
}

fn non_empty(text: &str) -> Result<String, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &Value) -> Result<String, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or(GenerationError::EmptyResponse)?;
    non_empty(text)
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String, GenerationError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or(GenerationError::EmptyResponse)?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    non_empty(&text)
}

/// Build the configured [`GenerationClient`].
///
/// The API key is read from the environment variable named by
/// [`GenerationConfig::api_key_var`]. A missing key is a startup error for
/// enabled providers.
pub fn create_client(config: &GenerationConfig) -> anyhow::Result<Arc<dyn GenerationClient>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledClient));
    }

    let var = config.api_key_var();
    let api_key = std::env::var(var)
        .map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;

    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(config, api_key)?)),
        "gemini" => Ok(Arc::new(GeminiClient::new(config, api_key)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use knowbase_core::models::Role;

    fn message(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id: content.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "Você é um assistente.".to_string(),
            history: vec![],
            knowledge: vec![],
            message: "Oi".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn test_prompt_without_knowledge_omits_section() {
        let prompt = request().prompt();
        assert!(prompt.starts_with("Você é um assistente."));
        assert!(prompt.ends_with("Usuário: Oi\nAssistente:"));
        assert!(!prompt.contains("Base de conhecimento"));
    }

    #[test]
    fn test_prompt_includes_history_and_knowledge() {
        let mut req = request();
        req.history = vec![
            message(Role::User, "Olá"),
            message(Role::Assistant, "Como posso ajudar?"),
        ];
        req.knowledge = vec!["**A**\num".to_string(), "**B**\ndois".to_string()];
        let prompt = req.prompt();

        assert!(prompt.contains("user: Olá\nassistant: Como posso ajudar?"));
        assert!(prompt.contains("Base de conhecimento:\n**A**\num\n\n**B**\ndois"));
        let kb = prompt.find("Base de conhecimento").unwrap();
        let hist = prompt.find("user: Olá").unwrap();
        let user = prompt.find("Usuário: Oi").unwrap();
        assert!(hist < kb && kb < user);
    }

    #[test]
    fn test_parse_openai_response() {
        let json = json!({ "choices": [{ "message": { "content": "  Olá!  " } }] });
        assert_eq!(parse_openai_response(&json).unwrap(), "Olá!");

        let empty = json!({ "choices": [] });
        assert!(matches!(
            parse_openai_response(&empty),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_gemini_response_joins_parts() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Olá, " }, { "text": "tudo bem?" }] } }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Olá, tudo bem?");

        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(
            parse_gemini_response(&blank),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_disabled_client_errors() {
        let client = create_client(&GenerationConfig::default()).unwrap();
        assert_eq!(client.name(), "disabled");
        assert!(matches!(
            client.generate(&request()).await,
            Err(GenerationError::Disabled)
        ));
    }

    #[test]
    fn test_missing_api_key_is_startup_error() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            api_key_env: Some("KNOWBASE_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..GenerationConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("KNOWBASE_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_endpoint_override_trims_slash() {
        let config = GenerationConfig {
            endpoint: Some("http://localhost:9000/v1/".to_string()),
            ..GenerationConfig::default()
        };
        assert_eq!(endpoint_or(&config, OPENAI_ENDPOINT), "http://localhost:9000/v1");
        assert_eq!(
            endpoint_or(&GenerationConfig::default(), GEMINI_ENDPOINT),
            GEMINI_ENDPOINT
        );
    }
}
