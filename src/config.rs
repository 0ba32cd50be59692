//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/knowbase.sqlite"
//!
//! [retrieval]
//! search_limit = 10
//! search_threshold = 0.3
//! chat_limit = 5
//! chat_threshold = 0.1
//! history_limit = 10
//!
//! [generation]
//! provider = "gemini"          # disabled | openai | gemini
//! model = "gemini-2.5-flash"
//! api_key_env = "GEMINI_API_KEY"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use knowbase_core::search::SearchParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Result bounds for the two retrieval call sites plus the chat history window.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f64,
    #[serde(default = "default_chat_limit")]
    pub chat_limit: usize,
    #[serde(default = "default_chat_threshold")]
    pub chat_threshold: f64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_search_limit() -> usize {
    SearchParams::SEARCH_ENDPOINT.limit
}
fn default_search_threshold() -> f64 {
    SearchParams::SEARCH_ENDPOINT.threshold
}
fn default_chat_limit() -> usize {
    SearchParams::CHAT_CONTEXT.limit
}
fn default_chat_threshold() -> f64 {
    SearchParams::CHAT_CONTEXT.threshold
}
fn default_history_limit() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            search_threshold: default_search_threshold(),
            chat_limit: default_chat_limit(),
            chat_threshold: default_chat_threshold(),
            history_limit: default_history_limit(),
        }
    }
}

impl RetrievalConfig {
    /// Defaults for `POST /knowledge-base/search` and `knowbase search`.
    pub fn search_params(&self) -> SearchParams {
        SearchParams::new(self.search_limit, self.search_threshold)
    }

    /// Bounds for knowledge injected into chat prompts.
    pub fn chat_params(&self) -> SearchParams {
        SearchParams::new(self.chat_limit, self.chat_threshold)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (e.g. a self-hosted OpenAI-compatible server).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            endpoint: None,
            api_key_env: None,
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_top_p() -> f64 {
    0.8
}
fn default_top_k() -> u32 {
    40
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The environment variable the API key is read from.
    pub fn api_key_var(&self) -> &str {
        if let Some(var) = self.api_key_env.as_deref() {
            return var;
        }
        match self.provider.as_str() {
            "gemini" => "GEMINI_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let r = &config.retrieval;
    for (name, value) in [
        ("search_threshold", r.search_threshold),
        ("chat_threshold", r.chat_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }

    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    Ok(config)
}
