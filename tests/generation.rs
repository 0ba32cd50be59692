//! Generation clients against a local mock upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use knowbase::config::GenerationConfig;
use knowbase::generation::{
    GeminiClient, GenerationClient, GenerationError, GenerationRequest, OpenAiClient,
};

#[derive(Clone, Default)]
struct Upstream {
    calls: Arc<AtomicUsize>,
    /// Status codes returned before the first success.
    failures: Arc<Mutex<Vec<StatusCode>>>,
    last_body: Arc<Mutex<Option<Value>>>,
    last_auth: Arc<Mutex<Option<String>>>,
}

impl Upstream {
    fn record(&self, headers: &HeaderMap, name: &str, body: Value) -> Option<StatusCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().unwrap() = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_body.lock().unwrap() = Some(body);
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            None
        } else {
            Some(failures.remove(0))
        }
    }
}

async fn openai_handler(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match up.record(&headers, "authorization", body) {
        Some(status) => (status, Json(json!({ "error": "nope" }))),
        None => (
            StatusCode::OK,
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": " Olá! " } }] })),
        ),
    }
}

async fn gemini_handler(
    State(up): State<Upstream>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if rest != "gemini-test:generateContent" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": rest })));
    }
    match up.record(&headers, "x-goog-api-key", body) {
        Some(status) => (status, Json(json!({ "error": "nope" }))),
        None => (
            StatusCode::OK,
            Json(json!({ "candidates": [{ "content": { "parts": [{ "text": "Oi, " }, { "text": "tudo bem?" }] } }] })),
        ),
    }
}

async fn start_upstream(failures: Vec<StatusCode>) -> (String, Upstream) {
    let upstream = Upstream::default();
    *upstream.failures.lock().unwrap() = failures;

    let app = Router::new()
        .route("/chat/completions", post(openai_handler))
        .route("/models/{*rest}", post(gemini_handler))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), upstream)
}

fn config(provider: &str, endpoint: &str, max_retries: u32) -> GenerationConfig {
    GenerationConfig {
        provider: provider.to_string(),
        model: Some(format!("{}-test", provider)),
        endpoint: Some(endpoint.to_string()),
        max_retries,
        timeout_secs: 5,
        ..GenerationConfig::default()
    }
}

fn request() -> GenerationRequest {
    GenerationRequest {
        system_prompt: "Seja breve.".to_string(),
        history: vec![],
        knowledge: vec!["**Horário**\n8h às 18h".to_string()],
        message: "Que horas abre?".to_string(),
        temperature: 0.2,
        max_tokens: 256,
    }
}

#[tokio::test]
async fn test_openai_success_sends_prompt_and_key() {
    let (endpoint, upstream) = start_upstream(vec![]).await;
    let client = OpenAiClient::new(&config("openai", &endpoint, 0), "sk-test".to_string()).unwrap();

    let text = client.generate(&request()).await.unwrap();
    assert_eq!(text, "Olá!");
    assert_eq!(
        upstream.last_auth.lock().unwrap().as_deref(),
        Some("Bearer sk-test")
    );

    let body = upstream.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "openai-test");
    assert_eq!(body["max_tokens"], 256);
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("Base de conhecimento:\n**Horário**\n8h às 18h"));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (endpoint, upstream) = start_upstream(vec![StatusCode::SERVICE_UNAVAILABLE]).await;
    let client = OpenAiClient::new(&config("openai", &endpoint, 1), "sk-test".to_string()).unwrap();

    let text = client.generate(&request()).await.unwrap();
    assert_eq!(text, "Olá!");
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (endpoint, upstream) = start_upstream(vec![StatusCode::BAD_REQUEST]).await;
    let client = OpenAiClient::new(&config("openai", &endpoint, 3), "sk-test".to_string()).unwrap();

    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Api { status: 400, .. }));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_last_error() {
    let (endpoint, upstream) = start_upstream(vec![
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::TOO_MANY_REQUESTS,
    ])
    .await;
    let client = OpenAiClient::new(&config("openai", &endpoint, 1), "sk-test".to_string()).unwrap();

    let err = client.generate(&request()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Api { status: 429, .. }));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_gemini_generate_content() {
    let (endpoint, upstream) = start_upstream(vec![]).await;
    let client = GeminiClient::new(&config("gemini", &endpoint, 0), "g-key".to_string()).unwrap();

    let text = client.generate(&request()).await.unwrap();
    assert_eq!(text, "Oi, tudo bem?");
    assert_eq!(upstream.last_auth.lock().unwrap().as_deref(), Some("g-key"));

    let body = upstream.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    assert_eq!(body["generationConfig"]["topK"], 40);
    assert!(body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .ends_with("Usuário: Que horas abre?\nAssistente:"));
}
