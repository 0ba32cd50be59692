//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/knowledge-base/search` | Rank a chatbot's knowledge for a query |
//! | `GET`  | `/chatbots/{id}/knowledge-base` | List a chatbot's knowledge items |
//! | `POST` | `/knowledge-base` | Add a knowledge item |
//! | `POST` | `/chat/{chatbot_id}` | Run one chat turn |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query and chatbotId are required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! All origins, methods, and headers are permitted (CORS).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use knowbase_core::models::{ItemType, KnowledgeItem};
use knowbase_core::store::{ConversationStore, KnowledgeStore};

use crate::chat::{ChatError, ChatReply, ChatRequest, ChatService};
use crate::config::Config;
use crate::db;
use crate::generation::{create_client, GenerationClient};
use crate::search::{search_knowledge, SearchOverrides, SearchResponse};

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    knowledge: Arc<dyn KnowledgeStore>,
    chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(
        config: Config,
        knowledge: Arc<dyn KnowledgeStore>,
        conversations: Arc<dyn ConversationStore>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        let chat = ChatService::new(knowledge.clone(), conversations, generator)
            .with_params(config.retrieval.chat_params())
            .with_history_limit(config.retrieval.history_limit);
        Self {
            config: Arc::new(config),
            knowledge,
            chat: Arc::new(chat),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/knowledge-base/search", post(handle_search))
        .route("/knowledge-base", post(handle_create_item))
        .route("/chatbots/{id}/knowledge-base", get(handle_list_items))
        .route("/chat/{chatbot_id}", post(handle_chat))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` with the configured generation
/// backend. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let store = Arc::new(db::open_store(&config.db.path).await?);
    let generator = create_client(&config.generation)?;

    tracing::info!(provider = generator.name(), "generation backend ready");

    let state = AppState::new(config.clone(), store.clone(), store, generator);
    let app = router(state);

    tracing::info!("knowbase server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "Internal server error".to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidRequest(msg) => bad_request(msg),
            ChatError::ChatbotNotFound(_) => not_found(err.to_string()),
            ChatError::ChatbotInactive(_) => bad_request(err.to_string()),
            ChatError::Store(e) => internal(e),
        }
    }
}

/// Unreadable or badly typed JSON bodies share the error contract.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    chatbot_id: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    explain: bool,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body?;
    if req.query.trim().is_empty() || req.chatbot_id.trim().is_empty() {
        return Err(bad_request("query and chatbotId are required"));
    }

    let overrides = SearchOverrides {
        limit: req.limit,
        threshold: req.threshold,
        explain: req.explain,
    };
    let params = overrides
        .resolve(state.config.retrieval.search_params())
        .map_err(|e| bad_request(e.to_string()))?;

    match search_knowledge(state.knowledge.as_ref(), &req.chatbot_id, &req.query, &params).await {
        Ok(Some(response)) => Ok(Json(response)),
        Ok(None) => Err(not_found(format!("chatbot not found: {}", req.chatbot_id))),
        Err(e) => Err(internal(e)),
    }
}

async fn handle_list_items(
    State(state): State<AppState>,
    Path(chatbot_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if state
        .knowledge
        .get_chatbot(&chatbot_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(not_found(format!("chatbot not found: {}", chatbot_id)));
    }

    let items = state
        .knowledge
        .fetch_knowledge_items(&chatbot_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateItemRequest {
    #[serde(default)]
    chatbot_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "type")]
    item_type: ItemType,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn handle_create_item(
    State(state): State<AppState>,
    body: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(req) = body?;
    if req.chatbot_id.trim().is_empty() || req.title.trim().is_empty() || req.content.trim().is_empty()
    {
        return Err(bad_request("chatbotId, title and content are required"));
    }

    if state
        .knowledge
        .get_chatbot(&req.chatbot_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(not_found(format!("chatbot not found: {}", req.chatbot_id)));
    }

    let mut item = KnowledgeItem::new(uuid::Uuid::new_v4().to_string(), req.title, req.content)
        .with_type(req.item_type);
    if let Some(source) = req.source {
        item = item.with_source(source);
    }
    if let Some(metadata) = req.metadata {
        item = item.with_metadata(metadata);
    }
    if let Some(tags) = req.tags {
        item = item.with_tags(tags);
    }

    state
        .knowledge
        .insert_knowledge_item(&req.chatbot_id, &item)
        .await
        .map_err(internal)?;

    tracing::info!(chatbot_id = %req.chatbot_id, item_id = %item.id, "knowledge item created");
    Ok((StatusCode::CREATED, Json(json!({ "item": item }))))
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(chatbot_id): Path<String>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let Json(req) = body?;
    let reply = state.chat.respond(&chatbot_id, &req).await?;
    Ok(Json(reply))
}
