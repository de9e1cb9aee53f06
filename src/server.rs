//! JSON HTTP API for the portfolio chat widget and the admin pages.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Send a visitor message, get the assistant reply |
//! | `GET`  | `/sessions/{id}/turns` | Stored transcript of a session |
//! | `GET`  | `/analytics?days=7` | Aggregated activity |
//! | `GET`  | `/contacts?limit=20` | Most recent captured contacts |
//! | `GET`  | `/questions?limit=20` | Most recent unanswered questions |
//! | `GET`  | `/documents` | Loaded profile documents and stats |
//! | `GET`  | `/tools/list` | Tool schemas offered to the model |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must be a string" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! `POST /chat` itself never fails because of the model or storage; those
//! cases produce a fallback reply with status 200.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the widget can be
//! embedded on a static portfolio site.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analytics::{self, AnalyticsSummary};
use crate::documents::DocumentStats;
use crate::engine::{self, ConversationEngine};
use crate::error::Error;
use crate::llm::ToolSchema;
use crate::models::{Contact, ConversationTurn, DocumentRecord, UnknownQuestion};
use crate::tools;

const DEFAULT_DAYS: u32 = 7;
const MAX_DAYS: u32 = 365;
const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Clone)]
struct AppState {
    engine: Arc<ConversationEngine>,
}

/// All routes, with CORS applied.
pub fn router(engine: Arc<ConversationEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/sessions/{id}/turns", get(handle_session_turns))
        .route("/analytics", get(handle_analytics))
        .route("/contacts", get(handle_contacts))
        .route("/questions", get(handle_questions))
        .route("/documents", get(handle_documents))
        .route("/tools/list", get(handle_list_tools))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(engine: Arc<ConversationEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    serve(listener, engine).await
}

/// Serve on an already-bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    engine: Arc<ConversationEngine>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "folio API listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => bad_request(message),
            other => {
                tracing::error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    session_id: Option<String>,
    message: serde_json::Value,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
}

/// A missing `session_id` starts a new session; the id is returned so the
/// client can continue it.
async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = body
        .message
        .as_str()
        .ok_or_else(|| bad_request("message must be a string"))?;

    let session_id = match body.session_id {
        Some(id) => {
            engine::validate_session_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let reply = state.engine.handle_message(&session_id, message).await;
    Ok(Json(ChatResponse { session_id, reply }))
}

// ============ GET /sessions/{id}/turns ============

#[derive(Serialize)]
struct TurnsResponse {
    session_id: String,
    message_count: i64,
    turns: Vec<ConversationTurn>,
}

async fn handle_session_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TurnsResponse>, AppError> {
    let session = state
        .engine
        .store()
        .session(&session_id)
        .await?
        .ok_or_else(|| not_found(format!("session not found: {}", session_id)))?;
    let turns = state.engine.history(&session_id).await?;

    Ok(Json(TurnsResponse {
        session_id: session.session_id,
        message_count: session.message_count,
        turns,
    }))
}

// ============ GET /analytics ============

#[derive(Deserialize)]
struct AnalyticsQuery {
    days: Option<u32>,
}

async fn handle_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_DAYS);
    if days == 0 || days > MAX_DAYS {
        return Err(bad_request(format!("days must be between 1 and {}", MAX_DAYS)));
    }
    Ok(Json(analytics::summary(state.engine.store(), days).await?))
}

// ============ GET /contacts, GET /questions ============

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self) -> Result<i64, AppError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(bad_request(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        Ok(limit)
    }
}

#[derive(Serialize)]
struct ContactsResponse {
    total: i64,
    contacts: Vec<Contact>,
}

async fn handle_contacts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ContactsResponse>, AppError> {
    let store = state.engine.store();
    let contacts = store.recent_contacts(query.limit()?).await?;
    Ok(Json(ContactsResponse {
        total: store.contact_count().await?,
        contacts,
    }))
}

#[derive(Serialize)]
struct QuestionsResponse {
    questions: Vec<UnknownQuestion>,
}

async fn handle_questions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<QuestionsResponse>, AppError> {
    let questions = state
        .engine
        .store()
        .recent_unknown_questions(query.limit()?)
        .await?;
    Ok(Json(QuestionsResponse { questions }))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
    stats: DocumentStats,
}

async fn handle_documents(State(state): State<AppState>) -> Json<DocumentsResponse> {
    let documents = state.engine.documents();
    Json(DocumentsResponse {
        documents: documents.records().to_vec(),
        stats: documents.stats(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSchema>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: tools::tool_schemas(),
    })
}
