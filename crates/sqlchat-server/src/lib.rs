//! HTTP surface for the sqlchat streaming core via axum

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use sqlchat_core::logging::Logger;
use sqlchat_core::{
    classify_statement, log_info, log_warn, ChatRequest, Classification, ConversationOrchestrator,
    CoreError, EventStream, QueryEngine, QueryRequest,
};

const NDJSON: &str = "application/x-ndjson";
const EXECUTION_ID_HEADER: &str = "x-execution-id";

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub engine: Arc<QueryEngine>,
    pub logger: Arc<dyn Logger>,
}

impl AppState {
    pub fn new(orchestrator: ConversationOrchestrator, engine: QueryEngine, logger: Arc<dyn Logger>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            engine: Arc::new(engine),
            logger,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/cancel", post(cancel_chat))
        .route("/api/query/classify", post(classify))
        .route("/api/query", post(query))
        .route("/api/query/cancel", post(cancel_query))
        .route("/api/models", post(models))
        .route("/api/connections/:id/schema", get(schema))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure before any streaming began
#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status().http_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelChatBody {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelQueryBody {
    pub execution_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(flatten)]
    pub request: QueryRequest,
    /// Caller acknowledged a mutating statement
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ModelsBody {
    pub provider: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationRequired {
    pub error: String,
    pub classification: Classification,
}

// ============================================================================
// Handlers
// ============================================================================

fn ndjson_response(lines: impl futures::Stream<Item = String> + Send + 'static) -> Response {
    let mut response = Response::new(Body::from_stream(lines.map(Ok::<_, Infallible>)));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    response
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> ApiResult<Response> {
    log_info!(
        state.logger,
        "[Server] POST /api/chat provider={} connection={}",
        request.provider_config.provider,
        request.connection_id
    );
    let events: EventStream = state.orchestrator.generate_turn(request).await?;
    Ok(ndjson_response(events.map(|event| event.to_frame())))
}

async fn cancel_chat(State(state): State<AppState>, Json(body): Json<CancelChatBody>) -> impl IntoResponse {
    let cancelled = state.orchestrator.cancel(&body.conversation_id);
    (StatusCode::ACCEPTED, Json(CancelResponse { cancelled }))
}

async fn classify(Json(body): Json<ClassifyBody>) -> Json<Classification> {
    Json(classify_statement(&body.sql))
}

async fn query(State(state): State<AppState>, Json(body): Json<QueryBody>) -> ApiResult<Response> {
    let classification = classify_statement(&body.request.sql);
    if classification.is_mutating() && !body.confirmed {
        log_warn!(
            state.logger,
            "[Server] Refusing unconfirmed mutating statement ({})",
            classification.verbs.join(", ")
        );
        let conflict = ConfirmationRequired {
            error: "Statement modifies data; resend with confirmed: true".to_string(),
            classification,
        };
        return Ok((StatusCode::CONFLICT, Json(conflict)).into_response());
    }

    let execution = state.engine.execute(body.request).await?;
    let lines = execution
        .events
        .filter_map(|event| future::ready(event.to_ndjson_line()));
    let mut response = ndjson_response(lines);
    if let Ok(value) = HeaderValue::from_str(&execution.execution_id) {
        response.headers_mut().insert(EXECUTION_ID_HEADER, value);
    }
    Ok(response)
}

async fn cancel_query(State(state): State<AppState>, Json(body): Json<CancelQueryBody>) -> impl IntoResponse {
    let cancelled = state.engine.cancel(&body.execution_id);
    (StatusCode::ACCEPTED, Json(CancelResponse { cancelled }))
}

async fn models(State(state): State<AppState>, Json(body): Json<ModelsBody>) -> ApiResult<Json<Vec<String>>> {
    let models = state.orchestrator.list_models(&body.provider, &body.endpoint).await?;
    Ok(Json(models))
}

async fn schema(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    Ok(state.engine.introspect_schema(&id).await?)
}
