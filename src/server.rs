//! HTTP server.
//!
//! Exposes the tracker as a JSON HTTP API so a browser front-end can render
//! the document picker, the transcript, and the citation line. Each browser
//! tab creates its own session; sessions never share state.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/documents` | Document catalog, re-listed on every request |
//! | `GET`  | `/workflows` | Workflow options and sample queries |
//! | `POST` | `/sessions` | Start a session |
//! | `GET`  | `/sessions/{id}` | Session phase, selection and transcript |
//! | `DELETE` | `/sessions/{id}` | End a session |
//! | `POST` | `/sessions/{id}/selection` | Select a document and/or workflow |
//! | `POST` | `/sessions/{id}/messages` | Ask a free-text question |
//! | `POST` | `/sessions/{id}/workflow` | Ask the selected workflow's question |
//! | `POST` | `/sessions/{id}/dismiss` | Clear the session's error |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "knowledge base is rate limiting requests: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `catalog_error` (502), `unauthorized` (502), `malformed_response` (502),
//! `rate_limited` (429), `unavailable` (503).
//!
//! A failed question leaves the session in its `error` phase with the
//! question kept in the transcript; `POST /sessions/{id}/dismiss` clears it.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::{CatalogError, ServiceError, SessionError, TurnError};
use crate::models::DocumentRecord;
use crate::session::{SessionState, SessionStore, Turn};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    controller: Arc<Controller>,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, sessions: SessionStore) -> Self {
        Self {
            controller,
            sessions,
        }
    }
}

/// Build the router with all endpoints.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_documents))
        .route("/workflows", get(handle_workflows))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/selection", post(handle_selection))
        .route("/sessions/{id}/messages", post(handle_message))
        .route("/sessions/{id}/workflow", post(handle_workflow))
        .route("/sessions/{id}/dismiss", post(handle_dismiss))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config, controller: Controller) -> anyhow::Result<()> {
    let state = AppState::new(Arc::new(controller), SessionStore::new());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "tracker server listening");
    println!("Tracker server listening on http://{}", config.server.bind);
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
    /// Machine-readable error code (e.g., `"bad_request"`, `"rate_limited"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
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

fn session_not_found(id: Uuid) -> AppError {
    AppError::new(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("no session with id: {}", id),
    )
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let (status, code) = match err {
            SessionError::Busy => (StatusCode::CONFLICT, "conflict"),
            SessionError::UnknownDocument(_) => (StatusCode::NOT_FOUND, "not_found"),
            SessionError::EmptyQuestion
            | SessionError::IncompleteSelection
            | SessionError::UnknownWorkflow(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        AppError::new(status, code, err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match err {
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Unauthorized(_) | ServiceError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        AppError::new(status, err.code(), err.to_string())
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        AppError::new(StatusCode::BAD_GATEWAY, "catalog_error", err.to_string())
    }
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Session(e) => e.into(),
            TurnError::Service(e) => e.into(),
            TurnError::Catalog(e) => e.into(),
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

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentEntry {
    label: String,
    #[serde(flatten)]
    document: DocumentRecord,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentEntry>,
}

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state
        .controller
        .documents()
        .await?
        .into_iter()
        .map(|document| DocumentEntry {
            label: document.label(),
            document,
        })
        .collect();
    Ok(Json(DocumentListResponse { documents }))
}

// ============ GET /workflows ============

#[derive(Serialize)]
struct WorkflowListResponse {
    options: Vec<String>,
    sample_queries: Vec<String>,
}

async fn handle_workflows(State(state): State<AppState>) -> Json<WorkflowListResponse> {
    Json(WorkflowListResponse {
        options: state.controller.workflow_options().to_vec(),
        sample_queries: state.controller.sample_queries().to_vec(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct CreatedSession {
    id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreatedSession>) {
    let id = state.sessions.create();
    (StatusCode::CREATED, Json(CreatedSession { id }))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionState>, AppError> {
    state
        .sessions
        .snapshot(id)
        .map(Json)
        .ok_or_else(|| session_not_found(id))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(id))
    }
}

#[derive(Deserialize)]
struct SelectionRequest {
    #[serde(default)]
    document_key: Option<String>,
    #[serde(default)]
    workflow: Option<String>,
}

async fn handle_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SessionState>, AppError> {
    if state.sessions.snapshot(id).is_none() {
        return Err(session_not_found(id));
    }
    if req.document_key.is_none() && req.workflow.is_none() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "provide document_key and/or workflow",
        ));
    }

    // The catalog is listed outside the session lock.
    let document = match req.document_key {
        Some(ref key) => Some(
            state
                .controller
                .documents()
                .await?
                .into_iter()
                .find(|doc| &doc.key == key)
                .ok_or_else(|| SessionError::UnknownDocument(key.clone()))?,
        ),
        None => None,
    };

    let controller = state.controller.clone();
    state
        .sessions
        .with(id, |session| -> Result<SessionState, SessionError> {
            if let Some(label) = req.workflow.as_deref() {
                controller.select_workflow(session, label)?;
            }
            if let Some(document) = document {
                session.select_document(document)?;
            }
            Ok(session.clone())
        })
        .ok_or_else(|| session_not_found(id))?
        .map(Json)
        .map_err(AppError::from)
}

#[derive(Deserialize)]
struct MessageRequest {
    text: String,
}

/// Run one turn for a session without holding the store lock across the
/// knowledge base call.
///
/// Dispatch and `finish_turn` run in their own task, so a client that
/// disconnects mid-turn still leaves the session `Idle` or `Error`,
/// never stuck in `Dispatching`.
async fn run_turn(state: &AppState, id: Uuid, text: &str) -> Result<Json<Turn>, AppError> {
    let request = state
        .sessions
        .with(id, |session| session.begin_turn(text))
        .ok_or_else(|| session_not_found(id))??;

    let controller = state.controller.clone();
    let sessions = state.sessions.clone();
    let task = tokio::spawn(async move {
        let outcome = controller.dispatch(&request).await;
        sessions.with(id, |session| session.finish_turn(outcome))
    });

    let finished = match task.await {
        Ok(finished) => finished,
        Err(err) => {
            tracing::error!(session = %id, error = %err, "turn task failed");
            let failure = ServiceError::Unavailable(format!("turn aborted: {}", err));
            state
                .sessions
                .with(id, |session| session.finish_turn(Err(failure)))
        }
    };

    finished
        .ok_or_else(|| session_not_found(id))?
        .map(Json)
        .map_err(AppError::from)
}

async fn handle_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<Turn>, AppError> {
    run_turn(&state, id, &req.text).await
}

async fn handle_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Turn>, AppError> {
    let template = state.controller.template().clone();
    let request = state
        .sessions
        .with(id, |session| session.workflow_request(&template))
        .ok_or_else(|| session_not_found(id))??;
    run_turn(&state, id, &request.text).await
}

async fn handle_dismiss(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionState>, AppError> {
    state
        .sessions
        .with(id, |session| {
            session.dismiss_error();
            session.clone()
        })
        .map(Json)
        .ok_or_else(|| session_not_found(id))
}
