//! Web UI and JSON API for chatting with uploaded PDFs.
//!
//! One process-wide [`Session`] sits behind a `tokio::sync::Mutex`, so a
//! processing run and a question never interleave. The HTML routes always
//! redirect back to `/`; failures are kept on the session and shown in the
//! page's status line.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page with upload form and rendered history |
//! | `POST` | `/process` | Multipart upload (`pdfs`), then redirect to `/` |
//! | `POST` | `/ask` | Form field `question`, then redirect to `/` |
//! | `POST` | `/api/process` | Multipart upload, returns the processing summary |
//! | `POST` | `/api/ask` | `{"question": ...}`, returns the answer and history |
//! | `GET`  | `/api/history` | Current session state |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! JSON routes report failures as:
//!
//! ```json
//! { "error": { "code": "not_processed", "message": "no documents have been processed yet; ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `missing_credential` (401),
//! `not_found` (404), `not_processed` (409), `upstream_error` (502),
//! `internal` (500).

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::Error;
use crate::models::{Turn, UploadedFile};
use crate::session::{ProcessSummary, Session};
use crate::templates::{render_page, Status};

/// Uploads above this size are rejected before they reach the extractor.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/process", post(handle_process_form))
        .route("/ask", post(handle_ask_form))
        .route("/api/process", post(handle_process_api))
        .route("/api/ask", post(handle_ask_api))
        .route("/api/history", get(handle_history))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the web UI on `[server].bind` and serves until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let session = Session::open(config.clone()).await?;
    let app = router(AppState::new(session));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "web UI listening");
    println!("PDF chat listening on http://{}", bind_addr);

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
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_processed"`).
    code: String,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
#[derive(Debug)]
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Extract { .. } | Error::NoDocuments(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            Error::MissingCredential { .. } => (StatusCode::UNAUTHORIZED, "missing_credential"),
            Error::NotProcessed => (StatusCode::CONFLICT, "not_processed"),
            Error::CollectionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Remote { .. } | Error::InvalidResponse { .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            Error::Config(_) | Error::Storage(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ Uploads ============

/// Collects every non-empty `pdfs` part of a multipart body, in order.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("pdfs") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload '{}': {}", name, e)))?;

        // Browsers send one empty part when no file was chosen
        if name.is_empty() && bytes.is_empty() {
            continue;
        }
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }
    Ok(files)
}

// ============ HTML routes ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    let session = state.session.lock().await;
    let status = match (session.last_error(), session.history()) {
        (Some(message), _) => Status::Failed(message),
        (None, Some([])) => Status::Processed,
        _ => Status::None,
    };
    Html(render_page(session.history(), status))
}

async fn handle_process_form(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let files = read_uploads(multipart).await?;
    let mut session = state.session.lock().await;
    // The outcome is recorded on the session and rendered by `/`
    let _ = session.process(&files).await;
    Ok(Redirect::to("/"))
}

#[derive(Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

async fn handle_ask_form(State(state): State<AppState>, Form(form): Form<AskForm>) -> Redirect {
    let question = form.question.trim();
    if !question.is_empty() {
        let mut session = state.session.lock().await;
        // Failures are shown through the session's last error
        let _ = session.ask(question).await;
    }
    Redirect::to("/")
}

// ============ JSON routes ============

async fn handle_process_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessSummary>, AppError> {
    let files = read_uploads(multipart).await?;
    let mut session = state.session.lock().await;
    Ok(Json(session.process(&files).await?))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<String>,
    history: Vec<Turn>,
}

async fn handle_ask_api(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut session = state.session.lock().await;
    let answer = session.ask(question).await?;
    Ok(Json(AskResponse {
        answer: answer.reply,
        sources: answer.sources,
        history: session.history().map(<[Turn]>::to_vec).unwrap_or_default(),
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    active: bool,
    collection_id: Option<String>,
    /// `null` while no documents have been processed.
    history: Option<Vec<Turn>>,
    last_error: Option<String>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let session = state.session.lock().await;
    Json(HistoryResponse {
        active: session.is_active(),
        collection_id: session.collection_id().map(str::to_string),
        history: session.history().map(<[Turn]>::to_vec),
        last_error: session.last_error().map(str::to_string),
    })
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
