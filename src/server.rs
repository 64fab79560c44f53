//! JSON HTTP API over the inbox.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`   | `/health` | Health check (returns version) |
//! | `GET`   | `/emails` | List stored emails (`status`, `search`, `limit` query params) |
//! | `GET`   | `/emails/{id}` | One stored email |
//! | `PATCH` | `/emails/{id}/mark-read` | Status → `read` |
//! | `PATCH` | `/emails/{id}/mark-unread` | Status → `unread` |
//! | `PATCH` | `/emails/{id}/archive` | Status → `archived` |
//! | `POST`  | `/emails/fetch` | Run one ingestion batch |
//! | `GET`   | `/emails/imap-status` | Mailbox configuration readiness |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "email not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A fetch that could not run (missing configuration, connection failure)
//! is a `bad_request` carrying the batch message.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::inbox::{self, EmailResponse, ListFilter};
use crate::ingest::Ingestor;
use crate::mailbox::{ImapConnector, MailboxConnector};
use crate::migrate;
use crate::models::EmailStatus;
use crate::status::{imap_status, ImapStatus};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, connector: Arc<dyn MailboxConnector>) -> Self {
        Self {
            config: Arc::new(config),
            ingestor: Arc::new(Ingestor::new(pool, connector)),
        }
    }

    fn pool(&self) -> &SqlitePool {
        self.ingestor.pool()
    }
}

/// All routes, with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/emails", get(handle_list))
        .route("/emails/fetch", post(handle_fetch))
        .route("/emails/imap-status", get(handle_imap_status))
        .route("/emails/{id}", get(handle_get))
        .route("/emails/{id}/mark-read", patch(handle_mark_read))
        .route("/emails/{id}/mark-unread", patch(handle_mark_unread))
        .route("/emails/{id}/archive", patch(handle_archive))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let state = AppState::new(config.clone(), pool, Arc::new(ImapConnector::new()));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("crm-inbox listening on http://{}", bind_addr);
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Store errors that name a missing row become 404, the rest 500.
fn classify_store_error(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    if msg.contains("not found") {
        not_found(msg)
    } else {
        internal(msg)
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

// ============ GET /emails ============

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    count: usize,
    emails: Vec<EmailResponse>,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<EmailStatus>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
    };
    if matches!(query.limit, Some(limit) if limit < 1) {
        return Err(bad_request("limit must be >= 1"));
    }

    let filter = ListFilter {
        status,
        search: query.search,
        limit: query.limit,
    };
    let emails = inbox::list_emails(state.pool(), &filter)
        .await
        .map_err(classify_store_error)?;

    Ok(Json(ListResponse {
        count: emails.len(),
        emails,
    }))
}

// ============ GET /emails/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EmailResponse>, AppError> {
    let email = inbox::get_email(state.pool(), &id)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(email))
}

// ============ PATCH /emails/{id}/... ============

#[derive(Serialize)]
struct StatusChangeResponse {
    id: String,
    status: EmailStatus,
}

async fn change_status(
    state: &AppState,
    id: String,
    status: EmailStatus,
) -> Result<Json<StatusChangeResponse>, AppError> {
    inbox::set_status(state.pool(), &id, status)
        .await
        .map_err(classify_store_error)?;
    Ok(Json(StatusChangeResponse { id, status }))
}

async fn handle_mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    change_status(&state, id, EmailStatus::Read).await
}

async fn handle_mark_unread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    change_status(&state, id, EmailStatus::Unread).await
}

async fn handle_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    change_status(&state, id, EmailStatus::Archived).await
}

// ============ POST /emails/fetch ============

#[derive(Deserialize, Default)]
struct FetchRequest {
    folder: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct FetchResponse {
    success: bool,
    message: String,
    fetched_count: usize,
    saved_count: usize,
}

/// An empty body runs with the configured folder and limit.
async fn handle_fetch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FetchResponse>, AppError> {
    let request: FetchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FetchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };

    let imap = state
        .config
        .imap
        .as_ref()
        .ok_or_else(|| bad_request("IMAP is not configured"))?;

    let folder = request
        .folder
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| state.config.ingest.folder.clone());
    let limit = request.limit.unwrap_or(state.config.ingest.limit);
    if limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }

    let report = state.ingestor.fetch(imap, &folder, limit).await;
    if !report.success {
        return Err(bad_request(report.message));
    }

    Ok(Json(FetchResponse {
        success: report.success,
        message: report.message,
        fetched_count: report.fetched,
        saved_count: report.saved,
    }))
}

// ============ GET /emails/imap-status ============

async fn handle_imap_status(State(state): State<AppState>) -> Json<ImapStatus> {
    Json(imap_status(&state.config))
}
