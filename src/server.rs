//! JSON HTTP API.
//!
//! Exposes the library, books, sessions, stats, goals and notification
//! checks over HTTP for browser and mobile clients.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/books?status=` | List books, optionally by status |
//! | `POST`   | `/books` | Add a book (optimistic save) |
//! | `PUT`    | `/books/{id}/progress` | Set the current page |
//! | `DELETE` | `/books/{id}` | Delete a book |
//! | `GET`    | `/library` | Status tabs plus today/week reading time |
//! | `POST`   | `/sessions` | Record a stopped stopwatch session |
//! | `GET`    | `/sessions/recent` | Last five sessions |
//! | `GET`    | `/stats?period=` | History chart (`days`, `weeks`, `months`) |
//! | `GET`    | `/goals` | Goals with derived progress and standing |
//! | `POST`   | `/goals` | Create a goal |
//! | `POST`   | `/goals/{id}/bump` | Adjust a manual goal |
//! | `DELETE` | `/goals/{id}` | Delete a goal |
//! | `POST`   | `/notifications/check` | Run a manual reminder check |
//!
//! # Identity
//!
//! Requests act as the user named in the `x-user-id` header, which the
//! authenticating proxy in front of the server sets. Without it the
//! configured `[user].id` is used.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "title is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `permission_denied` (403),
//! `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use shelf_core::models::{BookStatus, Device};
use shelf_core::reading_stats::Period;

use crate::client::{Client, UserScope};
use crate::config::Config;
use crate::error::{classify, ErrorKind};
use crate::notify::{CheckMode, Dispatcher, NotificationManager};
use crate::stopwatch::SessionInput;
use crate::{books, goals, library, stats};

const USER_HEADER: &str = "x-user-id";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    client: Client,
}

impl AppState {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            config: Arc::new(config.clone()),
            client,
        }
    }

    fn scope(&self, headers: &HeaderMap) -> UserScope {
        let user = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.config.user.id.as_str());
        self.client.user(user)
    }
}

/// Starts the HTTP server on the configured SQLite database.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let client = Client::open(config).await?;
    run_server_with_client(config, client).await
}

/// Starts the HTTP server on an already-built [`Client`], e.g. one backed
/// by a custom store.
pub async fn run_server_with_client(config: &Config, client: Client) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config, client));

    tracing::info!(bind = %bind_addr, "shelf server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/books", get(handle_list_books).post(handle_add_book))
        .route("/books/{id}/progress", put(handle_progress))
        .route("/books/{id}", axum::routing::delete(handle_delete_book))
        .route("/library", get(handle_library))
        .route("/sessions", post(handle_record_session))
        .route("/sessions/recent", get(handle_recent_sessions))
        .route("/stats", get(handle_stats))
        .route("/goals", get(handle_list_goals).post(handle_create_goal))
        .route("/goals/{id}/bump", post(handle_bump_goal))
        .route("/goals/{id}", axum::routing::delete(handle_delete_goal))
        .route("/notifications/check", post(handle_notification_check))
        .layer(cors)
        .with_state(state)
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

pub struct AppError {
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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match classify(&err) {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Internal => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
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

type ApiResult<T> = Result<T, AppError>;

/// Decode a request body, reporting shape errors as `bad_request`.
fn parse_body<T: DeserializeOwned>(body: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| bad_request(format!("invalid request body: {}", e)))
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

// ============ Books ============

#[derive(Deserialize)]
struct BooksParams {
    status: Option<String>,
}

async fn handle_list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BooksParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref() {
        Some(s) => Some(s.parse::<BookStatus>().map_err(|e| bad_request(e.to_string()))?),
        None => None,
    };
    let books = books::list(&state.scope(&headers), status).await?;
    Ok(Json(serde_json::json!({ "books": books })))
}

async fn handle_add_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let input: books::BookInput = parse_body(body)?;
    let added = books::add(&state.scope(&headers), input, state.config.save.book_timeout()).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody {
    current_page: i64,
}

async fn handle_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let body: ProgressBody = parse_body(body)?;
    let book = books::update_progress(&state.scope(&headers), &id, body.current_page, Utc::now()).await?;
    Ok(Json(book))
}

async fn handle_delete_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    books::delete(&state.scope(&headers), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_library(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let view = library::snapshot(&state.scope(&headers), &Local::now()).await?;
    Ok(Json(view))
}

// ============ Sessions & stats ============

async fn handle_record_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let input: SessionInput = parse_body(body)?;
    let device = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(Device::from_user_agent)
        .unwrap_or_default();
    let recorded =
        crate::stopwatch::log_session(&state.scope(&headers), input, device, state.config.save.timeout()).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

async fn handle_recent_sessions(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let sessions = stats::recent_sessions(&state.scope(&headers)).await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

#[derive(Deserialize)]
struct StatsParams {
    period: Option<String>,
}

async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StatsParams>,
) -> ApiResult<impl IntoResponse> {
    let period = match params.period.as_deref() {
        Some(p) => p.parse::<Period>().map_err(|e| bad_request(e.to_string()))?,
        None => Period::default(),
    };
    let view = stats::history(&state.scope(&headers), period, &Local::now()).await?;
    Ok(Json(view))
}

// ============ Goals ============

async fn handle_list_goals(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let views = goals::list(&state.scope(&headers), Utc::now()).await?;
    Ok(Json(serde_json::json!({ "goals": views })))
}

async fn handle_create_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let input: goals::GoalInput = parse_body(body)?;
    let added = goals::create(&state.scope(&headers), input, state.config.save.timeout()).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

fn default_bump() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct BumpBody {
    #[serde(default = "default_bump")]
    by: f64,
}

async fn handle_bump_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let body: BumpBody = parse_body(body)?;
    let goal = goals::bump(&state.scope(&headers), &id, body.by).await?;
    Ok(Json(goal))
}

async fn handle_delete_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    goals::delete(&state.scope(&headers), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Notifications ============

async fn handle_notification_check(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let dispatcher = Dispatcher::from_config(&state.config.notifications)?;
    let manager = NotificationManager::new(state.scope(&headers), &state.config.notifications, dispatcher);
    let outcome = manager.check(CheckMode::Manual, &Local::now()).await?;
    Ok(Json(outcome))
}
