use crate::db::NewMessage;
use crate::error::{AppError, AppResult};
use crate::id::is_well_formed;
use crate::web::middleware::{log_request, with_security_headers};
use crate::web::state::AppState;
use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

/// Lifetime choices offered on the compose page
const TTL_OPTIONS: [(i64, &str); 3] = [(3_600, "1 hour"), (86_400, "1 day"), (604_800, "1 week")];

pub struct TtlOption {
    pub value: i64,
    pub label: &'static str,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    ttl_options: Vec<TtlOption>,
    selected_ttl: i64,
}

#[derive(Template)]
#[template(path = "show.html")]
struct ShowTemplate {
    id: String,
}

/// Body of `POST /api/message`
#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub ciphertext: String,
    pub nonce: String,
    #[serde(default)]
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    pub id: String,
    pub view_url: String,
    pub expires_at: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub ciphertext: String,
    pub nonce: String,
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "ok"
}

/// Compose page
async fn index(State(state): State<AppState>) -> AppResult<Html<String>> {
    let template = IndexTemplate {
        ttl_options: TTL_OPTIONS
            .iter()
            .map(|&(value, label)| TtlOption { value, label })
            .collect(),
        selected_ttl: state.store.default_ttl_secs(),
    };
    Ok(Html(template.render()?))
}

/// Read page; the browser fetches and decrypts the message itself
async fn show(Path(id): Path<String>) -> AppResult<Html<String>> {
    if !is_well_formed(&id) {
        return Err(AppError::NotFound);
    }
    Ok(Html(ShowTemplate { id }.render()?))
}

/// Store an encrypted message
async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> AppResult<Json<CreateMessageResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::invalid_request("invalid JSON")
        }
    })?;

    if request.ciphertext.trim().is_empty() || request.nonce.trim().is_empty() {
        return Err(AppError::invalid_request("missing fields"));
    }

    let created = state
        .store
        .put(NewMessage {
            ciphertext: request.ciphertext,
            nonce: request.nonce,
            ttl_secs: request.ttl_seconds,
        })
        .await?;

    Ok(Json(CreateMessageResponse {
        view_url: format!("/{}", created.id),
        expires_at: created.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ttl_seconds: created.ttl_secs,
        id: created.id,
    }))
}

/// Fetch a message; it is deleted by the same call
async fn take_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    if !is_well_formed(&id) {
        return Err(AppError::NotFound);
    }

    let message = state.store.take_once(&id).await?;
    Ok(Json(MessageResponse {
        ciphertext: message.ciphertext,
        nonce: message.nonce,
    }))
}

/// Create the web router
pub fn create_router(state: AppState, max_upload_size: usize) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .route("/{id}", get(show))
        .route("/api/message", post(create_message))
        .route("/api/message/{id}", get(take_message))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(middleware::from_fn_with_state(state.clone(), log_request))
        .with_state(state);

    with_security_headers(router)
}
