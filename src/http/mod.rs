//! HTTP surface — import upload, mail-check trigger, OAuth callback.
//!
//! Batch endpoints report partial failures in-band: the import and
//! mail-check responses always carry a result aggregate with explicit
//! counts, never a non-2xx status for per-item errors.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::MailboxConfig;
use crate::error::PipelineError;
use crate::import::{ImportOptions, ImportService, MappingConfig};
use crate::mailbox::oauth;
use crate::pipeline::MailPipeline;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MailPipeline>,
    pub import: Arc<ImportService>,
    /// OAuth client config for the operator callback; `None` when the
    /// mailbox is not configured.
    pub mailbox_config: Option<MailboxConfig>,
}

/// Build the Axum router.
pub fn api_routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/mail/check", post(mail_check))
        .route("/api/import", post(import_file))
        .route("/oauth/callback", get(oauth_callback))
        .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "outreach-core"
    }))
}

// ── Mail check ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct MailCheckRequest {
    since_date: Option<DateTime<Utc>>,
}

async fn mail_check(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    // The body is optional; an empty or absent JSON object means
    // "use the default lookback".
    let since = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<MailCheckRequest>(&body) {
            Ok(req) => req.since_date,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "processed": 0,
                        "updated": 0,
                        "errors": [format!("invalid request body: {e}")]
                    })),
                );
            }
        }
    };
    info!(since = ?since, "Mail check triggered");

    match state.pipeline.run(since).await {
        Ok(report) => (StatusCode::OK, Json(serde_json::json!(report))),
        Err(PipelineError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "processed": 0,
                "updated": 0,
                "errors": ["a polling run is already in progress"]
            })),
        ),
        Err(e) => {
            // The run aborted before any mutation; report it in-band.
            error!("Mail check failed: {e}");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "processed": 0,
                    "updated": 0,
                    "errors": [e.to_string()]
                })),
            )
        }
    }
}

// ── Import ──────────────────────────────────────────────────────────

async fn import_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut mapping: Option<MappingConfig> = None;
    let mut options = ImportOptions::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Malformed multipart body: {e}")),
        };

        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => file_bytes = Some(bytes.to_vec()),
                    Err(e) => return bad_request(format!("Failed to read file: {e}")),
                }
            }
            "mapping" => match field.text().await {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(parsed) => mapping = Some(parsed),
                    Err(e) => return bad_request(format!("Invalid mapping: {e}")),
                },
                Err(e) => return bad_request(format!("Failed to read mapping: {e}")),
            },
            "options" => match field.text().await {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(parsed) => options = parsed,
                    Err(e) => return bad_request(format!("Invalid options: {e}")),
                },
                Err(e) => return bad_request(format!("Failed to read options: {e}")),
            },
            other => {
                info!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let Some(file_bytes) = file_bytes else {
        return bad_request("No file provided".into());
    };
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());
    let Some(mapping) = mapping else {
        return bad_request("mapping is required".into());
    };

    match state
        .import
        .process_import(&file_name, &file_bytes, &mapping, &options)
        .await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "data": report
            })),
        ),
        Err(e) => bad_request(e.to_string()),
    }
}

fn bad_request(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "message": message
        })),
    )
}

// ── OAuth callback ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OauthCallbackQuery {
    code: String,
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Operator tooling: exchange an authorization code for a refresh
/// token to paste into the environment.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OauthCallbackQuery>,
) -> impl IntoResponse {
    let Some(ref config) = state.mailbox_config else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "success": false,
                "message": "mailbox is not configured"
            })),
        );
    };

    let redirect_uri = query
        .redirect_uri
        .unwrap_or_else(|| "urn:ietf:wg:oauth:2.0:oob".to_string());

    match oauth::exchange_authorization_code(config, &query.code, &redirect_uri).await {
        Ok(tokens) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "refresh_token": tokens.refresh_token,
                "expires_in": tokens.expires_in
            })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "message": e.to_string()
            })),
        ),
    }
}
