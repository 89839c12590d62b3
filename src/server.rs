//! Axum REST API in front of the statement analyzer.
//!
//! - `POST /api/analyze`: multipart upload of one or more PDF statements
//! - `GET /api/health`: liveness check
//!
//! Every response uses the `{ success, result | error }` envelope.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::{InsightsError, Result};
use crate::llm::{StatementAnalyzer, StatementFile};
use crate::schema::SpendingReport;

/// Multipart framing on top of the file bytes themselves.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const STATEMENT_FIELDS: &[&str] = &["file", "files"];

pub struct AppState {
    pub analyzer: StatementAnalyzer,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            analyzer: config.build_analyzer(),
            max_upload_bytes: config.max_upload_bytes,
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
        }
    }
}

impl From<InsightsError> for AppError {
    fn from(err: InsightsError) -> Self {
        let status = match &err {
            InsightsError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            InsightsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            InsightsError::ExtractionFailed(_) | InsightsError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        } else {
            warn!("Request rejected ({}): {}", self.status, self.message);
        }
        (self.status, Json(ApiResponse::<()>::failure(self.message))).into_response()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/analyze", post(analyze_statements))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        "Listening on {} (model {}, max upload {} bytes)",
        config.bind_addr, config.model, config.max_upload_bytes
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// GET /api/health
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("ok"))
}

/// POST /api/analyze
///
/// Expects a multipart form with one or more PDF parts named `file` or
/// `files`. Other fields are ignored.
async fn analyze_statements(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<ApiResponse<SpendingReport>>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::bad_request(&e.body_text()))?;
    let files = read_statements(&mut multipart, state.max_upload_bytes).await?;

    info!(
        "Received {} statement(s): {}",
        files.len(),
        files
            .iter()
            .map(|f| f.file_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let report = state.analyzer.analyze(&files).await?;
    Ok(Json(ApiResponse::ok(report)))
}

async fn read_statements(
    multipart: &mut Multipart,
    max_upload_bytes: usize,
) -> std::result::Result<Vec<StatementFile>, AppError> {
    let mut files = Vec::new();
    let mut total_size: usize = 0;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError {
        status: e.status(),
        message: format!("Failed to read form field: {}", e.body_text()),
    })? {
        let name = field.name().unwrap_or("").to_string();
        if !STATEMENT_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string).ok_or_else(|| {
            AppError::bad_request(&format!("Field '{}' is not a file upload", name))
        })?;
        let content_type = field.content_type().map(str::to_string);

        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request(&format!("Failed to read '{}'", file_name)))?;

        total_size += bytes.len();
        if total_size > max_upload_bytes {
            return Err(AppError {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                message: format!(
                    "Upload too large. Maximum total size is {} MB",
                    max_upload_bytes / 1024 / 1024
                ),
            });
        }

        files.push(StatementFile::from_upload(
            file_name,
            content_type.as_deref(),
            bytes.to_vec(),
        )?);
    }

    if files.is_empty() {
        return Err(AppError::bad_request(
            "No statements uploaded. Attach PDFs under the 'files' field",
        ));
    }

    Ok(files)
}
