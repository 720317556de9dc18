//! Sync Routes
//!
//! Endpoints:
//! - POST /api/sync - Run one sync round, answering with a ZIP of files to pull
//!
//! The multipart form carries:
//! - `last_sync_timestamp`: float seconds of the previous successful sync
//! - `all_client_paths`: one text part per path the client holds
//! - `deleted_client_paths`: one text part per path deleted since last sync
//! - `modified_and_new_client_files`: one file part per upload, named by its
//!   vault-relative path

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use crate::auth::require_api_key;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{SyncManifest, SyncRequest, UploadedFile, ARCHIVE_FILE_NAME};

/// Percent-encoded JSON `SyncManifest`
pub const MANIFEST_HEADER: &str = "sync-manifest";

/// New sync timestamp as plain text
pub const TIMESTAMP_HEADER: &str = "sync-timestamp";

const FIELD_LAST_SYNC: &str = "last_sync_timestamp";
const FIELD_ALL_PATHS: &str = "all_client_paths";
const FIELD_DELETED_PATHS: &str = "deleted_client_paths";
const FIELD_UPLOADS: &str = "modified_and_new_client_files";

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router<AppState> {
    let body_limit = state.config().server.max_upload_bytes;

    Router::new()
        .route("/sync", post(sync))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(state, require_api_key))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/sync
async fn sync(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let request = read_sync_form(multipart).await?;

    tracing::debug!(
        last_sync = request.last_sync_timestamp,
        client_paths = request.all_client_paths.len(),
        deleted = request.deleted_client_paths.len(),
        uploads = request.uploaded_files.len(),
        "Received sync request"
    );

    // Runs detached; a client hanging up mid-round does not abort it
    let outcome = state.engine().clone().sync(request).await?;

    tracing::info!(
        pulled = outcome.plan.paths_to_add_to_client.len(),
        deleted_on_client = outcome.manifest.deleted_server_paths.len(),
        merged = outcome.conflicts.merged.len(),
        unresolved = outcome.manifest.unresolved_conflicts.len(),
        archive_bytes = outcome.archive.len(),
        "Sync completed"
    );

    let manifest_header = encode_manifest(&outcome.manifest)?;
    let timestamp_header = HeaderValue::from_str(&outcome.manifest.new_sync_timestamp.to_string())
        .map_err(|e| AppError::Internal(format!("invalid timestamp header: {}", e)))?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME))
        .map_err(|e| AppError::Internal(format!("invalid disposition header: {}", e)))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
        (header::CONTENT_DISPOSITION, disposition),
        (HeaderName::from_static(MANIFEST_HEADER), manifest_header),
        (HeaderName::from_static(TIMESTAMP_HEADER), timestamp_header),
        (
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("sync-manifest, sync-timestamp, content-disposition"),
        ),
    ];

    Ok((headers, outcome.archive).into_response())
}

// ============================================================================
// Form Parsing
// ============================================================================

async fn read_sync_form(mut multipart: Multipart) -> Result<SyncRequest> {
    let mut last_sync = None;
    let mut request = SyncRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            FIELD_LAST_SYNC => {
                let text = field_text(field).await?;
                let value = text.trim().parse::<f64>().map_err(|_| {
                    AppError::BadRequest(format!("{} is not a number: {:?}", FIELD_LAST_SYNC, text))
                })?;
                last_sync = Some(value);
            }
            FIELD_ALL_PATHS => request.all_client_paths.push(field_text(field).await?),
            FIELD_DELETED_PATHS => request.deleted_client_paths.push(field_text(field).await?),
            FIELD_UPLOADS => {
                let path = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("Upload part without a file name".into()))?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload {}: {}", path, e)))?;
                request.uploaded_files.push(UploadedFile::new(path, content.to_vec()));
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    request.last_sync_timestamp =
        last_sync.ok_or_else(|| AppError::BadRequest(format!("Missing {}", FIELD_LAST_SYNC)))?;
    Ok(request)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    let name = field.name().unwrap_or("").to_string();
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))
}

fn encode_manifest(manifest: &SyncManifest) -> Result<HeaderValue> {
    let json = serde_json::to_string(manifest)
        .map_err(|e| AppError::Internal(format!("failed to encode manifest: {}", e)))?;
    HeaderValue::from_str(&urlencoding::encode(&json))
        .map_err(|e| AppError::Internal(format!("invalid manifest header: {}", e)))
}
