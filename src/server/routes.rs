// ABOUTME: HTTP handlers for chunk upload and session progress

use super::AppState;
use crate::error::ImportError;
use crate::import::{ChunkRequest, ChunkResponse, ImportProgress};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;

/// `POST /import`: one chunk of an upload, parameters in the query string
pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<ChunkResponse>, ImportError> {
    let request = ChunkRequest::from_params(&params)?;
    tracing::debug!(
        "Chunk for session '{}' at offset {} ({} bytes, eof={})",
        request.session_id,
        request.offset,
        body.len(),
        request.eof
    );
    let response = state.processor.process(&request, &body).await?;
    Ok(Json(response))
}

/// `GET /import/:session_id`
pub async fn session_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ImportProgress>, ImportError> {
    Ok(Json(state.processor.progress(&session_id).await?))
}
