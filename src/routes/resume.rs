use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, header::CACHE_CONTROL},
    response::IntoResponse,
};
use ingestion::{chunk_index_for_offset, compute_offset};
use tracing::info;

use super::RouteState;
use crate::http_objects::{
    ApiError,
    COMPLETE,
    INCOMPLETE,
    UPLOAD_COMPLETE,
    UPLOAD_OFFSET,
    UploadParams,
    header_u64,
};

/// Reports how many bytes of the upload the server holds.
#[tracing::instrument(skip_all)]
pub async fn upload_offset(
    State(state): State<RouteState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let upload = params.upload_id()?;
    let store = state.store(&headers)?;
    let offset = compute_offset(store.as_ref(), &upload, state.chunk_size).await?;

    Ok([
        (UPLOAD_OFFSET, offset.bytes.to_string()),
        (UPLOAD_COMPLETE, INCOMPLETE.to_string()),
        (CACHE_CONTROL, "no-store".to_string()),
    ])
}

/// Continues an upload from the client's `Upload-Offset`, which must equal the
/// server offset.
#[tracing::instrument(skip_all)]
pub async fn resume_upload(
    State(state): State<RouteState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let upload = params.upload_id()?;
    let offset = header_u64(&headers, &UPLOAD_OFFSET)?;
    let start_chunk_index = chunk_index_for_offset(offset, state.chunk_size)?;
    let store = state.store(&headers)?;

    let server_offset = compute_offset(store.as_ref(), &upload, state.chunk_size).await?;
    if server_offset.bytes != offset {
        return Err(ApiError::offset_mismatch(offset, server_offset.bytes));
    }

    let outcome = ingestion::ingest(
        store.as_ref(),
        &upload,
        state.chunk_size,
        start_chunk_index,
        body.into_data_stream(),
    )
    .await?;
    info!(
        upload = %upload,
        offset,
        chunks = outcome.chunks_written,
        "upload resumed to completion"
    );

    Ok([(UPLOAD_COMPLETE, COMPLETE.to_string())])
}
