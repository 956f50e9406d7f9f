use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap,
        StatusCode,
        header::{CONTENT_LENGTH, LOCATION},
    },
    response::IntoResponse,
};
use chunk_store::UploadId;
use tracing::info;
use url::Url;

use super::RouteState;
use crate::http_objects::{ApiError, COMPLETE, UPLOAD_COMPLETE, UploadParams, header_u64};

/// Starts an upload: the whole body is ingested from chunk 0.
#[tracing::instrument(skip_all)]
pub async fn start_upload(
    State(state): State<RouteState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let upload = params.upload_id()?;
    let content_length = header_u64(&headers, &CONTENT_LENGTH)?;
    if content_length == 0 {
        return Err(ApiError::bad_request("content-length must be positive"));
    }
    let store = state.store(&headers)?;
    let location = resume_location(&state.public_url, &upload)?;

    let outcome = ingestion::ingest(
        store.as_ref(),
        &upload,
        state.chunk_size,
        0,
        body.into_data_stream(),
    )
    .await?;
    info!(
        upload = %upload,
        content_length,
        chunks = outcome.chunks_written,
        "upload complete"
    );

    Ok((
        StatusCode::CREATED,
        [
            (LOCATION, location.to_string()),
            (UPLOAD_COMPLETE, COMPLETE.to_string()),
        ],
    ))
}

/// Resume handle for `upload`, relative to the public base URL.
fn resume_location(public_url: &Url, upload: &UploadId) -> Result<Url, ApiError> {
    let mut url = public_url.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::internal_error_str("public url cannot be a base"))?
        .pop_if_empty()
        .extend(["upload", "resume"]);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("containerUUID", &upload.container_id)
        .append_pair("uploadFileUUID", &upload.file_id);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_location() {
        let upload = UploadId::new("c 1", "f&2");

        let base = Url::parse("https://uploads.example.com").unwrap();
        assert_eq!(
            resume_location(&base, &upload).unwrap().as_str(),
            "https://uploads.example.com/upload/resume?containerUUID=c+1&uploadFileUUID=f%262"
        );

        let prefixed = Url::parse("https://example.com/proxy/").unwrap();
        assert_eq!(
            resume_location(&prefixed, &upload).unwrap().path(),
            "/proxy/upload/resume"
        );
    }
}
