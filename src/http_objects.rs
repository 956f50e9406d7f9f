use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chunk_store::{ChunkStoreError, UploadId};
use ingestion::{IngestError, MisalignedOffset, ResumeError};
use serde::{Deserialize, Serialize};
use tracing::error;

pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_COMPLETE: HeaderName = HeaderName::from_static("upload-complete");
pub const UPLOAD_HOST: HeaderName = HeaderName::from_static("x-upload-host");

/// Structured-field booleans carried by `Upload-Complete`.
pub const COMPLETE: &str = "?1";
pub const INCOMPLETE: &str = "?0";

#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
    /// Server offset to report alongside the error, for offset conflicts.
    upload_offset: Option<u64>,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
            upload_offset: None,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn offset_mismatch(client_offset: u64, server_offset: u64) -> Self {
        Self {
            upload_offset: Some(server_offset),
            ..Self::conflict(&format!(
                "upload offset {client_offset} does not match server offset {server_offset}"
            ))
        }
    }

    pub fn internal_error_str(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    }

    fn from_store_error(err: Option<&ChunkStoreError>, message: String) -> Self {
        match err {
            Some(err) if err.is_client_error() => Self::bad_request(&message),
            _ => Self::internal_error_str(&message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        let mut headers = HeaderMap::new();
        if let Some(offset) = self.upload_offset {
            headers.insert(UPLOAD_OFFSET, HeaderValue::from(offset));
        }
        (self.status_code, headers, self.message).into_response()
    }
}

impl From<ChunkStoreError> for ApiError {
    fn from(err: ChunkStoreError) -> Self {
        Self::from_store_error(Some(&err), err.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::from_store_error(err.store_error(), err.to_string())
    }
}

impl From<ResumeError> for ApiError {
    fn from(err: ResumeError) -> Self {
        Self::from_store_error(Some(err.store_error()), err.to_string())
    }
}

impl From<MisalignedOffset> for ApiError {
    fn from(err: MisalignedOffset) -> Self {
        Self::conflict(&err.to_string())
    }
}

/// Identity query parameters shared by every upload request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UploadParams {
    #[serde(rename = "containerUUID")]
    pub container_uuid: Option<String>,
    #[serde(rename = "uploadFileUUID")]
    pub upload_file_uuid: Option<String>,
}

impl UploadParams {
    pub fn upload_id(&self) -> Result<UploadId, ApiError> {
        let container_id = required_param(&self.container_uuid, "containerUUID")?;
        let file_id = required_param(&self.upload_file_uuid, "uploadFileUUID")?;
        Ok(UploadId::new(container_id, file_id))
    }
}

fn required_param<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(&format!("missing query parameter {name}")))
}

/// Parses a header holding a non-negative decimal integer.
pub fn header_u64(headers: &HeaderMap, name: &HeaderName) -> Result<u64, ApiError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ApiError::bad_request(&format!("missing {name} header")))?;
    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ApiError::bad_request(&format!("invalid {name} header")))
}
