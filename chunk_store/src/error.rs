//! Error types for chunk store operations.

/// Result type for chunk store operations.
pub type ChunkStoreResult<T> = Result<T, ChunkStoreError>;

/// Errors that can occur while checking or writing chunks.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ChunkStoreError {
    /// The upload identity cannot be addressed by this backend.
    #[error("invalid upload identity: {reason}")]
    InvalidUpload { reason: String },

    /// Local filesystem failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The upstream storage service could not be reached or the exchange
    /// broke off.
    #[error("transport error calling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream storage service answered with an unexpected status.
    #[error("upstream {url} rejected the request with status {status}")]
    Rejected { url: String, status: u16 },

    /// A relay request did not name an upstream host.
    #[error("missing upload host")]
    MissingUploadHost,

    /// A relay request named a host outside the configured allow-list.
    #[error("upload host {host} is not allowed")]
    HostNotAllowed { host: String },
}

impl ChunkStoreError {
    pub fn invalid_upload(reason: impl Into<String>) -> Self {
        ChunkStoreError::InvalidUpload {
            reason: reason.into(),
        }
    }

    /// True when the failure was caused by what the client sent rather than
    /// by the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChunkStoreError::InvalidUpload { .. } |
                ChunkStoreError::MissingUploadHost |
                ChunkStoreError::HostNotAllowed { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ChunkStoreError::InvalidUpload { .. } => "invalid_upload",
            ChunkStoreError::Io { .. } => "io",
            ChunkStoreError::Transport { .. } => "transport",
            ChunkStoreError::Rejected { .. } => "rejected",
            ChunkStoreError::MissingUploadHost => "missing_upload_host",
            ChunkStoreError::HostNotAllowed { .. } => "host_not_allowed",
        }
    }
}
