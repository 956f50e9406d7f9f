use chunk_store::ChunkStoreError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read upload body: {source}")]
    ReadFailure { source: BoxError },

    #[error("failed to write chunk {chunk_index}: {source}")]
    WriteFailure {
        chunk_index: u64,
        #[source]
        source: ChunkStoreError,
    },
}

impl IngestError {
    /// The backing store failure, if the store caused the error.
    pub fn store_error(&self) -> Option<&ChunkStoreError> {
        match self {
            IngestError::ReadFailure { .. } => None,
            IngestError::WriteFailure { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("failed to check chunk {chunk_index}: {source}")]
    LookupFailed {
        chunk_index: u64,
        #[source]
        source: ChunkStoreError,
    },
}

impl ResumeError {
    pub fn store_error(&self) -> &ChunkStoreError {
        match self {
            ResumeError::LookupFailed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("offset {offset} is not a multiple of the chunk size {chunk_size}")]
pub struct MisalignedOffset {
    pub offset: u64,
    pub chunk_size: u64,
}
