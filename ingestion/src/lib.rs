//! Chunked ingestion and resume negotiation for resumable uploads.
//!
//! An upload body of any length is cut into `chunk_size` pieces which are
//! written in order to a [`chunk_store::ChunkStore`] under consecutive chunk
//! indexes. Progress of an interrupted upload is recovered by probing the
//! store for the longest contiguous run of chunks, which yields a
//! chunk-aligned byte offset the client resumes from.

mod buffer;
mod engine;
mod error;
mod resume;

pub use buffer::ChunkBuffer;
pub use engine::{ingest, IngestOutcome};
pub use error::{BoxError, IngestError, MisalignedOffset, ResumeError};
pub use resume::{chunk_index_for_offset, compute_offset, UploadOffset};
