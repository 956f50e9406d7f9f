use std::pin::pin;

use bytes::Bytes;
use chunk_store::{ChunkStore, UploadId};
use futures::{Stream, StreamExt};
use tracing::{debug, info};

use crate::{BoxError, IngestError, buffer::ChunkBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub start_chunk_index: u64,
    pub chunks_written: u64,
    pub bytes_written: u64,
    /// Index the next chunk of this upload would get.
    pub next_chunk_index: u64,
    /// Index of the chunk written as final, if the body had any bytes.
    pub final_chunk_index: Option<u64>,
}

/// Writer side of one ingestion call. Never shared between requests.
struct ChunkWriter<'a> {
    store: &'a dyn ChunkStore,
    upload: &'a UploadId,
    outcome: IngestOutcome,
}

impl ChunkWriter<'_> {
    async fn write(&mut self, data: Bytes, is_final: bool) -> Result<(), IngestError> {
        let chunk_index = self.outcome.next_chunk_index;
        let size = data.len() as u64;
        self.store
            .write(self.upload, chunk_index, is_final, data)
            .await
            .map_err(|source| IngestError::WriteFailure {
                chunk_index,
                source,
            })?;
        debug!(
            upload = %self.upload,
            chunk_index,
            is_final,
            size,
            "chunk stored"
        );
        self.outcome.chunks_written += 1;
        self.outcome.bytes_written += size;
        self.outcome.next_chunk_index += 1;
        if is_final {
            self.outcome.final_chunk_index = Some(chunk_index);
        }
        Ok(())
    }
}

/// Splits `body` into chunks and writes them to `store` starting at
/// `start_chunk_index`.
///
/// Writes are issued one at a time in index order; the body is not read again
/// until the previous write has completed. The first failure stops ingestion
/// and leaves already written chunks in place. Bytes still buffered when the
/// body fails to read are dropped, never stored as a final chunk.
pub async fn ingest<S, E>(
    store: &dyn ChunkStore,
    upload: &UploadId,
    chunk_size: u64,
    start_chunk_index: u64,
    body: S,
) -> Result<IngestOutcome, IngestError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    let mut buffer = ChunkBuffer::new(chunk_size);
    let mut writer = ChunkWriter {
        store,
        upload,
        outcome: IngestOutcome {
            start_chunk_index,
            chunks_written: 0,
            bytes_written: 0,
            next_chunk_index: start_chunk_index,
            final_chunk_index: None,
        },
    };

    let mut body = pin!(body);
    while let Some(read) = body.next().await {
        let read = read.map_err(|e| IngestError::ReadFailure { source: e.into() })?;
        for chunk in buffer.feed(&read) {
            writer.write(chunk, false).await?;
        }
    }
    if let Some(last) = buffer.finish() {
        writer.write(last, true).await?;
    }

    let outcome = writer.outcome;
    info!(
        upload = %upload,
        start_chunk_index,
        chunks_written = outcome.chunks_written,
        bytes_written = outcome.bytes_written,
        final_chunk_index = ?outcome.final_chunk_index,
        "upload ingested"
    );
    Ok(outcome)
}
