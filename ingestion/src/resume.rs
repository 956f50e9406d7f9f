use chunk_store::{ChunkStore, UploadId};
use tracing::info;

use crate::{MisalignedOffset, ResumeError};

/// Server-confirmed progress of an upload: the longest contiguous run of
/// stored chunks starting at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOffset {
    pub chunks: u64,
    pub bytes: u64,
}

/// Checks chunks `0, 1, 2, ...` until the first one that is not stored.
///
/// The result is always a multiple of `chunk_size`. A gap ends the scan even
/// if later chunks exist.
pub async fn compute_offset(
    store: &dyn ChunkStore,
    upload: &UploadId,
    chunk_size: u64,
) -> Result<UploadOffset, ResumeError> {
    let mut chunks = 0;
    loop {
        let presence = store
            .exists(upload, chunks)
            .await
            .map_err(|source| ResumeError::LookupFailed {
                chunk_index: chunks,
                source,
            })?;
        if !presence.is_present() {
            break;
        }
        chunks += 1;
    }

    let offset = UploadOffset {
        chunks,
        bytes: chunks.saturating_mul(chunk_size),
    };
    info!(
        upload = %upload,
        chunks = offset.chunks,
        offset = offset.bytes,
        "computed upload offset"
    );
    Ok(offset)
}

/// Chunk index at which a client offset resumes.
pub fn chunk_index_for_offset(offset: u64, chunk_size: u64) -> Result<u64, MisalignedOffset> {
    if chunk_size == 0 || offset % chunk_size != 0 {
        return Err(MisalignedOffset { offset, chunk_size });
    }
    Ok(offset / chunk_size)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chunk_store::{
        ChunkPresence,
        ChunkStoreError,
        ChunkStoreResult,
        MemoryChunkStore,
    };

    use super::*;

    fn upload() -> UploadId {
        UploadId::new("container", "file")
    }

    async fn store_with(indexes: &[u64]) -> MemoryChunkStore {
        let store = MemoryChunkStore::new();
        for index in indexes {
            store
                .write(&upload(), *index, false, Bytes::from_static(b"chunk"))
                .await
                .unwrap();
        }
        store
    }

    struct UnreachableStore;

    #[async_trait]
    impl ChunkStore for UnreachableStore {
        async fn exists(&self, _: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence> {
            if index < 2 {
                return Ok(ChunkPresence::Present);
            }
            Err(ChunkStoreError::Rejected {
                url: "test".to_string(),
                status: 503,
            })
        }

        async fn write(&self, _: &UploadId, _: u64, _: bool, _: Bytes) -> ChunkStoreResult<()> {
            unreachable!("resume never writes")
        }
    }

    #[tokio::test]
    async fn test_no_chunks_is_offset_zero() -> Result<()> {
        let store = MemoryChunkStore::new();
        let offset = compute_offset(&store, &upload(), 50).await?;
        assert_eq!(offset, UploadOffset { chunks: 0, bytes: 0 });
        assert_eq!(store.exists_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_contiguous_chunks() -> Result<()> {
        let store = store_with(&[0, 1, 2]).await;
        let offset = compute_offset(&store, &upload(), 50).await?;
        assert_eq!(offset, UploadOffset { chunks: 3, bytes: 150 });
        Ok(())
    }

    #[tokio::test]
    async fn test_gap_ends_scan() -> Result<()> {
        let store = store_with(&[0, 1, 3, 4]).await;
        let offset = compute_offset(&store, &upload(), 50).await?;
        assert_eq!(offset.bytes, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_offset_query_is_idempotent() -> Result<()> {
        let store = store_with(&[0]).await;
        let first = compute_offset(&store, &upload(), 50).await?;
        let second = compute_offset(&store, &upload(), 50).await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_truncated_progress() {
        let err = compute_offset(&UnreachableStore, &upload(), 50)
            .await
            .unwrap_err();
        let ResumeError::LookupFailed { chunk_index, .. } = err;
        assert_eq!(chunk_index, 2);
    }

    #[test]
    fn test_chunk_index_for_offset() {
        assert_eq!(chunk_index_for_offset(0, 50), Ok(0));
        assert_eq!(chunk_index_for_offset(150, 50), Ok(3));
        assert_eq!(
            chunk_index_for_offset(120, 50),
            Err(MisalignedOffset {
                offset: 120,
                chunk_size: 50
            })
        );
    }
}
