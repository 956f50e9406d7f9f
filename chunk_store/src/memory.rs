//! In-memory chunk store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex,
        MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ChunkPresence, ChunkStore, ChunkStoreResult, UploadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub index: u64,
    pub is_final: bool,
    pub data: Bytes,
}

#[derive(Default)]
pub struct MemoryChunkStore {
    uploads: Mutex<HashMap<UploadId, BTreeMap<u64, StoredChunk>>>,
    writes: AtomicU64,
    exists_calls: AtomicU64,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn uploads(&self) -> MutexGuard<'_, HashMap<UploadId, BTreeMap<u64, StoredChunk>>> {
        // A panic while holding the lock cannot leave a half-inserted chunk.
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Chunks of `upload` in index order.
    pub fn chunks(&self, upload: &UploadId) -> Vec<StoredChunk> {
        self.uploads()
            .get(upload)
            .map(|chunks| chunks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Concatenation of the stored chunks of `upload` in index order.
    pub fn contents(&self, upload: &UploadId) -> Vec<u8> {
        self.chunks(upload)
            .iter()
            .flat_map(|chunk| chunk.data.iter().copied())
            .collect()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn exists_count(&self) -> u64 {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn exists(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let present = self
            .uploads()
            .get(upload)
            .is_some_and(|chunks| chunks.contains_key(&index));
        Ok(if present {
            ChunkPresence::Present
        } else {
            ChunkPresence::Absent
        })
    }

    async fn write(
        &self,
        upload: &UploadId,
        index: u64,
        is_final: bool,
        data: Bytes,
    ) -> ChunkStoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.uploads().entry(upload.clone()).or_default().insert(
            index,
            StoredChunk {
                index,
                is_final,
                data,
            },
        );
        Ok(())
    }
}
