//! Local filesystem chunk store: `{root}/{container}/{file}/{index}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use opentelemetry::global;

use crate::{
    ChunkPresence,
    ChunkStore,
    ChunkStoreError,
    ChunkStoreResult,
    UploadId,
    metrics::{self, ChunkStoreMetrics},
};

pub struct DiskChunkStore {
    root: PathBuf,
    metrics: ChunkStoreMetrics,
}

impl DiskChunkStore {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let metrics = ChunkStoreMetrics::new("disk", &global::meter(metrics::METER_NAME));
        Self::with_metrics(root, metrics)
    }

    pub fn with_metrics(root: impl AsRef<Path>, metrics: ChunkStoreMetrics) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, metrics })
    }

    pub fn chunk_path(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<PathBuf> {
        Ok(self
            .root
            .join(path_segment(&upload.container_id, "container")?)
            .join(path_segment(&upload.file_id, "file")?)
            .join(index.to_string()))
    }

    async fn write_chunk(&self, path: &Path, data: &[u8]) -> ChunkStoreResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| ChunkStoreError::invalid_upload("chunk path has no parent"))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;

        // The final name only ever appears with complete content.
        let partial = path.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| io_error(&partial, e))?;
        file.write_all(data)
            .await
            .map_err(|e| io_error(&partial, e))?;
        file.sync_all().await.map_err(|e| io_error(&partial, e))?;
        drop(file);

        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| io_error(path, e))
    }
}

fn path_segment<'a>(value: &'a str, what: &str) -> ChunkStoreResult<&'a str> {
    if value.is_empty() ||
        value == "." ||
        value == ".." ||
        value.contains(['/', '\\', '\0'])
    {
        return Err(ChunkStoreError::invalid_upload(format!(
            "{what} id {value:?} is not a valid path segment"
        )));
    }
    Ok(value)
}

fn io_error(path: &Path, source: std::io::Error) -> ChunkStoreError {
    ChunkStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ChunkStore for DiskChunkStore {
    async fn exists(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence> {
        let _timer = self.metrics.start("exists");
        let path = self.chunk_path(upload, index)?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(ChunkPresence::Present),
            Ok(false) => Ok(ChunkPresence::Absent),
            Err(e) => {
                let err = io_error(&path, e);
                self.metrics.record_error("exists", &err);
                Err(err)
            }
        }
    }

    async fn write(
        &self,
        upload: &UploadId,
        index: u64,
        is_final: bool,
        data: Bytes,
    ) -> ChunkStoreResult<()> {
        let _timer = self.metrics.start("write");
        let path = self.chunk_path(upload, index)?;
        if let Err(err) = self.write_chunk(&path, &data).await {
            self.metrics.record_error("write", &err);
            return Err(err);
        }
        self.metrics.record_written(data.len());
        debug!(
            upload = %upload,
            chunk_index = index,
            is_final,
            size = data.len(),
            path = %path.display(),
            "chunk written to disk"
        );
        Ok(())
    }
}
