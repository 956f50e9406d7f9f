//! Relay chunk store: forwards each chunk to an upstream storage service.
//!
//! Upstream wire contract:
//!
//! - `POST {base}/api/uploadChunk/{container}/{file}/{index}/{0|1}` with the
//!   chunk as an octet-stream body, answered with `201 Created`.
//! - `GET {base}/api/mobile/containers/{container}/files/{file}/chunks/{index}/exists?chunk_size={n}`
//!   answered with the literal body `true` when the chunk is stored.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::{
    ChunkPresence,
    ChunkStore,
    ChunkStoreError,
    ChunkStoreResult,
    UploadId,
    metrics::ChunkStoreMetrics,
};

pub struct HttpRelayStore {
    client: reqwest::Client,
    base_url: Url,
    chunk_size: u64,
    metrics: ChunkStoreMetrics,
}

impl HttpRelayStore {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        chunk_size: u64,
        metrics: ChunkStoreMetrics,
    ) -> Self {
        Self {
            client,
            base_url,
            chunk_size,
            metrics,
        }
    }

    /// Relay to `{scheme}://{host}`.
    pub fn for_host(
        client: reqwest::Client,
        scheme: &str,
        host: &str,
        chunk_size: u64,
        metrics: ChunkStoreMetrics,
    ) -> ChunkStoreResult<Self> {
        let base_url = Url::parse(&format!("{scheme}://{host}"))
            .ok()
            .filter(|url| url.path() == "/" && url.query().is_none())
            .ok_or_else(|| ChunkStoreError::invalid_upload(format!("invalid upload host {host:?}")))?;
        Ok(Self::new(client, base_url, chunk_size, metrics))
    }

    fn endpoint(&self, segments: &[&str]) -> ChunkStoreResult<Url> {
        // Dot segments would be dropped by the url encoder and shift the path.
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ChunkStoreError::invalid_upload(format!(
                "{bad:?} is not a valid path segment"
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChunkStoreError::invalid_upload("upload host cannot be a base url"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn upload_url(&self, upload: &UploadId, index: u64, is_final: bool) -> ChunkStoreResult<Url> {
        let index = index.to_string();
        self.endpoint(&[
            "api",
            "uploadChunk",
            &upload.container_id,
            &upload.file_id,
            &index,
            if is_final { "1" } else { "0" },
        ])
    }

    pub fn exists_url(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<Url> {
        let index = index.to_string();
        let mut url = self.endpoint(&[
            "api",
            "mobile",
            "containers",
            &upload.container_id,
            "files",
            &upload.file_id,
            "chunks",
            &index,
            "exists",
        ])?;
        url.query_pairs_mut()
            .append_pair("chunk_size", &self.chunk_size.to_string());
        Ok(url)
    }

    async fn check_exists(&self, url: Url) -> ChunkStoreResult<ChunkPresence> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ChunkPresence::Absent);
        }
        if !status.is_success() {
            return Err(ChunkStoreError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;
        if body.trim() == "true" {
            Ok(ChunkPresence::Present)
        } else {
            Ok(ChunkPresence::Absent)
        }
    }

    async fn upload(&self, url: Url, data: Bytes) -> ChunkStoreResult<()> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if response.status() != StatusCode::CREATED {
            return Err(ChunkStoreError::Rejected {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn transport_error(url: &Url, source: reqwest::Error) -> ChunkStoreError {
    ChunkStoreError::Transport {
        url: url.to_string(),
        source,
    }
}

#[async_trait]
impl ChunkStore for HttpRelayStore {
    async fn exists(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence> {
        let _timer = self.metrics.start("exists");
        let url = self.exists_url(upload, index)?;
        self.check_exists(url).await.inspect_err(|err| {
            self.metrics.record_error("exists", err);
        })
    }

    async fn write(
        &self,
        upload: &UploadId,
        index: u64,
        is_final: bool,
        data: Bytes,
    ) -> ChunkStoreResult<()> {
        let _timer = self.metrics.start("write");
        let url = self.upload_url(upload, index, is_final)?;
        let size = data.len();
        self.upload(url, data).await.inspect_err(|err| {
            self.metrics.record_error("write", err);
        })?;
        self.metrics.record_written(size);
        debug!(
            upload = %upload,
            chunk_index = index,
            is_final,
            size,
            "chunk relayed upstream"
        );
        Ok(())
    }
}
