use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, Response, header::CONTENT_LENGTH},
};
use bytes::Bytes;
use chunk_store::{
    ChunkPresence,
    ChunkStorage,
    ChunkStore,
    ChunkStoreError,
    ChunkStoreResult,
    MemoryChunkStore,
    UploadId,
};
use tower::ServiceExt;
use tracing::subscriber;
use tracing_subscriber::{Layer, layer::SubscriberExt};
use url::Url;

use crate::{
    http_objects::UPLOAD_OFFSET,
    routes::{RouteState, create_routes},
};

pub const TEST_CONTAINER: &str = "container-1";
pub const TEST_FILE: &str = "file-1";

pub fn test_upload() -> UploadId {
    UploadId::new(TEST_CONTAINER, TEST_FILE)
}

pub fn test_query() -> String {
    format!("containerUUID={TEST_CONTAINER}&uploadFileUUID={TEST_FILE}")
}

/// Deterministic, non-repeating-per-chunk payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Router backed by an in-memory chunk store.
pub struct TestService {
    pub store: Arc<MemoryChunkStore>,
    pub router: Router,
}

/// Memory store whose existence checks or writes fail on demand.
struct FailingChunkStore {
    inner: Arc<MemoryChunkStore>,
    fail_exists: bool,
    /// Writes of this chunk index and above are rejected.
    fail_write_from: Option<u64>,
}

#[async_trait]
impl ChunkStore for FailingChunkStore {
    async fn exists(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence> {
        if self.fail_exists {
            return Err(ChunkStoreError::Rejected {
                url: format!("memory://{upload}/{index}"),
                status: 503,
            });
        }
        self.inner.exists(upload, index).await
    }

    async fn write(
        &self,
        upload: &UploadId,
        index: u64,
        is_final: bool,
        data: Bytes,
    ) -> ChunkStoreResult<()> {
        if self.fail_write_from.is_some_and(|from| index >= from) {
            return Err(ChunkStoreError::Rejected {
                url: format!("memory://{upload}/{index}"),
                status: 503,
            });
        }
        self.inner.write(upload, index, is_final, data).await
    }
}

impl TestService {
    pub fn new(chunk_size: u64) -> Self {
        let store = Arc::new(MemoryChunkStore::new());
        Self::with_storage(store.clone(), ChunkStorage::fixed(store), chunk_size)
    }

    pub fn failing(chunk_size: u64, fail_exists: bool, fail_write_from: Option<u64>) -> Self {
        let store = Arc::new(MemoryChunkStore::new());
        let failing = FailingChunkStore {
            inner: store.clone(),
            fail_exists,
            fail_write_from,
        };
        Self::with_storage(store, ChunkStorage::fixed(Arc::new(failing)), chunk_size)
    }

    fn with_storage(
        store: Arc<MemoryChunkStore>,
        chunk_storage: ChunkStorage,
        chunk_size: u64,
    ) -> Self {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let route_state = RouteState {
            chunk_storage,
            chunk_size,
            public_url: Url::parse("https://uploads.example.com").unwrap(),
        };
        Self {
            store,
            router: create_routes(route_state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn start(&self, data: &[u8]) -> Result<Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/upload?{}", test_query()))
            .header(CONTENT_LENGTH, data.len())
            .body(Body::from(data.to_vec()))?;
        self.send(request).await
    }

    pub async fn offset(&self) -> Result<Response<Body>> {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(format!("/upload/resume?{}", test_query()))
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn resume(&self, offset: &str, data: &[u8]) -> Result<Response<Body>> {
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(format!("/upload/resume?{}", test_query()))
            .header(UPLOAD_OFFSET, offset)
            .body(Body::from(data.to_vec()))?;
        self.send(request).await
    }
}

pub async fn body_string(response: Response<Body>) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
