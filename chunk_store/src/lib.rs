//! Durable chunk storage for resumable uploads.
//!
//! A [`ChunkStore`] persists the fixed-size chunks of an upload under the key
//! `(container, file, chunk index)` and answers whether a given chunk is
//! already stored. Backends:
//!
//! - [`HttpRelayStore`]: forwards every chunk to an upstream storage service.
//! - [`DiskChunkStore`]: one file per chunk below a local directory.
//! - [`MemoryChunkStore`]: process-local, for tests and experiments.
//!
//! [`ChunkStorage`] is built once from [`ChunkStorageConfig`] and resolves the
//! store that serves a request.

use std::{collections::HashSet, fmt, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use opentelemetry::{global, metrics::Meter};
use serde::{Deserialize, Serialize};

pub mod disk;
mod error;
pub mod http;
pub mod memory;
pub mod metrics;

pub use disk::DiskChunkStore;
pub use error::{ChunkStoreError, ChunkStoreResult};
pub use http::HttpRelayStore;
pub use memory::{MemoryChunkStore, StoredChunk};
pub use metrics::ChunkStoreMetrics;

pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str = "ST-Resumable-Proxy/1.0";

/// Identity of one upload: a caller-chosen container and a file inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadId {
    pub container_id: String,
    pub file_id: String,
}

impl UploadId {
    pub fn new(container_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            file_id: file_id.into(),
        }
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_id, self.file_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPresence {
    Present,
    Absent,
}

impl ChunkPresence {
    pub fn is_present(self) -> bool {
        self == ChunkPresence::Present
    }
}

/// Keyed chunk storage consumed by the ingestion engine and the resume
/// negotiator.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Reports whether chunk `index` of `upload` is stored.
    ///
    /// A lookup that cannot be answered is an error, never `Absent`.
    async fn exists(&self, upload: &UploadId, index: u64) -> ChunkStoreResult<ChunkPresence>;

    /// Persists chunk `index` of `upload`. `is_final` marks the last chunk of
    /// the upload.
    async fn write(
        &self,
        upload: &UploadId,
        index: u64,
        is_final: bool,
        data: Bytes,
    ) -> ChunkStoreResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_relay_scheme")]
    pub scheme: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// When non-empty, only these upstream hosts may be named by clients.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

fn default_relay_scheme() -> String {
    "https".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scheme: default_relay_scheme(),
            user_agent: default_user_agent(),
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskStorageConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkStorageConfig {
    #[serde(default)]
    pub relay: Option<RelayConfig>,
    #[serde(default)]
    pub disk: Option<DiskStorageConfig>,
}

impl Default for ChunkStorageConfig {
    fn default() -> Self {
        Self {
            relay: Some(RelayConfig::default()),
            disk: None,
        }
    }
}

impl ChunkStorageConfig {
    pub fn validate(&self) -> Result<()> {
        match (&self.relay, &self.disk) {
            (Some(_), Some(_)) => Err(anyhow!(
                "cannot specify both relay and disk chunk storage"
            )),
            (None, None) => Err(anyhow!("must specify one of relay or disk chunk storage")),
            (Some(relay), None) => {
                if relay.scheme != "http" && relay.scheme != "https" {
                    return Err(anyhow!("invalid relay scheme: {}", relay.scheme));
                }
                Ok(())
            }
            (None, Some(_)) => Ok(()),
        }
    }
}

/// The configured backend, resolved per request into a [`ChunkStore`].
#[derive(Clone)]
pub struct ChunkStorage {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Relay(RelayStorage),
    Fixed(Arc<dyn ChunkStore>),
}

#[derive(Clone)]
struct RelayStorage {
    client: reqwest::Client,
    scheme: String,
    allowed_hosts: Arc<HashSet<String>>,
    chunk_size: u64,
    metrics: ChunkStoreMetrics,
}

impl ChunkStorage {
    /// Instruments the stores with the globally installed meter provider.
    pub fn new(config: &ChunkStorageConfig, chunk_size: u64) -> Result<Self> {
        Self::with_meter(config, chunk_size, &global::meter(metrics::METER_NAME))
    }

    pub fn with_meter(
        config: &ChunkStorageConfig,
        chunk_size: u64,
        meter: &Meter,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(relay) = &config.relay {
            let client = reqwest::Client::builder()
                .user_agent(relay.user_agent.clone())
                .build()?;
            return Ok(Self {
                backend: Backend::Relay(RelayStorage {
                    client,
                    scheme: relay.scheme.clone(),
                    allowed_hosts: Arc::new(relay.allowed_hosts.iter().cloned().collect()),
                    chunk_size,
                    metrics: ChunkStoreMetrics::new("relay", meter),
                }),
            });
        }
        let disk = config
            .disk
            .as_ref()
            .ok_or_else(|| anyhow!("must specify one of relay or disk chunk storage"))?;
        let store =
            DiskChunkStore::with_metrics(&disk.path, ChunkStoreMetrics::new("disk", meter))?;
        Ok(Self::fixed(Arc::new(store)))
    }

    /// Serves every request from `store`, ignoring upload hosts.
    pub fn fixed(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            backend: Backend::Fixed(store),
        }
    }

    pub fn requires_upload_host(&self) -> bool {
        matches!(self.backend, Backend::Relay(_))
    }

    pub fn store_for(&self, upload_host: Option<&str>) -> ChunkStoreResult<Arc<dyn ChunkStore>> {
        match &self.backend {
            Backend::Fixed(store) => Ok(store.clone()),
            Backend::Relay(relay) => {
                let host = upload_host
                    .map(str::trim)
                    .filter(|host| !host.is_empty())
                    .ok_or(ChunkStoreError::MissingUploadHost)?;
                if !relay.allowed_hosts.is_empty() && !relay.allowed_hosts.contains(host) {
                    return Err(ChunkStoreError::HostNotAllowed {
                        host: host.to_string(),
                    });
                }
                let store = HttpRelayStore::for_host(
                    relay.client.clone(),
                    &relay.scheme,
                    host,
                    relay.chunk_size,
                    relay.metrics.clone(),
                )?;
                Ok(Arc::new(store))
            }
        }
    }
}
