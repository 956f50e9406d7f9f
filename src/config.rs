use std::{net::SocketAddr, path::Path};

use anyhow::{Result, anyhow};
use chunk_store::{ChunkStorageConfig, DEFAULT_CHUNK_SIZE};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

const ENV_PREFIX: &str = "UPLOAD_PROXY_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL clients reach this proxy at; resume handles are built on it.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Size of every chunk but the last, in bytes. Must be the same for every
    /// instance serving the same uploads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub structured_logging: bool,
    #[serde(default)]
    pub chunk_storage: ChunkStorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enable_metrics: bool,
    /// OTLP grpc collector endpoint. Falls back to `OTEL_EXPORTER_OTLP_ENDPOINT`
    /// or localhost:4317 when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            endpoint: None,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            public_url: default_public_url(),
            chunk_size: default_chunk_size(),
            structured_logging: false,
            chunk_storage: Default::default(),
            telemetry: Default::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<ServerConfig> {
        Self::from_figment(Figment::new().merge(Yaml::file_exact(path.as_ref())))
    }

    /// Defaults overridden by `UPLOAD_PROXY_*` environment variables only.
    pub fn from_env() -> Result<ServerConfig> {
        Self::from_figment(Figment::new())
    }

    fn from_figment(figment: Figment) -> Result<ServerConfig> {
        let config: ServerConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be positive"));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(anyhow!("chunk_size {} is too large", self.chunk_size));
        }
        let public_url = Url::parse(&self.public_url)
            .map_err(|e| anyhow!("invalid public url {}: {}", self.public_url, e))?;
        if public_url.cannot_be_a_base() {
            return Err(anyhow!("invalid public url: {}", self.public_url));
        }
        if self.telemetry.metrics_interval_secs == 0 {
            return Err(anyhow!("telemetry.metrics_interval_secs must be positive"));
        }
        self.chunk_storage.validate()
    }
}
