use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum_server::Handle;
use chunk_store::ChunkStorage;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tokio::signal;
use tracing::{error, info};
use url::Url;

use crate::{
    config::ServerConfig,
    metrics::init_provider,
    routes::{RouteState, create_routes},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub chunk_storage: ChunkStorage,
    meter_provider: Option<SdkMeterProvider>,
}

impl Service {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        // The chunk store instruments bind to the provider installed here.
        let meter_provider =
            init_provider(&config.telemetry).context("error initializing metrics provider")?;
        let chunk_storage = ChunkStorage::new(&config.chunk_storage, config.chunk_size)
            .context("error initializing chunk storage")?;
        Ok(Self {
            config,
            chunk_storage,
            meter_provider,
        })
    }

    pub fn route_state(&self) -> Result<RouteState> {
        Ok(RouteState {
            chunk_storage: self.chunk_storage.clone(),
            chunk_size: self.config.chunk_size,
            public_url: Url::parse(&self.config.public_url)?,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let route_state = self.route_state()?;

        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!(
            chunk_size = self.config.chunk_size,
            relay = self.chunk_storage.requires_upload_host(),
            "server api listening on {}",
            self.config.listen_addr
        );
        let routes = create_routes(route_state);
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        if let Some(provider) = &self.meter_provider {
            if let Err(err) = provider.shutdown() {
                error!("error flushing metrics on shutdown: {:?}", err);
            }
        }
        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    info!("signal received, shutting down server gracefully");
}
