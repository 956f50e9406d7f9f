use std::path::PathBuf;

use ::tracing::{error, info_span};
use clap::Parser;
use service::Service;

mod config;
mod http_objects;
mod metrics;
mod routes;
mod service;
mod tracing;
use tracing::setup_tracing;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => config::ServerConfig::from_path(path),
        None => config::ServerConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {:?}", err);
            std::process::exit(1);
        }
    };

    setup_tracing(&config);

    let root_span = info_span!(
        "resumable-upload-proxy",
        listen_addr = config.listen_addr.as_str(),
    );
    let _guard = root_span.enter();

    let service = match Service::new(config) {
        Ok(service) => service,
        Err(err) => {
            error!("Error creating service: {:?}", err);
            return;
        }
    };
    if let Err(err) = service.start().await {
        error!("Error starting service: {:?}", err);
    }
}
