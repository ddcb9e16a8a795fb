//! Request pipeline host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace span → timeout
//!                          │
//!                          ▼
//!                  ┌───────────────┐
//!                  │    session    │  resolve or create, cookie + extra headers
//!                  └───────┬───────┘
//!                          ▼
//!                  ┌───────────────┐
//!                  │   resource    │  GET/HEAD: 304 or cached body, else pass on
//!                  └───────┬───────┘
//!                          ▼
//!                  ┌───────────────┐
//!                  │      api      │  /api/<node>: JSON / JSONP envelope, else pass on
//!                  └───────┬───────┘
//!                          ▼
//!                  ┌───────────────┐
//!                  │  controllers  │  route templates, 404 on miss
//!                  └───────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_pipeline::config::loader::apply_overrides;
use request_pipeline::config::{load_config, PipelineConfig};
use request_pipeline::lifecycle::{wait_for_signal, Shutdown};
use request_pipeline::observability::{logging, metrics};
use request_pipeline::resource::{CompositeProvider, ResourceProvider, StaticFileProvider};
use request_pipeline::{HttpServer, PipelineParts};

#[derive(Parser)]
#[command(name = "request-pipeline")]
#[command(about = "Session, resource cache and API dispatch pipeline", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Property override, e.g. `--set sessionTtlSeconds=300`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    let config = apply_overrides(config, args.overrides.iter().map(String::as_str))?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-pipeline starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        session_ttl_secs = config.session.ttl_secs,
        api_prefix = %config.api.path_prefix,
        static_folder = ?config.resources.static_folder,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start Prometheus exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut provider = CompositeProvider::new();
    if let Some(folder) = &config.resources.static_folder {
        provider = provider.with(StaticFileProvider::new(folder, &config.resources.default_zone));
    }
    let provider: Arc<dyn ResourceProvider> = Arc::new(provider);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(
        config,
        PipelineParts {
            provider,
            ..Default::default()
        },
    )?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
