//! HTTP observers demo service.
//!
//! ```text
//!   GET /test  ──▶ HttpEventListener enabled ──┐
//!                                              ├──▶ InstrumentedClient ──▶ upstream todo
//!   GET /test2 ──▶ DiagnosticTap installed ────┘        │
//!                                                       ├─ "http.client" events ─▶ session
//!                                                       └─ HttpRequestOut.* ─────▶ bus
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use http_observers::config::{read_config, validate_config, ConfigError, ObserverConfig};
use http_observers::lifecycle::{wait_for_signal, Shutdown};
use http_observers::observability::{logging, metrics};
use http_observers::HttpServer;

#[derive(Parser)]
#[command(name = "http-observers")]
#[command(about = "Demo service for outbound HTTP request observers", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override upstream.todo_url
    #[arg(long)]
    todo_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ObserverConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(todo_url) = args.todo_url {
        config.upstream.todo_url = todo_url;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-observers starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        todo_url = %config.upstream.todo_url,
        output = ?config.observability.output,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Fails here if the tap cannot decode the client's payloads.
    let server = HttpServer::new(config.clone())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
