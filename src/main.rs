//! Ingress relay
//!
//! Answers HTTP requests with the output of a workflow that may finish on
//! another thread or in another workflow entirely.
//!
//! ```text
//!     Client ──▶ http server ──▶ workflow "ingress" ──(queued)──▶ workflow "reply"
//!        ▲            │                   │                              │
//!        │       wait for monitor    park exchange  ◀── correlation ──  take exchange
//!        │            │              (REQUEST)           cache          (RESPONSE)
//!        └──── commit response ◀──────────────── signal completion ◀─────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ingress_relay::config::watcher::ConfigWatcher;
use ingress_relay::config::{load_config, IngressConfig};
use ingress_relay::lifecycle::signals::spawn_signal_listener;
use ingress_relay::lifecycle::Component;
use ingress_relay::observability::{logging, metrics};
use ingress_relay::HttpServer;

#[derive(Parser)]
#[command(name = "ingress-relay")]
#[command(about = "HTTP ingress that waits on workflow completion", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long, env = "INGRESS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => IngressConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ingress-relay starting");

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

    let bind_address = config.listener.bind_address.clone();
    let component = Component::start(config)?;

    // The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (rx, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (rx, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    spawn_signal_listener(component.shutdown().clone());

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(component.app_state());
    server
        .run(listener, config_updates, component.shutdown().subscribe())
        .await?;

    component.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
