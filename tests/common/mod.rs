//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ingress_relay::config::IngressConfig;
use ingress_relay::correlation::CorrelationCache;
use ingress_relay::http::HttpServer;
use ingress_relay::lifecycle::{Component, Shutdown};
use ingress_relay::workflow::Workflow;

/// A relay listening on an ephemeral local port.
pub struct Relay {
    pub addr: SocketAddr,
    pub component: Component,
}

impl Relay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.component.stop().await;
    }
}

/// Start the built-in pipeline described by `config`.
pub async fn start_relay(config: IngressConfig) -> Relay {
    let component = Component::start(config).unwrap();
    serve(component).await
}

/// Start with a test-built workflow.
pub async fn start_relay_with<F>(config: IngressConfig, build: F) -> Relay
where
    F: FnOnce(&CorrelationCache, &Shutdown) -> Arc<dyn Workflow>,
{
    let component = Component::start_with(config, build).unwrap();
    serve(component).await
}

async fn serve(component: Component) -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(component.app_state());
    let (_, config_updates) = mpsc::unbounded_channel();
    let shutdown = component.shutdown().subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, shutdown).await;
    });

    Relay { addr, component }
}

/// Non-pooled client so each test sees fresh connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Config with a short wait so timeout paths finish quickly.
pub fn fast_config(max_wait: Duration) -> IngressConfig {
    let mut config = IngressConfig::default();
    config.wait.max_wait_millis = max_wait.as_millis() as u64;
    config.wait.poll_interval_millis = 10;
    config
}
