//! HTTP server setup and the ingress handler.
//!
//! # Responsibilities
//! - Create the Axum router (ingress catch-all plus optional admin routes)
//! - Wire up middleware (request ID, tracing)
//! - Hand each request to the workflow and wait for it to complete
//! - Apply reloaded wait policies while running
//!
//! # Design Decisions
//! - The handler waits with the async flavour of the wait loop, so a
//!   pending exchange never blocks a runtime worker
//! - No tower timeout layer: the wait policy is the request timeout
//! - The ingress side is the only place a response is committed

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::schema::IngressConfig;
use crate::correlation::CorrelationCache;
use crate::exchange::{await_or_timeout_async, CompletionMonitor, TimeoutPolicy};
use crate::http::request;
use crate::http::response::ResponseHandle;
use crate::observability::metrics;
use crate::workflow::Workflow;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<dyn Workflow>,
    pub policy: Arc<ArcSwap<TimeoutPolicy>>,
    pub cache: CorrelationCache,
    /// `false` answers before the workflow finishes (fire-and-forget).
    pub synchronous: bool,
    pub max_body_size: usize,
    /// Admin routes are mounted only when a key is set.
    pub admin_api_key: Option<Arc<str>>,
}

/// HTTP front of the ingress relay.
pub struct HttpServer {
    router: Router,
    policy: Arc<ArcSwap<TimeoutPolicy>>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let policy = Arc::clone(&state.policy);
        let router = Self::build_router(state);
        Self { router, policy }
    }

    fn build_router(state: AppState) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(ingress_handler))
            .route("/", any(ingress_handler))
            .with_state(state.clone());

        if state.admin_api_key.is_some() {
            router = router.merge(admin::setup_admin_router(state));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// The router, for driving the handler without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, applying wait policies from `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<IngressConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let policy = Arc::clone(&self.policy);
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match TimeoutPolicy::try_from(&config.wait) {
                    Ok(next) => {
                        tracing::info!(
                            max_wait_ms = next.max_wait.as_millis() as u64,
                            on_timeout_status = %next.on_timeout_status,
                            "Wait policy updated"
                        );
                        policy.store(Arc::new(next));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded wait policy");
                    }
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Receive a request, run it through the workflow and answer it.
async fn ingress_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let policy = state.policy.load_full();

    let mut message = match request::into_message(request, state.max_body_size).await {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting unreadable request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let message_id = message.unique_id().to_string();

    let response = ResponseHandle::new();
    let _guard = response.disconnect_guard();
    let monitor = state.synchronous.then(|| Arc::new(CompletionMonitor::new()));

    message.attach(monitor.clone(), Some(response.clone()));
    state.workflow.submit(message);

    let committed = match monitor {
        Some(monitor) => {
            let outcome = await_or_timeout_async(&monitor, &policy).await;
            metrics::record_exchange(outcome.as_str(), outcome.elapsed());
            if outcome.is_completed() {
                tracing::debug!(
                    message_id = %message_id,
                    elapsed_ms = outcome.elapsed().as_millis() as u64,
                    "Exchange completed"
                );
                response.commit()
            } else {
                tracing::warn!(
                    message_id = %message_id,
                    elapsed_ms = outcome.elapsed().as_millis() as u64,
                    status = %policy.on_timeout_status,
                    "Exchange timed out, answering provisionally"
                );
                response.commit_provisional(policy.on_timeout_status)
            }
        }
        None => {
            metrics::record_exchange("fire_and_forget", Duration::ZERO);
            response.commit()
        }
    };

    match committed {
        Some(committed) => committed.into_response(),
        None => {
            tracing::error!(message_id = %message_id, "Response was committed outside the ingress handler");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
