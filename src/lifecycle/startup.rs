//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Create the correlation cache owned by this component
//! - Build the ingress workflow (direct or queued handoff)
//! - Start background tasks (cache reaper, queue consumers)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Must be called from within a tokio runtime
//! - `stop` tears down everything `start` created

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::schema::{Handoff, IngressConfig};
use crate::config::validation::{join_errors, validate_config, ValidationError};
use crate::correlation::{CorrelationCache, CorrelationInterceptor, CorrelationMode, KeyExpression};
use crate::exchange::{CompletionHook, TimeoutPolicy};
use crate::http::server::AppState;
use crate::lifecycle::shutdown::Shutdown;
use crate::workflow::queue::{self, QueueConsumer};
use crate::workflow::services::WriteResponse;
use crate::workflow::{ServiceChainWorkflow, Workflow};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

impl From<ValidationError> for StartupError {
    fn from(e: ValidationError) -> Self {
        StartupError::Invalid(vec![e])
    }
}

/// A running ingress component and everything it owns.
pub struct Component {
    config: IngressConfig,
    cache: CorrelationCache,
    workflow: Arc<dyn Workflow>,
    policy: Arc<ArcSwap<TimeoutPolicy>>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Component {
    /// Start with the built-in pipeline described by `config.workflow`.
    pub fn start(config: IngressConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Invalid)?;
        let cache = CorrelationCache::new(Duration::from_secs(config.correlation.ttl_secs));
        let shutdown = Shutdown::new();
        let mut tasks = Vec::new();

        let workflow = build_pipeline(&config, &cache, &shutdown, &mut tasks)?;
        Self::assemble(config, cache, workflow, shutdown, tasks)
    }

    /// Start with a caller-built workflow.
    ///
    /// `build` receives the component's cache (for correlation interceptors)
    /// and shutdown handle (for any consumers it spawns).
    pub fn start_with<F>(config: IngressConfig, build: F) -> Result<Self, StartupError>
    where
        F: FnOnce(&CorrelationCache, &Shutdown) -> Arc<dyn Workflow>,
    {
        validate_config(&config).map_err(StartupError::Invalid)?;
        let cache = CorrelationCache::new(Duration::from_secs(config.correlation.ttl_secs));
        let shutdown = Shutdown::new();

        let workflow = build(&cache, &shutdown);
        Self::assemble(config, cache, workflow, shutdown, Vec::new())
    }

    fn assemble(
        config: IngressConfig,
        cache: CorrelationCache,
        workflow: Arc<dyn Workflow>,
        shutdown: Shutdown,
        mut tasks: Vec<JoinHandle<()>>,
    ) -> Result<Self, StartupError> {
        let policy = TimeoutPolicy::try_from(&config.wait)?;

        tasks.push(cache.spawn_reaper(
            Duration::from_secs(config.correlation.reaper_interval_secs),
            shutdown.subscribe(),
        ));

        tracing::info!(
            workflow = %workflow.name(),
            handoff = ?config.workflow.handoff,
            synchronous = config.workflow.synchronous,
            max_wait_ms = policy.max_wait.as_millis() as u64,
            on_timeout_status = %policy.on_timeout_status,
            correlation_ttl_secs = config.correlation.ttl_secs,
            "Ingress component started"
        );

        Ok(Self {
            config,
            cache,
            workflow,
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            shutdown,
            tasks,
        })
    }

    /// State handed to the HTTP server.
    pub fn app_state(&self) -> AppState {
        AppState {
            workflow: Arc::clone(&self.workflow),
            policy: Arc::clone(&self.policy),
            cache: self.cache.clone(),
            synchronous: self.config.workflow.synchronous,
            max_body_size: self.config.listener.max_body_size,
            admin_api_key: self
                .config
                .admin
                .enabled
                .then(|| Arc::from(self.config.admin.api_key.as_str())),
        }
    }

    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Current wait policy.
    pub fn policy(&self) -> Arc<TimeoutPolicy> {
        self.policy.load_full()
    }

    /// Stop background tasks and drop any exchanges still pending.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.cache.clear();
        tracing::info!("Ingress component stopped");
    }
}

fn build_pipeline(
    config: &IngressConfig,
    cache: &CorrelationCache,
    shutdown: &Shutdown,
    tasks: &mut Vec<JoinHandle<()>>,
) -> Result<Arc<dyn Workflow>, StartupError> {
    let writer = WriteResponse::from_config(&config.response);
    let executor = config.workflow.executor;

    match config.workflow.handoff {
        Handoff::Direct => Ok(Arc::new(
            ServiceChainWorkflow::builder("ingress")
                .executor(executor)
                .interceptor(CompletionHook)
                .service(writer)
                .build(),
        )),
        Handoff::Queued => {
            let key: KeyExpression = config
                .correlation
                .key_expression
                .parse()
                .map_err(ValidationError::from)?;
            let (producer, rx) = queue::channel();

            let reply = ServiceChainWorkflow::builder("reply")
                .executor(executor)
                .interceptor(CorrelationInterceptor::new(
                    CorrelationMode::Response,
                    key.clone(),
                    cache.clone(),
                ))
                .service(writer)
                .build();
            tasks.push(QueueConsumer::new(rx, Arc::new(reply)).spawn(shutdown.subscribe()));

            Ok(Arc::new(
                ServiceChainWorkflow::builder("ingress")
                    .executor(executor)
                    .interceptor(CorrelationInterceptor::new(
                        CorrelationMode::Request,
                        key,
                        cache.clone(),
                    ))
                    .service(producer)
                    .build(),
            ))
        }
    }
}
