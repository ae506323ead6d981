//! Workflow seam.
//!
//! # Data Flow
//! ```text
//! submit(message)
//!     → executor (inline | blocking pool | dedicated thread)
//!     → interceptors: workflow_start(message)
//!     → services, in order, each mutating the message
//!     → interceptors: workflow_end(input, output)
//! ```
//!
//! # Design Decisions
//! - `Workflow::submit` is fire-and-forget; completion is observed only through
//!   interceptors, never through a return value
//! - Interceptors are where exchange completion is signalled
//! - A failing or panicking service stops the chain but the end hooks still run
//! - An interceptor may refuse a message in `workflow_start`; the services are
//!   then skipped and the end hooks still run

pub mod message;
pub mod queue;
pub mod services;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::http::response::WriteError;
use crate::workflow::message::IngressMessage;

/// Metadata key set on a message whose chain failed.
pub const WORKFLOW_ERROR_KEY: &str = "workflow.error";

/// Failure raised by a service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("response write failed: {0}")]
    Write(#[from] WriteError),

    #[error("correlation key {0:?} is already in use")]
    KeyInUse(String),

    #[error("service panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

/// One stage in a workflow's service chain.
pub trait Service: Send + Sync {
    fn apply(&self, message: &mut IngressMessage) -> Result<(), ServiceError>;
}

/// Observes the start and end of a workflow run for a message.
pub trait WorkflowInterceptor: Send + Sync {
    /// An `Err` refuses the message: no service runs for it.
    fn workflow_start(&self, message: &mut IngressMessage) -> Result<(), ServiceError>;

    fn workflow_end(&self, input: &IngressMessage, output: &IngressMessage);
}

/// Something a message can be handed to.
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    fn submit(&self, message: IngressMessage);
}

/// Where a workflow runs its service chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Executor {
    /// On the submitting thread, before `submit` returns.
    Inline,
    /// On the tokio blocking pool.
    #[default]
    Blocking,
    /// On a freshly spawned OS thread.
    Thread,
}

/// Closure adapter implementing [`Service`].
pub struct FnService<F>(pub F)
where
    F: Fn(&mut IngressMessage) -> Result<(), ServiceError> + Send + Sync;

impl<F> Service for FnService<F>
where
    F: Fn(&mut IngressMessage) -> Result<(), ServiceError> + Send + Sync,
{
    fn apply(&self, message: &mut IngressMessage) -> Result<(), ServiceError> {
        (self.0)(message)
    }
}

struct Chain {
    name: String,
    services: Vec<Arc<dyn Service>>,
    interceptors: Vec<Arc<dyn WorkflowInterceptor>>,
}

impl Chain {
    fn run(&self, mut message: IngressMessage) {
        let input = message.clone();
        let started = self
            .interceptors
            .iter()
            .try_for_each(|interceptor| interceptor.workflow_start(&mut message));

        match started {
            Ok(()) => self.run_services(&mut message),
            Err(e) => {
                tracing::warn!(
                    workflow = %self.name,
                    message_id = %message.unique_id(),
                    error = %e,
                    "Message refused at workflow start"
                );
                message.set_metadata(WORKFLOW_ERROR_KEY, e.to_string());
            }
        }

        for interceptor in &self.interceptors {
            interceptor.workflow_end(&input, &message);
        }
    }

    fn run_services(&self, message: &mut IngressMessage) {
        for (index, service) in self.services.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| service.apply(message)))
                .unwrap_or_else(|payload| Err(ServiceError::Panicked(panic_message(payload))));

            if let Err(e) = result {
                tracing::error!(
                    workflow = %self.name,
                    message_id = %message.unique_id(),
                    service_index = index,
                    error = %e,
                    "Service failed, abandoning chain"
                );
                message.set_metadata(WORKFLOW_ERROR_KEY, e.to_string());
                if let Some(response) = &message.exchange().response {
                    // Best effort: the exchange may already be committed or sealed.
                    let _ = response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                break;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&'static str>() {
            Some(message) => (*message).to_string(),
            None => "unknown panic payload".to_string(),
        },
    }
}

/// Reference workflow: a fixed service chain wrapped by interceptors.
pub struct ServiceChainWorkflow {
    chain: Arc<Chain>,
    executor: Executor,
}

impl ServiceChainWorkflow {
    pub fn builder(name: impl Into<String>) -> ServiceChainWorkflowBuilder {
        ServiceChainWorkflowBuilder {
            name: name.into(),
            services: Vec::new(),
            interceptors: Vec::new(),
            executor: Executor::default(),
        }
    }

    pub fn executor(&self) -> Executor {
        self.executor
    }
}

impl Workflow for ServiceChainWorkflow {
    fn name(&self) -> &str {
        &self.chain.name
    }

    fn submit(&self, message: IngressMessage) {
        let chain = Arc::clone(&self.chain);
        match self.executor {
            Executor::Inline => chain.run(message),
            Executor::Blocking => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || chain.run(message));
                }
                Err(_) => {
                    tracing::debug!(workflow = %chain.name, "No tokio runtime, running chain on a thread");
                    std::thread::spawn(move || chain.run(message));
                }
            },
            Executor::Thread => {
                std::thread::spawn(move || chain.run(message));
            }
        }
    }
}

pub struct ServiceChainWorkflowBuilder {
    name: String,
    services: Vec<Arc<dyn Service>>,
    interceptors: Vec<Arc<dyn WorkflowInterceptor>>,
    executor: Executor,
}

impl ServiceChainWorkflowBuilder {
    pub fn service(mut self, service: impl Service + 'static) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    pub fn interceptor(mut self, interceptor: impl WorkflowInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn build(self) -> ServiceChainWorkflow {
        ServiceChainWorkflow {
            chain: Arc::new(Chain {
                name: self.name,
                services: self.services,
                interceptors: self.interceptors,
            }),
            executor: self.executor,
        }
    }
}
