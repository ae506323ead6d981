//! Producer-side completion signalling.
//!
//! Two call sites mark an exchange done: the end-of-workflow hook, and an
//! explicit commit from a stage that has already produced the response.
//! Both may fire for the same monitor; the monitor keeps the first.

use std::sync::Arc;

use crate::exchange::monitor::CompletionMonitor;
use crate::workflow::message::IngressMessage;
use crate::workflow::{ServiceError, WorkflowInterceptor};

/// Mark the monitor attached to `message` complete, right now.
///
/// Safe to call mid-chain; the end-of-workflow hook firing later for the same
/// monitor is a no-op. Returns the number of monitors that transitioned.
pub fn commit_now(message: &IngressMessage) -> usize {
    let transitioned = message
        .exchange()
        .monitor
        .as_deref()
        .map(CompletionMonitor::mark_complete)
        .unwrap_or(false);

    if transitioned {
        tracing::debug!(message_id = %message.unique_id(), "Exchange committed early");
    }
    usize::from(transitioned)
}

/// Mark every monitor reachable from the workflow's input and output messages.
///
/// The same monitor attached to both is only signalled once.
pub fn workflow_end(input: &IngressMessage, output: &IngressMessage) -> usize {
    let mut monitors: Vec<&Arc<CompletionMonitor>> = Vec::with_capacity(2);
    for monitor in [&input.exchange().monitor, &output.exchange().monitor]
        .into_iter()
        .flatten()
    {
        if !monitors.iter().any(|m| Arc::ptr_eq(m, monitor)) {
            monitors.push(monitor);
        }
    }

    let transitioned = monitors.iter().filter(|m| m.mark_complete()).count();
    if transitioned > 0 {
        tracing::debug!(
            message_id = %output.unique_id(),
            monitors = transitioned,
            "Workflow end signalled exchange completion"
        );
    }
    transitioned
}

/// Default end-of-workflow hook for workflows that answer their own requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionHook;

impl WorkflowInterceptor for CompletionHook {
    fn workflow_start(&self, _message: &mut IngressMessage) -> Result<(), ServiceError> {
        Ok(())
    }

    fn workflow_end(&self, input: &IngressMessage, output: &IngressMessage) {
        workflow_end(input, output);
    }
}
