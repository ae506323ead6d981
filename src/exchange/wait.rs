//! Ingress-side wait loop.
//!
//! # Responsibilities
//! - Park until the exchange completes or the policy's max wait runs out
//! - Re-check completion and the deadline on every wake, spurious or not
//! - Emit a one-off warning when the wait passes `warn_after`
//!
//! # Design Decisions
//! - Parks in slices of at most `poll_interval`, so shutdown can make progress
//! - `max_wait == 0` checks once and times out; nothing underflows
//! - Blocking and async flavours share the same decision logic

use std::time::Duration;

use crate::exchange::monitor::CompletionMonitor;
use crate::exchange::policy::TimeoutPolicy;

/// Terminal state of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The exchange was marked complete within the budget.
    Completed { elapsed: Duration },
    /// The budget ran out first; the workflow may still be running.
    TimedOut { elapsed: Duration },
}

impl WaitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WaitOutcome::Completed { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match *self {
            WaitOutcome::Completed { elapsed } | WaitOutcome::TimedOut { elapsed } => elapsed,
        }
    }

    /// Label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::Completed { .. } => "completed",
            WaitOutcome::TimedOut { .. } => "timed_out",
        }
    }
}

/// One step of the loop: either a final outcome or how long to park next.
enum Step {
    Done(WaitOutcome),
    Park(Duration),
}

struct WaitState<'a> {
    monitor: &'a CompletionMonitor,
    policy: &'a TimeoutPolicy,
    warned: bool,
}

impl<'a> WaitState<'a> {
    fn new(monitor: &'a CompletionMonitor, policy: &'a TimeoutPolicy) -> Self {
        Self {
            monitor,
            policy,
            warned: false,
        }
    }

    fn step(&mut self) -> Step {
        let waited = self.monitor.started_at().elapsed();

        if self.monitor.is_complete() {
            return Step::Done(WaitOutcome::Completed {
                elapsed: self.monitor.elapsed(),
            });
        }
        if self.policy.is_exhausted(waited) {
            return Step::Done(WaitOutcome::TimedOut { elapsed: waited });
        }

        if !self.warned && waited >= self.policy.warn_after {
            self.warned = true;
            tracing::warn!(
                waited_ms = waited.as_millis() as u64,
                warn_after_ms = self.policy.warn_after.as_millis() as u64,
                max_wait_ms = self.policy.max_wait.as_millis() as u64,
                "Exchange still waiting for workflow completion"
            );
        }

        Step::Park(self.policy.next_wait(waited))
    }
}

/// Block the calling thread until `monitor` completes or `policy` gives up.
pub fn await_or_timeout(monitor: &CompletionMonitor, policy: &TimeoutPolicy) -> WaitOutcome {
    let mut state = WaitState::new(monitor, policy);
    loop {
        match state.step() {
            Step::Done(outcome) => return outcome,
            Step::Park(slice) => {
                monitor.wait_timeout(slice);
            }
        }
    }
}

/// Async counterpart of [`await_or_timeout`]; never blocks a runtime worker.
pub async fn await_or_timeout_async(
    monitor: &CompletionMonitor,
    policy: &TimeoutPolicy,
) -> WaitOutcome {
    let mut state = WaitState::new(monitor, policy);
    loop {
        match state.step() {
            Step::Done(outcome) => return outcome,
            Step::Park(slice) => {
                monitor.wait_timeout_async(slice).await;
            }
        }
    }
}
