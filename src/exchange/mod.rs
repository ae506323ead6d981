//! Exchange completion subsystem.
//!
//! # Data Flow
//! ```text
//! ingress handler
//!     → monitor.rs (new CompletionMonitor per exchange)
//!     → workflow.submit(message)           (same thread, pool, or another workflow)
//!     → wait.rs (bounded wait against policy.rs)
//!
//! producer side (any thread):
//!     → signal.rs (workflow-end hook or explicit commit-now)
//!     → monitor.mark_complete() wakes the waiter
//! ```
//!
//! # Design Decisions
//! - A monitor belongs to exactly one exchange; there is no shared lock
//! - Timeout is a normal `WaitOutcome`, not an error
//! - Timing out never cancels the workflow; it only changes what the client sees

pub mod monitor;
pub mod policy;
pub mod signal;
pub mod wait;

pub use monitor::CompletionMonitor;
pub use policy::TimeoutPolicy;
pub use signal::CompletionHook;
pub use wait::{await_or_timeout, await_or_timeout_async, WaitOutcome};
