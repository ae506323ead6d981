//! Per-exchange completion monitor.
//!
//! # Responsibilities
//! - Record when an exchange started and when it was declared complete
//! - Park the ingress side until completion (blocking or async)
//! - Wake every waiter when a producer marks the exchange complete
//!
//! # Design Decisions
//! - One mutex/condvar pair per monitor
//! - First writer wins: only the first `mark_complete` records an end time
//! - Every wait takes a timeout; callers loop against their own deadline

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct MonitorState {
    started: Instant,
    ended: Option<Instant>,
}

/// Completion state of one in-flight exchange.
///
/// Shared via `Arc` between the ingress side (which waits) and whichever
/// thread ends up declaring the exchange done.
#[derive(Debug)]
pub struct CompletionMonitor {
    state: Mutex<MonitorState>,
    cond: Condvar,
    notify: Notify,
}

impl CompletionMonitor {
    /// Create a monitor for an exchange starting now.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                started: Instant::now(),
                ended: None,
            }),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    // A panic while holding this lock cannot leave the state half-written,
    // so a poisoned guard is still valid.
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the exchange complete and wake all waiters.
    ///
    /// Returns `true` if this call performed the transition. Later calls are
    /// no-ops that return `false` and leave the recorded end time untouched.
    pub fn mark_complete(&self) -> bool {
        {
            let mut state = self.lock();
            if state.ended.is_some() {
                return false;
            }
            state.ended = Some(Instant::now());
        }
        self.cond.notify_all();
        self.notify.notify_waiters();
        true
    }

    /// Non-blocking completion check.
    pub fn is_complete(&self) -> bool {
        self.lock().ended.is_some()
    }

    /// When the exchange started.
    pub fn started_at(&self) -> Instant {
        self.lock().started
    }

    /// When the exchange was marked complete, if it has been.
    pub fn completed_at(&self) -> Option<Instant> {
        self.lock().ended
    }

    /// Processing time: start to completion, or start to now while pending.
    pub fn elapsed(&self) -> Duration {
        let state = self.lock();
        match state.ended {
            Some(ended) => ended.saturating_duration_since(state.started),
            None => state.started.elapsed(),
        }
    }

    /// Block the current thread for at most `timeout` waiting for completion.
    ///
    /// Returns whether the exchange is complete on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        if state.ended.is_some() {
            return true;
        }
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.ended.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.ended.is_some()
    }

    /// Async counterpart of [`wait_timeout`](Self::wait_timeout).
    pub async fn wait_timeout_async(&self, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a concurrent mark_complete is not lost.
        notified.as_mut().enable();
        if self.is_complete() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.is_complete()
    }
}

impl Default for CompletionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
