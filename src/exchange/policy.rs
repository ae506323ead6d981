//! How long the ingress side may wait, and what it sends when it gives up.

use axum::http::StatusCode;
use std::time::Duration;

use crate::config::schema::WaitConfig;
use crate::config::validation::ValidationError;

/// Smallest interval the wait loop will park for.
const MIN_POLL: Duration = Duration::from_millis(1);

/// Wait limits for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Upper bound on how long the ingress side waits for completion.
    pub max_wait: Duration,
    /// Diagnostic threshold: log a warning once the wait passes it.
    pub warn_after: Duration,
    /// Status written to the client when `max_wait` is exceeded.
    pub on_timeout_status: StatusCode,
    /// Longest single park between completion checks.
    pub poll_interval: Duration,
}

impl TimeoutPolicy {
    /// Policy with the given max wait and the default everything else.
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Self::default()
        }
    }

    /// How long to park next, given the time already spent waiting.
    ///
    /// Never longer than the poll interval or the remaining budget.
    pub fn next_wait(&self, elapsed: Duration) -> Duration {
        let remaining = self.max_wait.saturating_sub(elapsed);
        self.poll_interval.min(remaining).max(MIN_POLL)
    }

    /// Whether the wait budget is used up.
    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        elapsed >= self.max_wait
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            warn_after: Duration::from_millis(20_000),
            on_timeout_status: StatusCode::ACCEPTED,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl TryFrom<&WaitConfig> for TimeoutPolicy {
    type Error = ValidationError;

    fn try_from(config: &WaitConfig) -> Result<Self, Self::Error> {
        let on_timeout_status = StatusCode::from_u16(config.on_timeout_status)
            .ok()
            .filter(|s| s.as_u16() < 600)
            .ok_or(ValidationError::InvalidStatus(config.on_timeout_status))?;
        if config.poll_interval_millis == 0 {
            return Err(ValidationError::ZeroDuration("wait.poll_interval_millis"));
        }

        Ok(Self {
            max_wait: Duration::from_millis(config.max_wait_millis),
            warn_after: Duration::from_millis(config.warn_after_millis),
            on_timeout_status,
            poll_interval: Duration::from_millis(config.poll_interval_millis),
        })
    }
}
