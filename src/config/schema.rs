//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the ingress.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::correlation::key::DEFAULT_KEY_EXPRESSION;
use crate::workflow::Executor;

/// Root configuration for the ingress relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IngressConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// How long requests wait for their workflow.
    pub wait: WaitConfig,

    /// Cross-workflow correlation settings.
    pub correlation: CorrelationConfig,

    /// Workflow wiring for the built-in pipeline.
    pub workflow: WorkflowConfig,

    /// Response production settings.
    pub response: ResponseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin diagnostics.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body accepted, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Wait/timeout configuration for in-flight exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Longest the ingress side waits for completion, in milliseconds.
    pub max_wait_millis: u64,

    /// Log a warning once a wait passes this many milliseconds.
    pub warn_after_millis: u64,

    /// Status sent when `max_wait_millis` is exceeded.
    pub on_timeout_status: u16,

    /// Longest single park between completion checks, in milliseconds.
    pub poll_interval_millis: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_wait_millis: 10 * 60 * 1000,
            warn_after_millis: 20_000,
            on_timeout_status: 202,
            poll_interval_millis: 1000,
        }
    }
}

/// Correlation cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Expression deriving the correlation key from a message.
    pub key_expression: String,

    /// Lifetime of an unclaimed pending exchange, in seconds.
    pub ttl_secs: u64,

    /// How often expired entries are purged, in seconds.
    pub reaper_interval_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            key_expression: DEFAULT_KEY_EXPRESSION.to_string(),
            ttl_secs: 3600,
            reaper_interval_secs: 60,
        }
    }
}

/// How requests travel from the listener to the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Handoff {
    /// One workflow receives the request and writes the reply.
    #[default]
    Direct,
    /// The receiving workflow queues the message; a second workflow replies.
    Queued,
}

/// Built-in pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Where service chains run.
    pub executor: Executor,

    /// Direct or cross-workflow reply.
    pub handoff: Handoff,

    /// Wait for completion; `false` answers immediately (fire-and-forget).
    pub synchronous: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            executor: Executor::Blocking,
            handoff: Handoff::Direct,
            synchronous: true,
        }
    }
}

/// Response production configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status written by the response producer.
    pub status: u16,

    /// Optional Content-Type header.
    pub content_type: Option<String>,

    /// Fail the workflow when a response write fails (late or disconnected).
    pub propagate_write_errors: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: None,
            propagate_write_errors: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin diagnostics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: IngressConfig = toml::from_str("").unwrap();
        assert_eq!(config.wait.max_wait_millis, 600_000);
        assert_eq!(config.wait.warn_after_millis, 20_000);
        assert_eq!(config.wait.on_timeout_status, 202);
        assert_eq!(config.correlation.key_expression, "%message{%uniqueId}");
        assert_eq!(config.correlation.ttl_secs, 3600);
        assert_eq!(config.workflow.handoff, Handoff::Direct);
        assert!(config.workflow.synchronous);
    }

    #[test]
    fn test_partial_sections() {
        let config: IngressConfig = toml::from_str(
            r#"
            [wait]
            max_wait_millis = 100

            [workflow]
            executor = "thread"
            handoff = "queued"
            "#,
        )
        .unwrap();
        assert_eq!(config.wait.max_wait_millis, 100);
        assert_eq!(config.wait.poll_interval_millis, 1000);
        assert_eq!(config.workflow.executor, Executor::Thread);
        assert_eq!(config.workflow.handoff, Handoff::Queued);
    }

    #[test]
    fn test_unknown_handoff_is_rejected() {
        let result = toml::from_str::<IngressConfig>("[workflow]\nhandoff = \"carrier-pigeon\"");
        assert!(result.is_err());
    }
}
