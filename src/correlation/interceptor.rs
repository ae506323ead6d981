//! REQUEST/RESPONSE correlation roles.
//!
//! # State Machine
//! ```text
//! REQUEST  start: resolve key, store {monitor, response}
//!                 key already pending → answer 409, refuse the message
//! REQUEST  end:   nothing (entry stays for the responder)
//! RESPONSE start: resolve key, take; attach handles if present
//! RESPONSE end:   signal whatever monitor is attached
//! ```
//!
//! # Design Decisions
//! - The REQUEST side resolves the key before the message is queued
//! - A RESPONSE-side miss is expected and only logged at debug
//! - Key resolution failures never fail the workflow
//! - A key collision never touches the exchange already parked under it

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::correlation::cache::{CorrelationCache, PendingExchange, StoreError};
use crate::correlation::key::KeyExpression;
use crate::exchange::signal;
use crate::workflow::message::IngressMessage;
use crate::workflow::{ServiceError, WorkflowInterceptor};

/// Which half of the handoff an interceptor plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMode {
    /// The workflow that received the HTTP request.
    Request,
    /// The workflow that produces the reply.
    Response,
}

/// Workflow interceptor that parks or reclaims an exchange via the cache.
#[derive(Debug, Clone)]
pub struct CorrelationInterceptor {
    mode: CorrelationMode,
    key: KeyExpression,
    cache: CorrelationCache,
    ttl: Duration,
}

impl CorrelationInterceptor {
    pub fn new(mode: CorrelationMode, key: KeyExpression, cache: CorrelationCache) -> Self {
        let ttl = cache.default_ttl();
        Self { mode, key, cache, ttl }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    fn resolve(&self, message: &IngressMessage) -> Option<String> {
        match self.key.resolve(message) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(
                    message_id = %message.unique_id(),
                    mode = ?self.mode,
                    expression = %self.key,
                    error = %e,
                    "Could not resolve correlation key"
                );
                None
            }
        }
    }

    fn park(&self, message: &IngressMessage) -> Result<(), ServiceError> {
        let handles = message.exchange();
        let (Some(monitor), Some(response)) = (&handles.monitor, &handles.response) else {
            tracing::debug!(message_id = %message.unique_id(), "No exchange attached, nothing to park");
            return Ok(());
        };
        let Some(key) = self.resolve(message) else {
            return Ok(());
        };

        let pending = PendingExchange {
            monitor: monitor.clone(),
            response: response.clone(),
        };
        match self.cache.store_with_ttl(key.clone(), pending, self.ttl) {
            Ok(()) => {
                tracing::debug!(key = %key, message_id = %message.unique_id(), "Parked pending exchange");
                Ok(())
            }
            Err(StoreError::KeyInUse(key)) => {
                // Answer this caller now; the parked exchange keeps waiting for its reply.
                if response.set_status(StatusCode::CONFLICT).is_ok() {
                    response.seal();
                }
                signal::commit_now(message);
                Err(ServiceError::KeyInUse(key))
            }
        }
    }

    fn reclaim(&self, message: &mut IngressMessage) {
        let Some(key) = self.resolve(message) else {
            return;
        };
        match self.cache.take(&key) {
            Some(pending) => {
                tracing::debug!(key = %key, message_id = %message.unique_id(), "Reclaimed pending exchange");
                message.attach(Some(pending.monitor), Some(pending.response));
            }
            None => {
                tracing::debug!(key = %key, message_id = %message.unique_id(), "No pending exchange for key");
            }
        }
    }
}

impl WorkflowInterceptor for CorrelationInterceptor {
    fn workflow_start(&self, message: &mut IngressMessage) -> Result<(), ServiceError> {
        match self.mode {
            CorrelationMode::Request => self.park(message),
            CorrelationMode::Response => {
                self.reclaim(message);
                Ok(())
            }
        }
    }

    fn workflow_end(&self, input: &IngressMessage, output: &IngressMessage) {
        if self.mode == CorrelationMode::Response {
            signal::workflow_end(input, output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::CompletionMonitor;
    use crate::http::response::ResponseHandle;
    use std::sync::Arc;

    fn setup() -> (CorrelationCache, CorrelationInterceptor, CorrelationInterceptor) {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        let request = CorrelationInterceptor::new(CorrelationMode::Request, KeyExpression::default(), cache.clone());
        let response = CorrelationInterceptor::new(CorrelationMode::Response, KeyExpression::default(), cache.clone());
        (cache, request, response)
    }

    fn inbound(id: &str) -> (IngressMessage, Arc<CompletionMonitor>) {
        let monitor = Arc::new(CompletionMonitor::new());
        let mut message = IngressMessage::with_id(id, "req");
        message.attach(Some(Arc::clone(&monitor)), Some(ResponseHandle::new()));
        (message, monitor)
    }

    #[test]
    fn test_request_side_parks_and_leaves_entry() {
        let (cache, request, _) = setup();
        let (mut message, monitor) = inbound("abc");

        request.workflow_start(&mut message).unwrap();
        assert!(cache.contains_key("abc"));

        request.workflow_end(&message, &message);
        assert!(cache.contains_key("abc"));
        assert!(!monitor.is_complete());
    }

    #[test]
    fn test_response_side_reclaims_and_signals() {
        let (cache, request, response) = setup();
        let (mut message, monitor) = inbound("abc");
        request.workflow_start(&mut message).unwrap();

        let mut reply = message.detached_copy();
        let input = reply.clone();
        response.workflow_start(&mut reply).unwrap();
        assert!(!cache.contains_key("abc"));
        assert!(reply.exchange().monitor.is_some());

        response.workflow_end(&input, &reply);
        assert!(monitor.is_complete());
    }

    #[test]
    fn test_response_side_miss_is_quiet() {
        let (_, _, response) = setup();
        let mut reply = IngressMessage::with_id("never-stored", "");
        response.workflow_start(&mut reply).unwrap();
        assert!(reply.exchange().is_empty());
        response.workflow_end(&reply.clone(), &reply);
    }

    #[test]
    fn test_unresolvable_key_skips_store() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        let expr: KeyExpression = "%message{orderId}".parse().unwrap();
        let request = CorrelationInterceptor::new(CorrelationMode::Request, expr, cache.clone());
        let (mut message, _) = inbound("abc");
        request.workflow_start(&mut message).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_colliding_key_answers_conflict_and_keeps_first_exchange() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        let expr: KeyExpression = "%message{http.header.x-order-id}".parse().unwrap();
        let request = CorrelationInterceptor::new(CorrelationMode::Request, expr.clone(), cache.clone());
        let response = CorrelationInterceptor::new(CorrelationMode::Response, expr, cache.clone());

        let (mut first, first_monitor) = inbound("one");
        first.set_metadata("http.header.x-order-id", "dup");
        request.workflow_start(&mut first).unwrap();

        let (mut second, second_monitor) = inbound("two");
        second.set_metadata("http.header.x-order-id", "dup");
        let result = request.workflow_start(&mut second);
        assert!(matches!(result, Err(ServiceError::KeyInUse(ref key)) if key == "dup"));
        assert!(second_monitor.is_complete());
        let rejected = second.exchange().response.as_ref().unwrap();
        assert_eq!(rejected.commit().unwrap().status, StatusCode::CONFLICT);

        // The first caller's exchange is still the one the responder reclaims.
        assert!(!first_monitor.is_complete());
        let mut reply = first.detached_copy();
        response.workflow_start(&mut reply).unwrap();
        assert!(Arc::ptr_eq(reply.exchange().monitor.as_ref().unwrap(), &first_monitor));
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: CorrelationMode,
        }
        let w: Wrapper = toml::from_str("mode = \"response\"").unwrap();
        assert_eq!(w.mode, CorrelationMode::Response);
        assert!(toml::from_str::<Wrapper>("mode = \"sideways\"").is_err());
    }
}
