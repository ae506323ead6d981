//! Response-producing services.
//!
//! # Responsibilities
//! - Copy the message payload into the exchange's response handle
//! - Release the ingress side early once the response is populated
//!
//! # Design Decisions
//! - Write failures (late writes, vanished clients) are logged and swallowed
//!   unless `propagate_write_errors` is set
//! - The early commit only signals completion; committing the HTTP response
//!   stays with the ingress side

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};

use crate::config::schema::ResponseConfig;
use crate::exchange::signal;
use crate::http::response::WriteError;
use crate::observability::metrics;
use crate::workflow::message::IngressMessage;
use crate::workflow::{Service, ServiceError};

/// Metadata key that overrides the configured response status.
pub const RESPONSE_STATUS_KEY: &str = "response.status";

/// Writes the message payload as the HTTP response.
#[derive(Debug, Clone)]
pub struct WriteResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    propagate_write_errors: bool,
}

impl WriteResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            propagate_write_errors: false,
        }
    }

    pub fn from_config(config: &ResponseConfig) -> Self {
        let status = StatusCode::from_u16(config.status).unwrap_or(StatusCode::OK);
        let content_type = config
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok());
        Self {
            status,
            content_type,
            propagate_write_errors: config.propagate_write_errors,
        }
    }

    pub fn content_type(mut self, content_type: HeaderValue) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn propagate_write_errors(mut self, propagate: bool) -> Self {
        self.propagate_write_errors = propagate;
        self
    }

    fn status_for(&self, message: &IngressMessage) -> StatusCode {
        message
            .metadata(RESPONSE_STATUS_KEY)
            .and_then(|s| s.parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(self.status)
    }

    fn write(&self, message: &IngressMessage) -> Result<(), WriteError> {
        let Some(response) = &message.exchange().response else {
            tracing::debug!(message_id = %message.unique_id(), "No response handle attached, nothing to write");
            return Ok(());
        };

        response.set_status(self.status_for(message))?;
        if let Some(content_type) = &self.content_type {
            response.insert_header(CONTENT_TYPE, content_type.clone())?;
        }
        response.set_body(message.payload())
    }
}

impl Service for WriteResponse {
    fn apply(&self, message: &mut IngressMessage) -> Result<(), ServiceError> {
        match self.write(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                metrics::record_write_failure(e.as_str());
                if self.propagate_write_errors {
                    return Err(e.into());
                }
                tracing::warn!(
                    message_id = %message.unique_id(),
                    reason = e.as_str(),
                    "Response write failed, ignoring"
                );
                Ok(())
            }
        }
    }
}

/// Writes the response, seals it, then releases the waiting ingress side.
///
/// Services after this one keep running but can no longer change what the
/// client receives; the end-of-workflow hook firing later for the same
/// exchange is a no-op.
#[derive(Debug, Clone)]
pub struct CommitResponse {
    writer: WriteResponse,
}

impl CommitResponse {
    pub fn new(writer: WriteResponse) -> Self {
        Self { writer }
    }
}

impl Service for CommitResponse {
    fn apply(&self, message: &mut IngressMessage) -> Result<(), ServiceError> {
        self.writer.apply(message)?;
        if let Some(response) = &message.exchange().response {
            response.seal();
        }
        signal::commit_now(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::CompletionMonitor;
    use crate::http::response::ResponseHandle;
    use std::sync::Arc;

    fn attached(payload: &'static str) -> (IngressMessage, Arc<CompletionMonitor>, ResponseHandle) {
        let monitor = Arc::new(CompletionMonitor::new());
        let response = ResponseHandle::new();
        let mut message = IngressMessage::new(payload);
        message.attach(Some(Arc::clone(&monitor)), Some(response.clone()));
        (message, monitor, response)
    }

    #[test]
    fn test_write_response_copies_payload() {
        let (mut message, monitor, response) = attached("hello");
        WriteResponse::new(StatusCode::CREATED)
            .content_type(HeaderValue::from_static("text/plain"))
            .apply(&mut message)
            .unwrap();

        assert!(!monitor.is_complete());
        let committed = response.commit().unwrap();
        assert_eq!(committed.status, StatusCode::CREATED);
        assert_eq!(committed.body.as_ref(), b"hello");
        assert_eq!(committed.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_status_override_from_metadata() {
        let (mut message, _, response) = attached("x");
        message.set_metadata(RESPONSE_STATUS_KEY, "418");
        WriteResponse::new(StatusCode::OK).apply(&mut message).unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_late_write_is_swallowed_by_default() {
        let (mut message, _, response) = attached("late");
        response.commit_provisional(StatusCode::ACCEPTED);
        assert!(WriteResponse::new(StatusCode::OK).apply(&mut message).is_ok());
    }

    #[test]
    fn test_late_write_propagates_when_asked() {
        let (mut message, _, response) = attached("late");
        response.commit_provisional(StatusCode::ACCEPTED);
        let result = WriteResponse::new(StatusCode::OK)
            .propagate_write_errors(true)
            .apply(&mut message);
        assert!(matches!(result, Err(ServiceError::Write(WriteError::AlreadyCommitted))));
    }

    #[test]
    fn test_commit_response_marks_monitor() {
        let (mut message, monitor, response) = attached("early");
        CommitResponse::new(WriteResponse::new(StatusCode::OK))
            .apply(&mut message)
            .unwrap();
        assert!(monitor.is_complete());
        assert_eq!(response.commit().unwrap().body.as_ref(), b"early");
    }

    #[test]
    fn test_stages_after_early_commit_cannot_rewrite_response() {
        let (mut message, _, response) = attached("early");
        CommitResponse::new(WriteResponse::new(StatusCode::CREATED))
            .apply(&mut message)
            .unwrap();
        assert!(response.is_sealed());

        message.set_payload("rewritten");
        let result = WriteResponse::new(StatusCode::OK)
            .propagate_write_errors(true)
            .apply(&mut message);
        assert!(matches!(result, Err(ServiceError::Write(WriteError::AlreadyCommitted))));
        assert_eq!(response.set_status(StatusCode::INTERNAL_SERVER_ERROR), Err(WriteError::AlreadyCommitted));

        let committed = response.commit().unwrap();
        assert_eq!(committed.status, StatusCode::CREATED);
        assert_eq!(committed.body.as_ref(), b"early");
    }

    #[test]
    fn test_without_handles_is_noop() {
        let mut message = IngressMessage::new("nothing attached");
        assert!(CommitResponse::new(WriteResponse::new(StatusCode::OK))
            .apply(&mut message)
            .is_ok());
    }
}
