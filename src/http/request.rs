//! Request intake.
//!
//! # Responsibilities
//! - Buffer the request body up to the configured limit
//! - Turn an HTTP request into an [`IngressMessage`]
//! - Copy request line and headers into message metadata
//!
//! # Design Decisions
//! - The message id is always generated here. The `x-request-id` value is
//!   client-controlled, so it is kept as metadata for tracing and never
//!   becomes the default correlation key
//! - Non-UTF-8 header values are skipped, not rejected

use axum::body::{self, Body};
use axum::http::Request;

use crate::workflow::message::IngressMessage;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Metadata key holding the request id seen at ingress.
pub const REQUEST_ID_KEY: &str = "http.request_id";
pub const METHOD_KEY: &str = "http.method";
pub const PATH_KEY: &str = "http.path";
pub const QUERY_KEY: &str = "http.query";
pub const HEADER_KEY_PREFIX: &str = "http.header.";

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
}

/// Request id header value, if present and printable.
pub fn request_id<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Consume `request` into a message, reading at most `max_body` bytes.
pub async fn into_message(request: Request<Body>, max_body: usize) -> Result<IngressMessage, RequestError> {
    let request_id = request_id(&request).map(str::to_owned);
    let (parts, body) = request.into_parts();
    let payload = body::to_bytes(body, max_body).await?;

    let mut message = IngressMessage::new(payload);
    if let Some(request_id) = request_id {
        message.set_metadata(REQUEST_ID_KEY, request_id);
    }
    message.set_metadata(METHOD_KEY, parts.method.as_str());
    message.set_metadata(PATH_KEY, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        message.set_metadata(QUERY_KEY, query);
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            message.set_metadata(format!("{HEADER_KEY_PREFIX}{}", name.as_str()), value);
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_becomes_message() {
        let request = Request::builder()
            .method("POST")
            .uri("/orders/42?dry_run=1")
            .header(X_REQUEST_ID, "req-1")
            .header("x-tenant", "acme")
            .body(Body::from("{\"qty\":1}"))
            .unwrap();

        let message = into_message(request, 1024).await.unwrap();
        assert_eq!(message.metadata(REQUEST_ID_KEY), Some("req-1"));
        assert_ne!(message.unique_id(), "req-1");
        assert_eq!(message.payload().as_ref(), b"{\"qty\":1}");
        assert_eq!(message.metadata(METHOD_KEY), Some("POST"));
        assert_eq!(message.metadata(PATH_KEY), Some("/orders/42"));
        assert_eq!(message.metadata(QUERY_KEY), Some("dry_run=1"));
        assert_eq!(message.metadata("http.header.x-tenant"), Some("acme"));
        assert!(message.exchange().is_empty());
    }

    #[tokio::test]
    async fn test_missing_request_id_gets_fresh_one() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(request_id(&request).is_none());
        let message = into_message(request, 1024).await.unwrap();
        assert!(!message.unique_id().is_empty());
        assert!(message.metadata(QUERY_KEY).is_none());
    }

    #[tokio::test]
    async fn test_client_request_id_never_becomes_message_id() {
        let build = || {
            Request::builder()
                .uri("/")
                .header(X_REQUEST_ID, "dup")
                .body(Body::empty())
                .unwrap()
        };
        let first = into_message(build(), 1024).await.unwrap();
        let second = into_message(build(), 1024).await.unwrap();
        assert_ne!(first.unique_id(), second.unique_id());
        assert_eq!(first.metadata(REQUEST_ID_KEY), second.metadata(REQUEST_ID_KEY));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let request = Request::builder()
            .uri("/")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        assert!(into_message(request, 16).await.is_err());
    }
}
