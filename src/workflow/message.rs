//! Internal message carried through workflows.

use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::exchange::monitor::CompletionMonitor;
use crate::http::response::ResponseHandle;

/// Handles tying a message back to the HTTP exchange that produced it.
///
/// Passed explicitly on the message while it stays in-process. They never
/// cross a queue; see [`IngressMessage::detached_copy`].
#[derive(Debug, Clone, Default)]
pub struct ExchangeHandles {
    pub monitor: Option<Arc<CompletionMonitor>>,
    pub response: Option<ResponseHandle>,
}

impl ExchangeHandles {
    pub fn is_empty(&self) -> bool {
        self.monitor.is_none() && self.response.is_none()
    }
}

/// A unit of work flowing through a workflow.
#[derive(Debug, Clone)]
pub struct IngressMessage {
    unique_id: String,
    payload: Bytes,
    metadata: HashMap<String, String>,
    exchange: ExchangeHandles,
}

impl IngressMessage {
    /// Create a message with a fresh UUID v4 id.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    pub fn with_id(unique_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            unique_id: unique_id.into(),
            payload: payload.into(),
            metadata: HashMap::new(),
            exchange: ExchangeHandles::default(),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_map(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn exchange(&self) -> &ExchangeHandles {
        &self.exchange
    }

    pub fn exchange_mut(&mut self) -> &mut ExchangeHandles {
        &mut self.exchange
    }

    /// Attach the ingress handles for this exchange.
    pub fn attach(&mut self, monitor: Option<Arc<CompletionMonitor>>, response: Option<ResponseHandle>) {
        self.exchange = ExchangeHandles { monitor, response };
    }

    /// Copy of id, payload and metadata without the exchange handles.
    ///
    /// This is what crosses a queue into another workflow.
    pub fn detached_copy(&self) -> Self {
        Self {
            unique_id: self.unique_id.clone(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            exchange: ExchangeHandles::default(),
        }
    }
}
