//! Writable response handle.
//!
//! # Responsibilities
//! - Give workflow stages a place to write status, headers and body
//! - Commit the response to the client exactly once
//! - Report writes that arrive after commit or after the client went away
//!
//! # Design Decisions
//! - Only the ingress side commits; stages only write or seal
//! - A sealed handle is frozen: what the shortcut stage wrote is what the
//!   client gets, whatever later stages do
//! - A timed-out exchange commits a provisional, body-less response
//! - Write failures are values (`WriteError`), the caller decides whether they matter

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Why a write to the response was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("response already committed")]
    AlreadyCommitted,

    #[error("client disconnected before the response was committed")]
    ClientDisconnected,
}

impl WriteError {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteError::AlreadyCommitted => "already_committed",
            WriteError::ClientDisconnected => "client_disconnected",
        }
    }
}

#[derive(Debug)]
struct ResponseSlot {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    sealed: bool,
    committed: bool,
}

#[derive(Debug)]
struct ResponseInner {
    slot: Mutex<ResponseSlot>,
    disconnected: AtomicBool,
}

/// Shared handle to the response of one exchange.
#[derive(Debug, Clone)]
pub struct ResponseHandle {
    inner: Arc<ResponseInner>,
}

/// A response that has been handed to the client.
#[derive(Debug)]
pub struct CommittedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseHandle {
    /// New handle, defaulting to `200 OK` with an empty body.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                slot: Mutex::new(ResponseSlot {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Vec::new(),
                    sealed: false,
                    committed: false,
                }),
                disconnected: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseSlot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, ResponseSlot>, WriteError> {
        let slot = self.lock();
        if slot.committed || slot.sealed {
            return Err(WriteError::AlreadyCommitted);
        }
        if self.inner.disconnected.load(Ordering::Acquire) {
            return Err(WriteError::ClientDisconnected);
        }
        Ok(slot)
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), WriteError> {
        self.writable()?.status = status;
        Ok(())
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), WriteError> {
        self.writable()?.headers.insert(name, value);
        Ok(())
    }

    /// Replace the body.
    pub fn set_body(&self, body: &[u8]) -> Result<(), WriteError> {
        let mut slot = self.writable()?;
        slot.body.clear();
        slot.body.extend_from_slice(body);
        Ok(())
    }

    /// Append to the body.
    pub fn write(&self, chunk: &[u8]) -> Result<(), WriteError> {
        self.writable()?.body.extend_from_slice(chunk);
        Ok(())
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn is_committed(&self) -> bool {
        self.lock().committed
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Freeze status, headers and body as they are now.
    ///
    /// Later writes fail with [`WriteError::AlreadyCommitted`]; the ingress side
    /// still performs the actual commit. Returns `true` if this call sealed it.
    pub fn seal(&self) -> bool {
        let mut slot = self.lock();
        if slot.sealed || slot.committed {
            return false;
        }
        slot.sealed = true;
        true
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::Acquire)
    }

    /// Record that the client is gone; further writes fail.
    pub fn mark_disconnected(&self) {
        self.inner.disconnected.store(true, Ordering::Release);
    }

    /// Take what has been written so far and close the handle.
    ///
    /// Returns `None` if the handle was already committed.
    pub fn commit(&self) -> Option<CommittedResponse> {
        let mut slot = self.lock();
        if slot.committed {
            return None;
        }
        slot.committed = true;
        Some(CommittedResponse {
            status: slot.status,
            headers: std::mem::take(&mut slot.headers),
            body: Bytes::from(std::mem::take(&mut slot.body)),
        })
    }

    /// Commit a body-less response with `status`, discarding partial writes.
    ///
    /// A sealed handle already holds a finished response, so that is
    /// committed instead.
    pub fn commit_provisional(&self, status: StatusCode) -> Option<CommittedResponse> {
        let mut slot = self.lock();
        if slot.committed {
            return None;
        }
        slot.committed = true;
        if slot.sealed {
            return Some(CommittedResponse {
                status: slot.status,
                headers: std::mem::take(&mut slot.headers),
                body: Bytes::from(std::mem::take(&mut slot.body)),
            });
        }
        slot.headers.clear();
        slot.body.clear();
        Some(CommittedResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// Guard that marks the handle disconnected if dropped before commit.
    ///
    /// Held by the ingress handler; an aborted handler future means the
    /// client went away.
    pub fn disconnect_guard(&self) -> DisconnectGuard {
        DisconnectGuard {
            handle: self.clone(),
        }
    }
}

impl Default for ResponseHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct DisconnectGuard {
    handle: ResponseHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.handle.is_committed() {
            self.handle.mark_disconnected();
            tracing::debug!("Client went away before the response was committed");
        }
    }
}

impl IntoResponse for CommittedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[test]
    fn test_writes_then_commit() {
        let handle = ResponseHandle::new();
        handle.set_status(StatusCode::CREATED).unwrap();
        handle.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
        handle.write(b"hello ").unwrap();
        handle.write(b"world").unwrap();

        let committed = handle.commit().unwrap();
        assert_eq!(committed.status, StatusCode::CREATED);
        assert_eq!(committed.body.as_ref(), b"hello world");
        assert_eq!(committed.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_commit_happens_once() {
        let handle = ResponseHandle::new();
        assert!(handle.commit().is_some());
        assert!(handle.commit().is_none());
        assert!(handle.commit_provisional(StatusCode::ACCEPTED).is_none());
    }

    #[test]
    fn test_write_after_commit_is_rejected() {
        let handle = ResponseHandle::new();
        handle.commit_provisional(StatusCode::ACCEPTED).unwrap();
        assert_eq!(handle.write(b"late"), Err(WriteError::AlreadyCommitted));
        assert_eq!(handle.set_status(StatusCode::OK), Err(WriteError::AlreadyCommitted));
    }

    #[test]
    fn test_provisional_commit_discards_partial_body() {
        let handle = ResponseHandle::new();
        handle.write(b"partial").unwrap();
        let committed = handle.commit_provisional(StatusCode::ACCEPTED).unwrap();
        assert_eq!(committed.status, StatusCode::ACCEPTED);
        assert!(committed.body.is_empty());
    }

    #[test]
    fn test_sealed_handle_rejects_later_writes() {
        let handle = ResponseHandle::new();
        handle.set_status(StatusCode::CREATED).unwrap();
        handle.write(b"final").unwrap();
        assert!(handle.seal());
        assert!(!handle.seal());
        assert!(!handle.is_committed());

        assert_eq!(handle.set_status(StatusCode::INTERNAL_SERVER_ERROR), Err(WriteError::AlreadyCommitted));
        assert_eq!(handle.set_body(b"rewritten"), Err(WriteError::AlreadyCommitted));

        let committed = handle.commit().unwrap();
        assert_eq!(committed.status, StatusCode::CREATED);
        assert_eq!(committed.body.as_ref(), b"final");
    }

    #[test]
    fn test_provisional_commit_keeps_sealed_response() {
        let handle = ResponseHandle::new();
        handle.write(b"done").unwrap();
        handle.seal();
        let committed = handle.commit_provisional(StatusCode::ACCEPTED).unwrap();
        assert_eq!(committed.status, StatusCode::OK);
        assert_eq!(committed.body.as_ref(), b"done");
    }

    #[test]
    fn test_dropped_guard_marks_disconnect() {
        let handle = ResponseHandle::new();
        drop(handle.disconnect_guard());
        assert!(handle.is_disconnected());
        assert_eq!(handle.write(b"x"), Err(WriteError::ClientDisconnected));
    }

    #[test]
    fn test_guard_after_commit_leaves_handle_alone() {
        let handle = ResponseHandle::new();
        let guard = handle.disconnect_guard();
        handle.commit();
        drop(guard);
        assert!(!handle.is_disconnected());
    }
}
