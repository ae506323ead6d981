//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (buffer body, build IngressMessage)
//!     → workflow.submit (service chain writes the ResponseHandle)
//!     → wait for completion or timeout
//!     → response.rs (commit exactly once)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{into_message, RequestError, X_REQUEST_ID};
pub use response::{CommittedResponse, ResponseHandle, WriteError};
pub use server::{AppState, HttpServer};
