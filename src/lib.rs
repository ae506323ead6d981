//! Ingress relay library.
//!
//! Holds an HTTP exchange open while a workflow processes the request,
//! possibly on another thread or in a second workflow reached through a
//! queue, and answers the client when the workflow signals completion or
//! the wait policy runs out.
//!
//! # Module Map
//! ```text
//! http         listener, request intake, committable response handle
//! exchange     completion monitor, wait policy, wait loop, signalling
//! correlation  TTL cache and REQUEST/RESPONSE interceptors
//! workflow     message, service chain, executors, queue handoff
//! config       TOML schema, validation, hot reload
//! lifecycle    component start/stop, shutdown, OS signals
//! admin        authenticated diagnostics routes
//! ```

pub mod admin;
pub mod config;
pub mod correlation;
pub mod exchange;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod workflow;

pub use config::schema::IngressConfig;
pub use http::HttpServer;
pub use lifecycle::{Component, Shutdown};
