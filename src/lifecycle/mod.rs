//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Create correlation cache → Build workflows
//!     → Spawn reaper / queue consumers → Hand AppState to the HTTP server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop background tasks → Clear cache
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any configuration error is fatal at startup
//! - The cache lives exactly as long as its component
//! - Pending exchanges are dropped on stop; they do not survive restarts

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Component, StartupError};
