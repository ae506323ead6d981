//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, key expression parse)
//!     → IngressConfig (validated, immutable)
//!     → lifecycle::startup builds cache, workflows and wait policy
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → http server swaps the live TimeoutPolicy (arc-swap)
//!     → exchanges started afterwards use the new limits
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Invalid configuration is fatal at startup, ignored on reload

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CorrelationConfig, Handoff, IngressConfig, ListenerConfig, ObservabilityConfig,
    ResponseConfig, WaitConfig, WorkflowConfig,
};
