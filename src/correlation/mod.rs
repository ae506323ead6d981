//! Cross-workflow correlation subsystem.
//!
//! # Data Flow
//! ```text
//! REQUEST workflow (received the HTTP request)
//!     → interceptor.rs resolves key.rs expression
//!     → cache.rs store(key, {monitor, response})
//!     → message copy crosses a queue (handles stay behind)
//!
//! RESPONSE workflow (produces the reply)
//!     → interceptor.rs resolves the same key
//!     → cache.rs take(key)   (at most once; miss is normal)
//!     → handles attached to the reply message
//!     → workflow end signals completion, waking the ingress side
//! ```
//!
//! # Design Decisions
//! - Only for genuine cross-workflow handoff; in-process chains pass handles
//!   on the message directly
//! - Best effort, not exactly-once: an entry may expire before anyone claims it
//! - In-memory only; pending exchanges do not survive a restart

pub mod cache;
pub mod interceptor;
pub mod key;

pub use cache::{CorrelationCache, PendingExchange, StoreError};
pub use interceptor::{CorrelationInterceptor, CorrelationMode};
pub use key::{KeyExpression, DEFAULT_KEY_EXPRESSION};
