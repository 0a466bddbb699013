//! Query dispatch core
//!
//! This module contains the per-query orchestrator and its admission
//! gate.
//!
//! # Architecture
//!
//! ```text
//! transport reader tasks (UDP / TCP / DoT / DoH)
//!     |
//!     v
//! +--------------------+
//! |  ConcurrentLimiter | -- queue full --> shed silently
//! +--------------------+
//!     |
//!     v
//! +--------------------+
//! |  DnsHandler        | -- decode, chain exec, SERVFAIL policy
//! +--------------------+
//!     |
//!     v
//! ResponseWriter (implemented by the transport)
//! ```
//!
//! # Components
//!
//! - [`handler`]: per-query state machine and failure policy
//! - [`limiter`]: two-level FIFO admission gate
//!
//! # Example
//!
//! ```no_run
//! use dns_dispatcher::server::DnsHandler;
//! use dns_dispatcher::chain::ChainNode;
//! use std::sync::Arc;
//!
//! # fn example(entry: Arc<dyn ChainNode>) {
//! let handler = Arc::new(
//!     DnsHandler::new(entry)
//!         .with_concurrent_limit(1024)
//!         .with_recursion_available(true),
//! );
//! // Hand `handler` to each transport reader; call
//! // `handler.serve(deadline, bytes, &mut writer, meta)` per query.
//! # let _ = handler;
//! # }
//! ```

pub mod handler;
pub mod limiter;

pub use handler::{
    DnsHandler, HandlerStats, HandlerStatsSnapshot, ResponseWriter, DEFAULT_QUERY_TIMEOUT,
};
pub use limiter::{ConcurrentLimiter, RunSlot, WaitSlot, DEFAULT_WAIT_RATIO};
