//! dns-dispatcher: request-processing core for a forwarding DNS front-end
//!
//! This crate turns raw DNS query bytes into written responses under
//! strict per-query deadlines and system-wide concurrency caps. It owns
//! three subsystems: the per-query dispatch handler, the FIFO admission
//! limiter, and the sharded byte-buffer allocator that backs the encode
//! path. Sockets, chain-node implementations, caching, and recursion
//! live in the outer program and are consumed through the seams in
//! [`chain`] and [`server`].
//!
//! # Architecture
//!
//! ```text
//! transport -> DnsHandler::serve -> deadline join -> limiter admission
//!           -> unpack -> chain exec -> pack into pooled buffer
//!           -> ResponseWriter -> buffer + slots released
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use dns_dispatcher::chain::ChainNode;
//! use dns_dispatcher::config::HandlerConfig;
//! use dns_dispatcher::server::DnsHandler;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example(entry: Arc<dyn ChainNode>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HandlerConfig::new()
//!     .with_query_timeout(Duration::from_secs(3))
//!     .with_concurrent_limit(1024);
//! config.validate()?;
//!
//! let handler = Arc::new(DnsHandler::with_config(entry, &config));
//! // Each transport reader calls handler.serve(...) per query.
//! # let _ = handler;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`chain`]: processing-chain contract ([`QueryContext`], [`ChainNode`])
//! - [`codec`]: DNS wire codec seam and SERVFAIL construction
//! - [`config`]: parsed tunables for the handler
//! - [`error`]: error taxonomy
//! - [`io`]: sharded buffer allocator
//! - [`server`]: dispatch handler and admission limiter
//!
//! [`QueryContext`]: chain::QueryContext
//! [`ChainNode`]: chain::ChainNode

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod server;

// Re-export commonly used types at the crate root
pub use chain::{ChainNode, ContextStatus, QueryContext, RequestMeta, TransportProtocol};
pub use config::HandlerConfig;
pub use error::{DnsError, DnsResult};
pub use io::{Allocator, PooledBuf};
pub use server::{ConcurrentLimiter, DnsHandler, ResponseWriter};
