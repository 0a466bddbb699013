//! Query Dispatch Handler
//!
//! This module provides the per-query state machine: deadline
//! composition, admission through the concurrency limiter,
//! decode/execute/encode, and failure-to-SERVFAIL translation.
//!
//! # Architecture
//!
//! ```text
//! transport bytes
//!     |
//!     v
//! deadline join (inherited deadline upper-bounded by query_timeout)
//!     |
//!     v
//! limiter admission ── queue full ──> shed (silent)
//!     |                ── deadline ──> abandon (silent)
//!     v
//! unpack (pooled scratch) ── malformed ──> warn + silent drop
//!     |
//!     v
//! chain execution under deadline
//!     |
//!     v
//! response selection ── error / server_failed ──> SERVFAIL reply
//!     |                ── no response ──> chain-defined drop
//!     v
//! RA post-processing -> pack into pooled buffer -> write -> release
//! ```
//!
//! # Failure policy
//!
//! The handler never propagates errors to the transport. Malformed
//! queries, overload, and deadline expiry before execution are answered
//! with silence (clients retry on timeout); a chain that tried and failed
//! is answered with SERVFAIL.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::limiter::ConcurrentLimiter;
use crate::chain::{ChainNode, ContextStatus, QueryContext, RequestMeta};
use crate::codec;
use crate::config::HandlerConfig;
use crate::error::DnsError;
use crate::io::Allocator;

/// Default per-query deadline
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink the handler writes encoded responses to
///
/// The transport implements this per query (UDP reply address, TCP
/// stream, DoH response body). A short write is treated as an error by
/// the handler; framing is the transport's job.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Write an encoded DNS message back to the client.
    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Statistics for the dispatch handler
#[derive(Debug, Default)]
pub struct HandlerStats {
    /// Total queries received
    queries_received: AtomicU64,
    /// Queries shed because the wait queue was saturated
    shed: AtomicU64,
    /// Queries abandoned by their deadline while queued for admission
    abandoned: AtomicU64,
    /// Malformed queries dropped at decode
    decode_errors: AtomicU64,
    /// SERVFAIL replies generated
    servfail_responses: AtomicU64,
    /// Responses successfully written
    responses_written: AtomicU64,
    /// Response writes that failed or were short
    write_errors: AtomicU64,
}

impl HandlerStats {
    /// Get queries received
    #[must_use]
    pub fn queries_received(&self) -> u64 {
        self.queries_received.load(Ordering::Relaxed)
    }

    /// Get shed queries
    #[must_use]
    pub fn shed(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }

    /// Get abandoned admissions
    #[must_use]
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Get decode errors
    #[must_use]
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Get SERVFAIL replies generated
    #[must_use]
    pub fn servfail_responses(&self) -> u64 {
        self.servfail_responses.load(Ordering::Relaxed)
    }

    /// Get responses written
    #[must_use]
    pub fn responses_written(&self) -> u64 {
        self.responses_written.load(Ordering::Relaxed)
    }

    /// Get write errors
    #[must_use]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all stats
    #[must_use]
    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            queries_received: self.queries_received(),
            shed: self.shed(),
            abandoned: self.abandoned(),
            decode_errors: self.decode_errors(),
            servfail_responses: self.servfail_responses(),
            responses_written: self.responses_written(),
            write_errors: self.write_errors(),
        }
    }
}

/// Snapshot of handler statistics
#[derive(Debug, Clone, Copy)]
pub struct HandlerStatsSnapshot {
    /// Queries received
    pub queries_received: u64,
    /// Shed queries
    pub shed: u64,
    /// Abandoned admissions
    pub abandoned: u64,
    /// Decode errors
    pub decode_errors: u64,
    /// SERVFAIL replies
    pub servfail_responses: u64,
    /// Responses written
    pub responses_written: u64,
    /// Write errors
    pub write_errors: u64,
}

/// Per-query orchestrator
///
/// Safe to invoke concurrently from any number of transport readers
/// after construction; configuration is read-only once the first query
/// arrives and the optional limiter is built behind a once-latch.
pub struct DnsHandler {
    /// Head of the processing chain evaluated for every query
    entry: Arc<dyn ChainNode>,
    /// Upper bound on any inherited deadline
    query_timeout: Duration,
    /// Run-slot capacity; 0 disables the limiter
    concurrent_limit: usize,
    /// Set the RA flag on every outgoing response
    recursion_available: bool,
    /// Buffer pool for the encode path
    allocator: Arc<Allocator>,
    /// Lazily constructed admission gate
    limiter: OnceLock<Option<ConcurrentLimiter>>,
    /// Statistics
    stats: HandlerStats,
}

impl DnsHandler {
    /// Create a handler with default configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dns_dispatcher::server::DnsHandler;
    /// use dns_dispatcher::chain::ChainNode;
    /// use std::sync::Arc;
    ///
    /// # fn example(entry: Arc<dyn ChainNode>) {
    /// let handler = DnsHandler::new(entry)
    ///     .with_concurrent_limit(1024)
    ///     .with_recursion_available(true);
    /// # let _ = handler;
    /// # }
    /// ```
    #[must_use]
    pub fn new(entry: Arc<dyn ChainNode>) -> Self {
        Self {
            entry,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            concurrent_limit: 0,
            recursion_available: false,
            allocator: Arc::new(Allocator::default()),
            limiter: OnceLock::new(),
            stats: HandlerStats::default(),
        }
    }

    /// Create a handler from a parsed configuration
    #[must_use]
    pub fn with_config(entry: Arc<dyn ChainNode>, config: &HandlerConfig) -> Self {
        Self {
            entry,
            query_timeout: config.query_timeout(),
            concurrent_limit: config.concurrent_limit,
            recursion_available: config.recursion_available,
            allocator: Arc::new(Allocator::new(config.max_pooled_exp)),
            limiter: OnceLock::new(),
            stats: HandlerStats::default(),
        }
    }

    /// Set the per-query deadline
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the concurrency limit (0 disables limiting)
    #[must_use]
    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = limit;
        self
    }

    /// Set the RA flag on every outgoing response
    #[must_use]
    pub fn with_recursion_available(mut self, available: bool) -> Self {
        self.recursion_available = available;
        self
    }

    /// Get handler statistics
    #[must_use]
    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    /// The buffer allocator backing the encode path
    #[must_use]
    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    /// The admission limiter, if one has been constructed
    #[must_use]
    pub fn limiter(&self) -> Option<&ConcurrentLimiter> {
        self.limiter.get().and_then(Option::as_ref)
    }

    /// Serve one query.
    ///
    /// Decodes `req`, evaluates the processing chain against it under the
    /// composed deadline, and writes the selected response to `w`. All
    /// failures reduce to either a SERVFAIL reply or a silent drop; the
    /// transport never sees an error.
    ///
    /// `deadline` is the transport's deadline for this query, if it has
    /// one; the handler tightens it to at most `query_timeout` from now.
    /// A transport that wants to cancel outright drops the returned
    /// future.
    pub async fn serve(
        &self,
        deadline: Option<Instant>,
        req: &[u8],
        w: &mut dyn ResponseWriter,
        meta: Option<RequestMeta>,
    ) {
        self.stats.queries_received.fetch_add(1, Ordering::Relaxed);

        let limiter = self.limiter.get_or_init(|| {
            (self.concurrent_limit > 0).then(|| ConcurrentLimiter::new(self.concurrent_limit))
        });

        // Bound the query even if the transport imposed no deadline
        let own = Instant::now() + self.query_timeout;
        let deadline = match deadline {
            Some(inherited) if inherited < own => inherited,
            _ => own,
        };

        let _run_slot = if let Some(limiter) = limiter.as_ref() {
            let Some(wait_slot) = limiter.try_wait() else {
                self.stats.shed.fetch_add(1, Ordering::Relaxed);
                return;
            };
            match timeout_at(deadline, limiter.run()).await {
                Ok(slot) => {
                    // Queued no longer: the wait slot retires as the run
                    // slot takes over
                    drop(wait_slot);
                    Some(slot)
                }
                Err(_elapsed) => {
                    self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        } else {
            None
        };

        let request = match codec::unpack(req) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(meta = ?meta, data = ?req, error = %e, "failed to unpack request message");
                return;
            }
        };

        let mut qctx = QueryContext::new(request, meta);
        let result = match timeout_at(deadline, self.entry.exec(&mut qctx)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DnsError::timeout("chain execution", self.query_timeout)),
        };

        let reply = match &result {
            Err(e) => {
                warn!(query = %qctx, error = %e, "entry returned an error");
                Some(codec::servfail_reply(qctx.request()))
            }
            Ok(()) => {
                debug!(query = %qctx, status = %qctx.status(), "entry returned");
                if qctx.status() == ContextStatus::ServerFailed {
                    Some(codec::servfail_reply(qctx.request()))
                } else {
                    qctx.take_response()
                }
            }
        };

        // No reply and no failure is a chain-defined drop
        let Some(mut reply) = reply else {
            return;
        };
        if reply.header().response_code() == ResponseCode::ServFail {
            self.stats.servfail_responses.fetch_add(1, Ordering::Relaxed);
        }

        if self.recursion_available {
            reply.set_recursion_available(true);
        }

        let encoded = match codec::pack_buffer(&reply, &self.allocator) {
            Ok(buf) => buf,
            Err(e) => {
                warn!(query = %qctx, error = %e, "failed to pack response message");
                return;
            }
        };

        match w.write(&encoded).await {
            Ok(n) if n == encoded.len() => {
                self.stats.responses_written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(n) => {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!(query = %qctx, written = n, expected = encoded.len(), "short response write");
            }
            Err(e) => {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!(query = %qctx, error = %e, "failed to write response");
            }
        }
        // `encoded` drops here and its buffer returns to the pool
    }
}
