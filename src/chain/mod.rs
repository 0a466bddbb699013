//! Processing-chain contract
//!
//! This module defines the seam between the dispatch handler and the
//! user-defined processing graph. The handler treats the chain as a black
//! box: it builds a [`QueryContext`] around the decoded request, invokes
//! the entry [`ChainNode`] exactly once, and reads back the terminal
//! status and response slot. Chain node implementations (matchers,
//! forwarders, cache plugins) live outside this crate.
//!
//! # Query lifecycle
//!
//! ```text
//! decode ──> QueryContext { status: Pending, response: None }
//!                |
//!                v
//!          entry.exec(&mut qctx)
//!                |
//!     ┌──────────┼──────────────┐
//!     v          v              v
//! Responded  ServerFailed   Err(DnsError)
//! (response  (SERVFAIL      (SERVFAIL
//!  written)   written)       written)
//! ```
//!
//! A context is owned by a single query for its whole lifetime and is
//! never observed by two concurrent chain executions.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use hickory_proto::op::Message;
use serde::{Deserialize, Serialize};

use crate::error::DnsResult;

/// Monotonic id source for [`QueryContext`]; ids tie log lines from
/// different stages of one query together.
static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Transport a query arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// Plain UDP datagram
    #[default]
    Udp,
    /// TCP stream with two-byte length framing
    Tcp,
    /// DNS over TLS
    #[serde(rename = "dot")]
    Tls,
    /// DNS over HTTPS
    #[serde(rename = "doh")]
    Https,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "dot",
            Self::Https => "doh",
        };
        f.write_str(s)
    }
}

/// Transport-supplied metadata attached to a query
///
/// May be absent: a transport that has nothing useful to report passes
/// `None` and the chain sees no metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMeta {
    /// Client address the query arrived from
    pub client: SocketAddr,
    /// Transport the query arrived over
    pub protocol: TransportProtocol,
}

impl RequestMeta {
    /// Create metadata for a query
    #[must_use]
    pub fn new(client: SocketAddr, protocol: TransportProtocol) -> Self {
        Self { client, protocol }
    }
}

/// Terminal status of a chain execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextStatus {
    /// No node has produced a verdict yet
    #[default]
    Pending,
    /// A node placed a response in the context
    Responded,
    /// A node decided the query cannot be served
    ServerFailed,
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::ServerFailed => "server_failed",
        };
        f.write_str(s)
    }
}

/// Per-query scratch area
///
/// Owns the decoded request, the transport metadata, the response slot,
/// and the terminal status. Created at decode time, dropped when the
/// handler returns.
#[derive(Debug)]
pub struct QueryContext {
    /// Unique id for log correlation
    id: u64,
    /// The decoded request message
    request: Message,
    /// Transport metadata, if the transport supplied any
    meta: Option<RequestMeta>,
    /// Terminal status set by chain nodes
    status: ContextStatus,
    /// Response slot populated by chain nodes
    response: Option<Message>,
    /// When the context was created
    start: Instant,
}

impl QueryContext {
    /// Wrap a decoded request and its metadata
    #[must_use]
    pub fn new(request: Message, meta: Option<RequestMeta>) -> Self {
        Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            request,
            meta,
            status: ContextStatus::Pending,
            response: None,
            start: Instant::now(),
        }
    }

    /// Unique id of this query
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The decoded request
    #[must_use]
    pub fn request(&self) -> &Message {
        &self.request
    }

    /// Transport metadata, if any
    #[must_use]
    pub fn meta(&self) -> Option<&RequestMeta> {
        self.meta.as_ref()
    }

    /// Terminal status
    #[must_use]
    pub fn status(&self) -> ContextStatus {
        self.status
    }

    /// The response currently in the slot, if any
    #[must_use]
    pub fn response(&self) -> Option<&Message> {
        self.response.as_ref()
    }

    /// Place a response and mark the context responded
    pub fn set_response(&mut self, response: Message) {
        self.response = Some(response);
        self.status = ContextStatus::Responded;
    }

    /// Mark the context as failed
    ///
    /// The handler will answer with SERVFAIL regardless of the response
    /// slot.
    pub fn set_server_failed(&mut self) {
        self.status = ContextStatus::ServerFailed;
    }

    /// Take the response out of the slot
    #[must_use]
    pub fn take_response(&mut self) -> Option<Message> {
        self.response.take()
    }

    /// Time elapsed since the context was created
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl fmt::Display for QueryContext {
    /// Log identity: id, first question, and client when known
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query #{}", self.id)?;
        if let Some(q) = self.request.queries().first() {
            write!(f, " {} {}", q.name(), q.query_type())?;
        }
        if let Some(meta) = &self.meta {
            write!(f, " from {}/{}", meta.client, meta.protocol)?;
        }
        Ok(())
    }
}

/// Entry point of a processing graph
///
/// The handler holds an `Arc<dyn ChainNode>` and invokes it once per
/// query under the composed deadline; the execution future is dropped if
/// the deadline fires first, so implementations must be cancel-safe at
/// await points. Returning an error is equivalent to setting
/// [`ContextStatus::ServerFailed`].
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Execute the graph against `qctx`, populating its status and
    /// response slot.
    async fn exec(&self, qctx: &mut QueryContext) -> DnsResult<()>;
}
