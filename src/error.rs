//! Error types for the dispatch core
//!
//! This module defines the error hierarchy shared by the codec, the chain
//! seam, and the dispatch handler.
//!
//! # Error Categories
//!
//! - **Parse/Serialize errors**: DNS message decoding/encoding failures
//! - **Network errors**: response-write I/O failures
//! - **Timeout errors**: the per-query deadline fired at a suspension point
//! - **Upstream errors**: failures reported by forwarding chain nodes
//! - **Chain errors**: any other failure surfaced by a chain node
//!
//! The handler never propagates these to the transport: every error path
//! reduces to either a SERVFAIL reply or a silent drop. Allocator contract
//! violations are deliberately *not* represented here — returning a foreign
//! buffer panics, because recovering would mask free-list corruption.
//!
//! # Example
//!
//! ```
//! use dns_dispatcher::DnsError;
//!
//! let err = DnsError::timeout("chain execution", std::time::Duration::from_secs(5));
//! assert!(err.is_recoverable());
//! assert!(err.to_string().contains("timed out"));
//! ```

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Error types for query processing
///
/// # Recoverability
///
/// Errors are classified as either recoverable or non-recoverable:
/// - **Recoverable**: transient issues that may succeed on retry
///   (timeouts, network errors, upstream failures)
/// - **Non-recoverable**: malformed input or internal inconsistencies
#[derive(Debug, Error)]
pub enum DnsError {
    /// DNS message parsing failed
    ///
    /// A received byte sequence could not be decoded as a DNS message.
    #[error("Failed to parse DNS message: {reason}")]
    ParseError {
        /// Description of what went wrong during parsing
        reason: String,
    },

    /// DNS message serialization failed
    ///
    /// A response message could not be encoded for transmission. This
    /// indicates an internal inconsistency, not a client-triggerable error.
    #[error("Failed to serialize DNS message: {reason}")]
    SerializeError {
        /// Description of what went wrong during serialization
        reason: String,
    },

    /// Network I/O error
    ///
    /// Wraps low-level errors from the response writer.
    #[error("Network error: {reason}")]
    NetworkError {
        /// Description of the network failure
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// An operation did not complete within the per-query deadline
    #[error("Operation timed out after {timeout:?}: {context}")]
    TimeoutError {
        /// Description of what timed out
        context: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// Upstream server error
    ///
    /// A forwarding chain node failed to obtain an answer from its
    /// upstream server.
    #[error("Upstream server error ({upstream}): {reason}")]
    UpstreamError {
        /// The upstream server address
        upstream: String,
        /// Description of the upstream failure
        reason: String,
    },

    /// Chain execution error
    ///
    /// Any other failure surfaced by a chain node. From the handler's
    /// point of view this is equivalent to a `ServerFailed` terminal
    /// status.
    #[error("Chain execution error: {reason}")]
    ChainError {
        /// Description of the chain failure
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    ConfigError {
        /// Description of the configuration error
        reason: String,
        /// The configuration field that is invalid, if applicable
        field: Option<String>,
    },
}

impl DnsError {
    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialize(reason: impl Into<String>) -> Self {
        Self::SerializeError {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a network error from an I/O error
    pub fn network_io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, timeout: Duration) -> Self {
        Self::TimeoutError {
            context: context.into(),
            timeout,
        }
    }

    /// Create an upstream error
    pub fn upstream(upstream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamError {
            upstream: upstream.into(),
            reason: reason.into(),
        }
    }

    /// Create a chain execution error
    pub fn chain(reason: impl Into<String>) -> Self {
        Self::ChainError {
            reason: reason.into(),
        }
    }

    /// Create a configuration error for a specific field
    pub fn config_field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    /// Whether this error is transient and may succeed on retry
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::TimeoutError { .. } | Self::UpstreamError { .. } => {
                true
            }
            Self::ParseError { .. }
            | Self::SerializeError { .. }
            | Self::ChainError { .. }
            | Self::ConfigError { .. } => false,
        }
    }

}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        Self::NetworkError {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result type alias for DNS operations
pub type DnsResult<T> = Result<T, DnsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DnsError::parse("truncated header");
        assert!(err.to_string().contains("truncated header"));

        let err = DnsError::upstream("8.8.8.8:53", "connection refused");
        assert!(err.to_string().contains("8.8.8.8:53"));
    }

    #[test]
    fn test_recoverability() {
        assert!(DnsError::timeout("exec", Duration::from_secs(5)).is_recoverable());
        assert!(DnsError::network("socket closed").is_recoverable());
        assert!(!DnsError::parse("garbage").is_recoverable());
        assert!(!DnsError::chain("node misconfigured").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err = DnsError::from(io_err);
        assert!(matches!(err, DnsError::NetworkError { source: Some(_), .. }));
    }
}
