//! Handler configuration
//!
//! Tunables for the dispatch core. The outer program parses its own
//! config format and hands the numbers over already validated against
//! this struct; the crate owns no CLI, env-var, or file surface.
//!
//! # Example
//!
//! ```
//! use dns_dispatcher::config::HandlerConfig;
//! use std::time::Duration;
//!
//! let config = HandlerConfig::new()
//!     .with_query_timeout(Duration::from_secs(3))
//!     .with_concurrent_limit(512)
//!     .with_recursion_available(true);
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DnsError, DnsResult};
use crate::io::DEFAULT_MAX_POOLED_EXP;

/// Configuration for [`DnsHandler`](crate::server::DnsHandler)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Per-query deadline in milliseconds, applied as an upper bound on
    /// any deadline the transport already imposed
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Maximum concurrent chain executions; 0 disables limiting.
    ///
    /// When set, up to 8x this many queries may queue for admission;
    /// arrivals beyond that are shed silently.
    #[serde(default)]
    pub concurrent_limit: usize,

    /// Set the RA flag on every outgoing response
    #[serde(default)]
    pub recursion_available: bool,

    /// Maximum size-class exponent of the buffer allocator (pooled
    /// capacities run 1..2^K bytes)
    #[serde(default = "default_max_pooled_exp")]
    pub max_pooled_exp: u32,
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_max_pooled_exp() -> u32 {
    DEFAULT_MAX_POOLED_EXP
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            concurrent_limit: 0,
            recursion_available: false,
            max_pooled_exp: default_max_pooled_exp(),
        }
    }
}

impl HandlerConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-query deadline
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Set the concurrency limit (0 disables limiting)
    #[must_use]
    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = limit;
        self
    }

    /// Set the RA flag behaviour
    #[must_use]
    pub fn with_recursion_available(mut self, available: bool) -> Self {
        self.recursion_available = available;
        self
    }

    /// Set the allocator's maximum size-class exponent
    #[must_use]
    pub fn with_max_pooled_exp(mut self, exp: u32) -> Self {
        self.max_pooled_exp = exp;
        self
    }

    /// The per-query deadline as a `Duration`
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::ConfigError`] naming the offending field.
    pub fn validate(&self) -> DnsResult<()> {
        if self.query_timeout_ms == 0 {
            return Err(DnsError::config_field(
                "query timeout must be positive",
                "query_timeout_ms",
            ));
        }
        if self.max_pooled_exp >= usize::BITS {
            return Err(DnsError::config_field(
                format!("size-class exponent must be below {}", usize::BITS),
                "max_pooled_exp",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.concurrent_limit, 0);
        assert!(!config.recursion_available);
        assert_eq!(config.max_pooled_exp, DEFAULT_MAX_POOLED_EXP);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = HandlerConfig::new()
            .with_query_timeout(Duration::from_millis(250))
            .with_concurrent_limit(64)
            .with_recursion_available(true)
            .with_max_pooled_exp(12);
        assert_eq!(config.query_timeout_ms, 250);
        assert_eq!(config.concurrent_limit, 64);
        assert!(config.recursion_available);
        assert_eq!(config.max_pooled_exp, 12);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: HandlerConfig =
            serde_json::from_str(r#"{"concurrent_limit": 128, "recursion_available": true}"#)
                .unwrap();
        assert_eq!(config.concurrent_limit, 128);
        assert!(config.recursion_available);
        assert_eq!(config.query_timeout_ms, 5000);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = HandlerConfig {
            query_timeout_ms: 0,
            ..HandlerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("query timeout"));
    }

    #[test]
    fn test_validate_rejects_huge_exponent() {
        let config = HandlerConfig::default().with_max_pooled_exp(usize::BITS);
        assert!(config.validate().is_err());
    }
}
