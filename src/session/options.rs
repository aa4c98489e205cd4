//! Session timing and capacity options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_pilot::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_poll_interval(Duration::from_millis(50));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum pending requests.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default interval for polling waiters.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default lifetime of a cached remote object id.
pub const DEFAULT_NODE_CACHE_TTL: Duration = Duration::from_millis(500);

/// Default page size for path-search results.
pub const DEFAULT_SEARCH_PAGE_SIZE: usize = 100;

// ============================================================================
// SessionOptions
// ============================================================================

/// Timing and capacity settings shared by a session and everything built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time to wait for a command's response.
    pub command_timeout: Duration,

    /// Time to wait for the WebSocket handshake.
    pub connect_timeout: Duration,

    /// Pending-table cap; sends beyond it are rejected.
    pub max_pending: usize,

    /// Interval between checks in polling waiters.
    pub poll_interval: Duration,

    /// How long a resolved remote object id is reused.
    pub node_cache_ttl: Duration,

    /// Results fetched per `DOM.getSearchResults` call.
    pub search_page_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            poll_interval: DEFAULT_POLL_INTERVAL,
            node_cache_ttl: DEFAULT_NODE_CACHE_TTL,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the pending-table cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Sets the polling interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the remote object cache lifetime.
    #[inline]
    #[must_use]
    pub fn with_node_cache_ttl(mut self, ttl: Duration) -> Self {
        self.node_cache_ttl = ttl;
        self
    }

    /// Sets the search page size.
    #[inline]
    #[must_use]
    pub fn with_search_page_size(mut self, size: usize) -> Self {
        self.search_page_size = size;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a timeout, interval, or capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::config("Timeouts must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("Poll interval must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than zero"));
        }
        if self.search_page_size == 0 {
            return Err(Error::config("search_page_size must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.command_timeout, Duration::from_secs(30));
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert_eq!(options.node_cache_ttl, Duration::from_millis(500));
        assert_eq!(options.max_pending, 1024);
        assert_eq!(options.search_page_size, 100);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = SessionOptions::new()
            .with_command_timeout(Duration::from_secs(5))
            .with_max_pending(8)
            .with_node_cache_ttl(Duration::ZERO);

        assert_eq!(options.command_timeout, Duration::from_secs(5));
        assert_eq!(options.max_pending, 8);
        assert!(options.node_cache_ttl.is_zero());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let options = SessionOptions::new().with_poll_interval(Duration::ZERO);
        assert!(matches!(options.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let options = SessionOptions::new().with_max_pending(0);
        assert!(options.validate().is_err());
    }
}
