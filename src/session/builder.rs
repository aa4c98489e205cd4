//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and connecting a [`Session`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cdp_pilot::Session;
//!
//! # async fn example() -> cdp_pilot::Result<()> {
//! let session = Session::builder()
//!     .url("ws://127.0.0.1:9222/devtools/browser/abc")
//!     .command_timeout(Duration::from_secs(10))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::Session;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SessionBuilder {
    /// Debugging endpoint URL.
    url: Option<String>,
    /// Timing and capacity options.
    options: SessionOptions,
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new builder with default options and no URL.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket debugging URL.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` endpoint (e.g. `webSocketDebuggerUrl`)
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Sets the polling interval used by waiters.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Connects to the endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or not `ws`/`wss`
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::ConnectionTimeout`] / [`Error::WebSocket`] if the handshake fails
    pub async fn connect(self) -> Result<Session> {
        let url = self.validate_url()?;
        self.options.validate()?;

        Session::connect_with(url.as_str(), self.options).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    /// Validates the endpoint URL.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint URL is required. Use .url() to set it.\n\
                 Example: Session::builder().url(\"ws://127.0.0.1:9222/devtools/browser/<id>\")",
            )
        })?;

        let url = Url::parse(raw)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "Unsupported endpoint scheme '{other}', expected ws or wss"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = SessionBuilder::new();
        assert!(builder.url.is_none());
        assert_eq!(builder.options, SessionOptions::default());
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let result = SessionBuilder::new().validate_url();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_http_url_rejected() {
        let result = SessionBuilder::new()
            .url("http://127.0.0.1:9222/json")
            .validate_url();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_garbage_url_is_parse_error() {
        let result = SessionBuilder::new().url("not a url").validate_url();
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[test]
    fn test_ws_url_accepted() {
        let url = SessionBuilder::new()
            .url("ws://127.0.0.1:9222/devtools/browser/abc")
            .validate_url()
            .expect("valid");
        assert_eq!(url.port(), Some(9222));
    }

    #[test]
    fn test_timing_setters() {
        let builder = SessionBuilder::new()
            .command_timeout(Duration::from_secs(3))
            .poll_interval(Duration::from_millis(20));
        assert_eq!(builder.options.command_timeout, Duration::from_secs(3));
        assert_eq!(builder.options.poll_interval, Duration::from_millis(20));
    }
}
