//! RPC/event session over one debugging socket.
//!
//! A [`Session`] owns the transport, the pending-request table (inside the
//! [`Connection`]) and the subscriber maps ([`EventRegistry`]). Cloning a
//! session is cheap and shares everything.
//!
//! # Flatten-mode multiplexing
//!
//! [`Session::child`] returns a view bound to a protocol session id. The view
//! stamps `sessionId` on every command and routes `on`/`off` to the scoped
//! subscriber map, so one socket drives any number of targets. Children share
//! the parent's transport: closing any of them closes all of them.
//!
//! # Example
//!
//! ```no_run
//! use cdp_pilot::Session;
//!
//! # async fn example() -> cdp_pilot::Result<()> {
//! let browser = Session::connect("ws://127.0.0.1:9222/devtools/browser/abc").await?;
//!
//! let targets = browser.targets().await?;
//! if let Some(page) = targets.iter().find(|t| t.target_type == "page") {
//!     let tab = browser.attach(&page.target_id).await?;
//!     tab.send("Page.enable", serde_json::json!({})).await?;
//! }
//!
//! browser.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent connection builder |
//! | `options` | Timing and capacity options |
//! | `registry` | Global and scoped subscriber maps |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent connection builder.
pub mod builder;

/// Timing and capacity options.
pub mod options;

/// Event subscriber registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use options::SessionOptions;
pub use registry::{EventHandler, EventRegistry};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, SessionId, TargetId};
use crate::protocol::{Command, Event, TargetCommand};
use crate::transport::{Connection, EventSink};

// ============================================================================
// TargetInfo
// ============================================================================

/// One entry of `Target.getTargets`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    /// Target id.
    #[serde(rename = "targetId")]
    pub target_id: TargetId,

    /// `page`, `iframe`, `worker`, `browser`, ...
    #[serde(rename = "type")]
    pub target_type: String,

    /// Document title.
    #[serde(default)]
    pub title: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// Whether some client is attached.
    #[serde(default)]
    pub attached: bool,
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a session and all its children.
pub(crate) struct SessionInner {
    /// Socket and pending table.
    connection: Connection,
    /// Subscriber maps (also the connection's event sink).
    registry: Arc<EventRegistry>,
    /// Timing and capacity options.
    options: SessionOptions,
}

// ============================================================================
// Session
// ============================================================================

/// Handle to a debugging connection, optionally bound to one target.
#[derive(Clone)]
pub struct Session {
    /// Shared inner state.
    pub(crate) inner: Arc<SessionInner>,
    /// Flatten-mode session id stamped on outgoing commands.
    scope: Option<SessionId>,
}

/// Non-owning session handle for use inside event handlers.
///
/// Handlers stored in the registry must not own a [`Session`], or the
/// connection would keep itself alive.
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<SessionInner>,
    scope: Option<SessionId>,
}

impl WeakSession {
    /// A handle that never upgrades.
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self {
            inner: Weak::new(),
            scope: None,
        }
    }

    /// Upgrades to a full handle if the connection is still referenced.
    #[must_use]
    pub fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session {
            inner,
            scope: self.scope.clone(),
        })
    }
}

// ============================================================================
// Session - Display
// ============================================================================

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("scope", &self.scope)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Constructors
// ============================================================================

impl Session {
    /// Creates a builder for configuring a connection.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Connects to a `ws://` debugging endpoint with default options.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::connect`].
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        Self::builder().url(url).connect().await
    }

    /// Connects with explicit options; the URL is assumed validated.
    pub(crate) async fn connect_with(url: &str, options: SessionOptions) -> Result<Self> {
        let registry = Arc::new(EventRegistry::new());
        let sink: Arc<dyn EventSink> = Arc::clone(&registry) as Arc<dyn EventSink>;
        let connection =
            Connection::connect(url, sink, options.max_pending, options.connect_timeout).await?;

        Ok(Self::from_parts(connection, registry, options))
    }

    /// Wraps an already established WebSocket stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>, options: SessionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let registry = Arc::new(EventRegistry::new());
        let sink: Arc<dyn EventSink> = Arc::clone(&registry) as Arc<dyn EventSink>;
        let connection = Connection::new(ws_stream, sink, options.max_pending);

        Self::from_parts(connection, registry, options)
    }

    fn from_parts(
        connection: Connection,
        registry: Arc<EventRegistry>,
        options: SessionOptions,
    ) -> Self {
        debug!("Session created");
        Self {
            inner: Arc::new(SessionInner {
                connection,
                registry,
                options,
            }),
            scope: None,
        }
    }

    /// Returns a view bound to a flatten-mode session id.
    ///
    /// The view shares this session's transport and pending table.
    #[must_use]
    pub fn child(&self, session_id: impl Into<SessionId>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scope: Some(session_id.into()),
        }
    }

    /// Returns the connection-level session (no scope).
    #[must_use]
    pub fn root(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scope: None,
        }
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
            scope: self.scope.clone(),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the flatten-mode session id, if this is a child view.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.scope.as_ref()
    }

    /// Returns the options this session was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.connection.pending_count()
    }

    /// Returns `true` once the transport has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.connection.is_closed()
    }

    /// Returns the subscriber registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.inner.registry
    }
}

// ============================================================================
// Session - Commands
// ============================================================================

impl Session {
    /// Sends a raw command with the default timeout.
    ///
    /// Resolves with the response's `result` (`Null` when absent).
    ///
    /// # Errors
    ///
    /// - [`Error::CommandFailed`] if the browser answers with an `error`
    /// - [`Error::ConnectionClosed`] if the transport closes first
    /// - [`Error::RequestTimeout`] if no response arrives in time
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.inner.options.command_timeout)
            .await
    }

    /// Sends a raw command with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        self.inner
            .connection
            .send(method, params, self.scope.clone(), request_timeout)
            .await
    }

    /// Sends a typed command.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        let (method, params) = command.into_parts()?;
        self.send(&method, params).await
    }

    /// Lists targets known to the browser.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the result has no `targetInfos`.
    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self
            .send_command(Command::Target(TargetCommand::GetTargets))
            .await?;

        let infos = result
            .get("targetInfos")
            .cloned()
            .ok_or_else(|| Error::protocol("Target.getTargets returned no targetInfos"))?;

        Ok(serde_json::from_value(infos)?)
    }

    /// Attaches to a target in flatten mode and returns the child view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the browser returns no session id.
    pub async fn attach(&self, target_id: &TargetId) -> Result<Self> {
        let result = self
            .root()
            .send_command(Command::Target(TargetCommand::AttachToTarget {
                target_id: target_id.clone(),
                flatten: true,
            }))
            .await?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("Target.attachToTarget returned no sessionId"))?;

        debug!(%target_id, session_id, "Attached to target");
        Ok(self.child(session_id))
    }

    /// Detaches this child view and drops its scoped handlers.
    ///
    /// No-op on a root session.
    ///
    /// # Errors
    ///
    /// Propagates the `Target.detachFromTarget` failure.
    pub async fn detach(&self) -> Result<()> {
        let Some(session_id) = self.scope.clone() else {
            return Ok(());
        };

        let result = self
            .root()
            .send_command(Command::Target(TargetCommand::DetachFromTarget {
                session_id: session_id.clone(),
            }))
            .await;

        self.inner.registry.remove_scope(&session_id);
        result.map(|_| ())
    }

    /// Closes the transport.
    ///
    /// Every pending request, on this session and all its children, is
    /// rejected with [`Error::ConnectionClosed`] before this returns, and
    /// all handlers are dropped.
    pub async fn close(&self) {
        self.inner.connection.shutdown().await;
        self.inner.registry.clear();
    }
}

// ============================================================================
// Session - Events
// ============================================================================

impl Session {
    /// Registers an event handler.
    ///
    /// On a child view the handler only fires for events of that session.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        match &self.scope {
            Some(session_id) => self.inner.registry.on_session(session_id, event, handler),
            None => self.inner.registry.on(event, handler),
        }
    }

    /// Removes a handler registered with [`Session::on`].
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        match &self.scope {
            Some(session_id) => self.inner.registry.off_session(session_id, event, id),
            None => self.inner.registry.off(event, id),
        }
    }

    /// Registers a handler for an explicit session id.
    pub fn on_session<F>(&self, session_id: &SessionId, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .registry
            .on_session(session_id, event, Arc::new(handler))
    }

    /// Removes a handler registered with [`Session::on_session`].
    pub fn off_session(&self, session_id: &SessionId, event: &str, id: HandlerId) -> bool {
        self.inner.registry.off_session(session_id, event, id)
    }

    /// Waits for the next event named `method`.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the transport closes first.
    pub async fn wait_for_event(
        &self,
        method: &str,
        timeout_duration: Duration,
    ) -> Result<Option<Event>> {
        let (tx, rx) = oneshot::channel::<Event>();
        let tx = Mutex::new(Some(tx));

        let id = self.on(method, move |event: &Event| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });

        if self.is_closed() {
            self.off(method, id);
            return Err(Error::ConnectionClosed);
        }

        let result = timeout(timeout_duration, rx).await;
        self.off(method, id);

        match result {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_target_info_deserialize() {
        let info: TargetInfo = serde_json::from_value(json!({
            "targetId": "T1",
            "type": "page",
            "title": "Example",
            "url": "https://example.com/",
            "attached": false,
            "canAccessOpener": false
        }))
        .expect("parse");

        assert_eq!(info.target_id.as_str(), "T1");
        assert_eq!(info.target_type, "page");
        assert!(!info.attached);
    }
}
