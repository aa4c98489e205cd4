//! WebSocket connection and event loop.
//!
//! This module owns the socket to the browser's debugging endpoint,
//! including request/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the browser (responses, events)
//! - Outgoing commands from the Rust API
//! - Request/response correlation by numeric id
//! - Event delivery to the [`EventSink`]
//!
//! When the loop ends, for any reason, every pending request and every
//! command still queued is rejected with [`Error::ConnectionClosed`]
//! exactly once, and the sink is told the connection is gone.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};
use crate::protocol::{Event, Incoming, Request, Response};

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

/// Receiver of events read off the socket.
///
/// Called on the event loop task, in arrival order. Implementations must
/// not block.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn dispatch(&self, event: Event);

    /// Called once after the loop has terminated and pending requests
    /// have been rejected.
    fn closed(&self) {}
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Close the socket; the sender is notified once cleanup is done.
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a browser debugging endpoint.
///
/// Handles request/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and is shared behind an `Arc`.
/// All operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Next request id; ids start at 1.
    next_id: AtomicU64,
    /// Set once the event loop has stopped accepting traffic.
    closed: Arc<AtomicBool>,
    /// Maximum pending requests before rejecting new ones.
    max_pending: usize,
}

impl Connection {
    /// Opens a client connection to `url` and spawns the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::WebSocket`] if the handshake fails
    pub(crate) async fn connect(
        url: &str,
        sink: Arc<dyn EventSink>,
        max_pending: usize,
        connect_timeout: Duration,
    ) -> Result<Self> {
        debug!(url, "Connecting to debugging endpoint");

        let (ws_stream, _) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        debug!(url, "WebSocket handshake completed");
        Ok(Self::new(ws_stream, sink, max_pending))
    }

    /// Creates a new connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new<S>(
        ws_stream: WebSocketStream<S>,
        sink: Arc<dyn EventSink>,
        max_pending: usize,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&closed),
            sink,
        ));

        Self {
            command_tx,
            correlation,
            next_id: AtomicU64::new(1),
            closed,
            max_pending,
        }
    }

    /// Sends a command and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if no response arrives within `request_timeout`
    /// - [`Error::Protocol`] if too many requests are pending
    /// - [`Error::CommandFailed`] if the browser answers with an `error` object
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<SessionId>,
        request_timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        // Check pending request limit
        {
            let pending = self.correlation.lock().len();
            if pending >= self.max_pending {
                warn!(pending, max = self.max_pending, "Too many pending requests");
                return Err(Error::protocol(format!(
                    "Too many pending requests: {pending}/{}",
                    self.max_pending
                )));
            }
        }

        let request_id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request::new(request_id, method, params, session_id);

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(method),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the socket and waits until pending requests have been rejected.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .command_tx
            .send(ConnectionCommand::Shutdown(ack_tx))
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        closed: Arc<AtomicBool>,
        sink: Arc<dyn EventSink>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut acks = Vec::new();

        loop {
            tokio::select! {
                // Incoming frames from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, sink.as_ref());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown(ack)) => {
                            debug!("Shutdown command received");
                            acks.push(ack);
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::Release);

        // Reject commands that were queued but never written
        command_rx.close();
        while let Ok(command) = command_rx.try_recv() {
            match command {
                ConnectionCommand::Send { response_tx, .. } => {
                    let _ = response_tx.send(Err(Error::ConnectionClosed));
                }
                ConnectionCommand::Shutdown(ack) => acks.push(ack),
                ConnectionCommand::RemoveCorrelation(_) => {}
            }
        }

        Self::fail_pending_requests(&correlation);
        sink.closed();

        for ack in acks {
            let _ = ack.send(());
        }

        debug!("Event loop terminated");
    }

    /// Handles an incoming text frame.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        sink: &dyn EventSink,
    ) {
        match Incoming::parse(text) {
            Some(Incoming::Response(response)) => {
                let tx = correlation.lock().remove(&response.id);

                if let Some(tx) = tx {
                    let _ = tx.send(Ok(response));
                } else {
                    debug!(request_id = %response.id, "Response for unknown request");
                }
            }

            Some(Incoming::Event(event)) => {
                trace!(method = %event.method, session_id = ?event.session_id, "Event received");
                sink.dispatch(event);
            }

            None => {
                trace!(len = text.len(), "Dropped malformed frame");
            }
        }
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command<W>(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut W,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = correlation.lock().remove(&request_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return;
        }

        trace!(%request_id, method = %request.method, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl EventSink for NullSink {
        fn dispatch(&self, _event: Event) {}
    }

    #[test]
    fn test_unknown_response_is_ignored() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        Connection::handle_incoming_message(r#"{"id": 42, "result": {}}"#, &correlation, &NullSink);
        assert!(correlation.lock().is_empty());
    }

    #[test]
    fn test_response_resolves_matching_slot() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (tx, mut rx) = oneshot::channel();
        correlation.lock().insert(RequestId::new(3), tx);

        Connection::handle_incoming_message(
            r#"{"id": 3, "result": {"ok": true}}"#,
            &correlation,
            &NullSink,
        );

        assert!(correlation.lock().is_empty());
        let response = rx.try_recv().expect("resolved").expect("ok");
        assert_eq!(response.id, RequestId::new(3));
    }

    #[test]
    fn test_fail_pending_rejects_all() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let mut receivers = Vec::new();
        for id in 1..=3 {
            let (tx, rx) = oneshot::channel();
            correlation.lock().insert(RequestId::new(id), tx);
            receivers.push(rx);
        }

        Connection::fail_pending_requests(&correlation);

        assert!(correlation.lock().is_empty());
        for mut rx in receivers {
            let result = rx.try_recv().expect("rejected");
            assert!(matches!(result, Err(Error::ConnectionClosed)));
        }
    }
}
