//! Network capture.
//!
//! A [`Listener`] subscribes to the `Network` event family of one session,
//! correlates the phases of each request into a [`Packet`], and exposes
//! polling waits over the packets it has caught.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cdp_pilot::{ListenOptions, Listener, Session};
//!
//! # async fn example(tab: Session) -> cdp_pilot::Result<()> {
//! let listener = Listener::new(tab);
//! listener.start(ListenOptions::new().with_target("/api/")).await?;
//!
//! if let Some(packets) = listener.wait(2, Duration::from_secs(10)).await? {
//!     for packet in packets {
//!         println!("{} -> {:?}", packet.url(), packet.status());
//!     }
//! }
//!
//! listener.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `filter` | What gets captured |
//! | `packet` | Captured records |
//! | `state` | Per-request phase machine |
//! | `stream` | Batched streaming delivery |

// ============================================================================
// Submodules
// ============================================================================

mod filter;
mod packet;
mod state;
mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use filter::{ListenOptions, UrlTarget};
pub use packet::{FailInfo, Packet, RedirectHop, RequestData, ResponseData};
pub use stream::PacketStream;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::browser::wait::poll_until;
use crate::error::{Error, Result};
use crate::identifiers::HandlerId;
use crate::protocol::{Command, Event, NetworkCommand};
use crate::session::{Session, WeakSession};

use self::state::{BodyRequest, ListenerState};

/// Events that drive the capture state.
const NETWORK_EVENTS: [&str; 6] = [
    "Network.requestWillBeSent",
    "Network.requestWillBeSentExtraInfo",
    "Network.responseReceived",
    "Network.responseReceivedExtraInfo",
    "Network.loadingFinished",
    "Network.loadingFailed",
];

// ============================================================================
// Listener
// ============================================================================

/// Network capture bound to one session.
///
/// Cheap to clone; clones share the captured packets.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    session: Session,
    state: Arc<Mutex<ListenerState>>,
    handlers: Mutex<Vec<(&'static str, HandlerId)>>,
    running: AtomicBool,
}

impl Drop for ListenerInner {
    fn drop(&mut self) {
        for (event, id) in self.handlers.get_mut().drain(..) {
            self.session.off(event, id);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("session_id", &self.inner.session.session_id())
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Listener - Lifecycle
// ============================================================================

impl Listener {
    /// Creates an idle listener.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                session,
                state: Arc::new(Mutex::new(ListenerState::new(ListenOptions::new()))),
                handlers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Starts (or restarts) capturing with `options`.
    ///
    /// Previously caught packets are dropped. Handlers are registered
    /// before `Network.enable` is sent, so no early event is missed.
    ///
    /// # Errors
    ///
    /// Propagates the `Network.enable` failure; capture is stopped again.
    pub async fn start(&self, options: ListenOptions) -> Result<()> {
        self.unregister();
        self.inner.state.lock().reset(options);
        self.register();

        let enabled = self
            .inner
            .session
            .send_command(Command::Network(NetworkCommand::Enable))
            .await;

        if let Err(e) = enabled {
            self.unregister();
            return Err(e);
        }

        self.inner.running.store(true, Ordering::Release);
        debug!(session_id = ?self.inner.session.session_id(), "Network capture started");
        Ok(())
    }

    /// Stops capturing. Caught packets stay available.
    ///
    /// `Network.disable` is best-effort.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.unregister();

        if let Err(e) = self
            .inner
            .session
            .send_command(Command::Network(NetworkCommand::Disable))
            .await
        {
            debug!(error = %e, "Network.disable failed");
        }
        debug!(session_id = ?self.inner.session.session_id(), "Network capture stopped");
    }

    /// Ignores new requests until [`resume`](Self::resume).
    ///
    /// Requests already in flight still complete.
    pub fn pause(&self, clear: bool) {
        self.inner.state.lock().pause(clear);
    }

    /// Resumes after [`pause`](Self::pause).
    pub fn resume(&self) {
        self.inner.state.lock().resume();
    }

    /// Drops every packet, tracked or caught.
    ///
    /// Body fetches still outstanding are discarded when they land.
    pub fn clear(&self) {
        self.inner.state.lock().clear();
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Returns `true` while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().is_paused()
    }

    /// Requests sent but not yet finished or failed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight()
    }

    /// Caught packets not yet consumed by a wait.
    #[must_use]
    pub fn caught(&self) -> usize {
        self.inner.state.lock().caught_len()
    }

    /// Copies the caught packets without consuming them.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Packet> {
        self.inner.state.lock().snapshot()
    }

    fn register(&self) {
        let session = &self.inner.session;
        let mut handlers = self.inner.handlers.lock();

        for event in NETWORK_EVENTS {
            let state = Arc::clone(&self.inner.state);
            let weak = session.downgrade();

            let id = session.on(event, move |message: &Event| {
                let request = state.lock().apply(message.parse());
                if let Some(request) = request {
                    fetch_body(weak.clone(), Arc::clone(&state), request);
                }
            });
            handlers.push((event, id));
        }
    }

    fn unregister(&self) {
        let handlers: Vec<_> = self.inner.handlers.lock().drain(..).collect();
        for (event, id) in handlers {
            self.inner.session.off(event, id);
        }
    }
}

// ============================================================================
// Listener - Waiting
// ============================================================================

impl Listener {
    /// Waits until `count` packets are caught and takes them.
    ///
    /// Packets come back in completion order. Returns `None` on timeout,
    /// leaving caught packets in place.
    ///
    /// # Errors
    ///
    /// Only errors from the polling machinery; timeouts are not errors.
    pub async fn wait(&self, count: usize, timeout: Duration) -> Result<Option<Vec<Packet>>> {
        self.wait_with(count, timeout, false).await
    }

    /// Like [`wait`](Self::wait), optionally stopping capture on timeout.
    pub async fn wait_with(
        &self,
        count: usize,
        timeout: Duration,
        stop_on_timeout: bool,
    ) -> Result<Option<Vec<Packet>>> {
        let state = &self.inner.state;

        let packets = poll_until(self.poll_interval(), timeout, || {
            let ready = {
                let mut state = state.lock();
                (state.caught_len() >= count).then(|| state.take(count))
            };
            async move { Ok(ready) }
        })
        .await?;

        if packets.is_none() {
            trace!(count, "Packet wait timed out");
            if stop_on_timeout {
                self.stop().await;
            }
        }
        Ok(packets)
    }

    /// Waits for one packet.
    pub async fn wait_one(&self, timeout: Duration) -> Result<Option<Packet>> {
        Ok(self
            .wait(1, timeout)
            .await?
            .and_then(|packets| packets.into_iter().next()))
    }

    /// Waits until at most `limit` requests are in flight.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_silent(&self, timeout: Duration, limit: usize) -> Result<bool> {
        let state = &self.inner.state;

        let quiet = poll_until(self.poll_interval(), timeout, || {
            let ready = (state.lock().in_flight() <= limit).then_some(());
            async move { Ok(ready) }
        })
        .await?;

        Ok(quiet.is_some())
    }

    /// Streams caught packets in batches of `gap`.
    ///
    /// The stream ends after `count` packets (unbounded when `None`), or
    /// at the deadline, when a final short batch is flushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `gap` is zero.
    pub fn steps(
        &self,
        count: Option<usize>,
        gap: usize,
        timeout: Option<Duration>,
    ) -> Result<PacketStream> {
        if gap == 0 {
            return Err(Error::invalid_argument("gap must be at least 1"));
        }

        Ok(PacketStream::spawn(
            Arc::clone(&self.inner.state),
            count,
            gap,
            timeout,
            self.poll_interval(),
        ))
    }

    #[inline]
    fn poll_interval(&self) -> Duration {
        self.inner.session.options().poll_interval
    }
}

// ============================================================================
// Body Fetch
// ============================================================================

/// Fetches a response body off the event path.
///
/// Failures leave the body empty; the packet is released either way.
fn fetch_body(session: WeakSession, state: Arc<Mutex<ListenerState>>, request: BodyRequest) {
    let Ok(runtime) = Handle::try_current() else {
        state
            .lock()
            .complete_body(&request.request_id, request.generation, None);
        return;
    };

    runtime.spawn(async move {
        let body = match session.upgrade() {
            Some(session) => session
                .send_command(Command::Network(NetworkCommand::GetResponseBody {
                    request_id: request.request_id.clone(),
                }))
                .await
                .map(|result| parse_body(&result))
                .inspect_err(|e| {
                    trace!(request_id = %request.request_id, error = %e, "Response body unavailable");
                })
                .ok(),
            None => None,
        };

        state
            .lock()
            .complete_body(&request.request_id, request.generation, body);
    });
}

fn parse_body(result: &Value) -> (String, bool) {
    let raw = result
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let base64_encoded = result
        .get("base64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or_default();
    (raw, base64_encoded)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(
            parse_body(&json!({"body": "aGk=", "base64Encoded": true})),
            ("aGk=".to_string(), true)
        );
        assert_eq!(parse_body(&json!({})), (String::new(), false));
    }

    #[test]
    fn test_network_events_are_distinct() {
        let mut events = NETWORK_EVENTS.to_vec();
        events.sort_unstable();
        events.dedup();
        assert_eq!(events.len(), NETWORK_EVENTS.len());
    }
}
