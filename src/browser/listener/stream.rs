//! Streaming packet delivery.
//!
//! A producer task polls the capture state and pushes batches of `gap`
//! packets into a bounded channel. The stream ends when the requested count
//! is reached, the deadline passes, or the consumer cancels.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::trace;

use super::packet::Packet;
use super::state::ListenerState;

/// Batches buffered ahead of the consumer.
const STREAM_BUFFER: usize = 16;

// ============================================================================
// PacketStream
// ============================================================================

/// Cancellable stream of captured packets, `gap` at a time.
///
/// Packets handed out by the stream are removed from the listener.
/// Dropping the stream cancels it.
///
/// # Example
///
/// ```ignore
/// use futures_util::StreamExt;
///
/// let mut stream = listener.steps(Some(10), 2, None)?;
/// while let Some(batch) = stream.next().await {
///     for packet in batch {
///         println!("{} {:?}", packet.url(), packet.status());
///     }
/// }
/// ```
pub struct PacketStream {
    rx: mpsc::Receiver<Vec<Packet>>,
    task: JoinHandle<()>,
}

impl fmt::Debug for PacketStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketStream")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl PacketStream {
    /// Spawns the producer.
    ///
    /// `gap` must be non-zero.
    pub(crate) fn spawn(
        state: Arc<Mutex<ListenerState>>,
        count: Option<usize>,
        gap: usize,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let task = tokio::spawn(produce(state, tx, count, gap, timeout, poll_interval));
        Self { rx, task }
    }

    /// Stops the producer; batches already buffered are still yielded.
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

impl Stream for PacketStream {
    type Item = Vec<Packet>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Producer
// ============================================================================

async fn produce(
    state: Arc<Mutex<ListenerState>>,
    tx: mpsc::Sender<Vec<Packet>>,
    count: Option<usize>,
    gap: usize,
    timeout: Option<Duration>,
    poll_interval: Duration,
) {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut remaining = count;
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            trace!("Packet stream cancelled");
            return;
        }

        // On expiry a short final batch is flushed.
        let expired = deadline.is_some_and(|d| Instant::now() >= d);

        loop {
            let want = remaining.map_or(gap, |r| r.min(gap));
            if want == 0 {
                return;
            }

            let batch = {
                let mut state = state.lock();
                let available = state.caught_len();
                if available >= want || (expired && available > 0) {
                    state.take(want)
                } else {
                    Vec::new()
                }
            };
            if batch.is_empty() {
                break;
            }

            if let Some(r) = remaining.as_mut() {
                *r -= batch.len();
            }
            if tx.send(batch).await.is_err() {
                return;
            }
        }

        if expired {
            trace!("Packet stream deadline reached");
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;

    use crate::browser::listener::filter::ListenOptions;
    use crate::identifiers::NetworkId;
    use crate::protocol::{Headers, ParsedEvent};

    fn push_failed(state: &Mutex<ListenerState>, raw: &str) {
        let mut state = state.lock();
        state.apply(ParsedEvent::RequestWillBeSent {
            request_id: NetworkId::new(raw),
            url: format!("https://a.test/{raw}"),
            method: "GET".to_string(),
            headers: Headers::default(),
            post_data: None,
            has_post_data: false,
            resource_type: "XHR".to_string(),
            frame_id: String::new(),
            redirect_response: None,
        });
        state.apply(ParsedEvent::LoadingFailed {
            request_id: NetworkId::new(raw),
            error_text: "net::ERR_FAILED".to_string(),
            canceled: false,
            blocked_reason: None,
        });
    }

    fn shared_state() -> Arc<Mutex<ListenerState>> {
        Arc::new(Mutex::new(ListenerState::new(ListenOptions::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_yields_gap_batches_until_count() {
        let state = shared_state();
        for raw in ["1", "2", "3", "4"] {
            push_failed(&state, raw);
        }

        let stream = PacketStream::spawn(
            Arc::clone(&state),
            Some(3),
            2,
            None,
            Duration::from_millis(100),
        );
        let batches: Vec<Vec<Packet>> = stream.collect().await;

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1][0].url(), "https://a.test/3");
        assert_eq!(state.lock().caught_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_flushes_partial_batch() {
        let state = shared_state();
        push_failed(&state, "1");

        let stream = PacketStream::spawn(
            Arc::clone(&state),
            None,
            5,
            Some(Duration::from_millis(350)),
            Duration::from_millis(100),
        );
        let batches: Vec<Vec<Packet>> = stream.collect().await;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ends_stream() {
        let state = shared_state();
        let mut stream = PacketStream::spawn(
            Arc::clone(&state),
            None,
            1,
            None,
            Duration::from_millis(100),
        );

        stream.cancel();
        assert!(stream.next().await.is_none());
    }
}
