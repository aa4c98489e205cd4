//! Scripted browser endpoint for integration tests.
//!
//! Accepts one WebSocket client, records every command it receives, and
//! answers through a caller-supplied responder. Tests can also push
//! arbitrary frames (events, garbage) and close the socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use cdp_pilot::{Session, SessionOptions};

// ============================================================================
// Reply
// ============================================================================

/// How the mock answers one command.
pub enum Reply {
    /// `{"id", "result"}`.
    Result(Value),
    /// `{"id", "result"}` followed by raw event frames.
    WithEvents(Value, Vec<Value>),
    /// `{"id", "result"}` after a delay; other traffic is not held up.
    Delayed(Duration, Value),
    /// `{"id", "error": {code, message}}`.
    Error(i64, String),
    /// No answer at all.
    Silent,
}

/// A command as the mock saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub id: u64,
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

type Responder = dyn Fn(&Recorded) -> Reply + Send + Sync;

enum Outgoing {
    Frame(String),
    Close,
}

// ============================================================================
// MockBrowser
// ============================================================================

pub struct MockBrowser {
    addr: SocketAddr,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    out_tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

impl Drop for MockBrowser {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MockBrowser {
    /// Binds a local port and starts serving.
    pub async fn start<F>(responder: F) -> Result<Self>
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(
            listener,
            Arc::new(responder),
            Arc::clone(&recorded),
            out_tx.clone(),
            out_rx,
        ));

        Ok(Self {
            addr,
            recorded,
            out_tx,
            task,
        })
    }

    /// A mock that answers every command with `{}`.
    pub async fn echo() -> Result<Self> {
        Self::start(|_| Reply::Result(json!({}))).await
    }

    pub fn url(&self) -> String {
        format!("ws://{}/devtools/browser/mock", self.addr)
    }

    /// Connects a session with test-friendly options.
    pub async fn connect(&self) -> Result<Session> {
        self.connect_with(
            SessionOptions::new()
                .with_command_timeout(Duration::from_secs(5))
                .with_poll_interval(Duration::from_millis(20)),
        )
        .await
    }

    pub async fn connect_with(&self, options: SessionOptions) -> Result<Session> {
        Ok(Session::builder()
            .url(self.url())
            .options(options)
            .connect()
            .await?)
    }

    /// Sends an event frame.
    pub fn push_event(&self, method: &str, params: Value, session_id: Option<&str>) {
        let mut frame = json!({"method": method, "params": params});
        if let Some(session_id) = session_id {
            frame["sessionId"] = json!(session_id);
        }
        self.push_raw(frame.to_string());
    }

    /// Sends a raw text frame.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.out_tx.send(Outgoing::Frame(text.into()));
    }

    /// Closes the socket from the browser side.
    pub fn close(&self) {
        let _ = self.out_tx.send(Outgoing::Close);
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.recorded
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn find(&self, method: &str) -> Vec<Recorded> {
        self.recorded
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Waits until `count` commands named `method` have arrived.
    pub async fn wait_for(&self, method: &str, count: usize) -> bool {
        eventually(Duration::from_secs(5), || self.count(method) >= count).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Polls `check` every 10 ms until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Server Loop
// ============================================================================

async fn serve(
    listener: TcpListener,
    responder: Arc<Responder>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    out_tx: mpsc::UnboundedSender<Outgoing>,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                let Ok(text) = message.to_text() else { continue };
                let Ok(frame) = serde_json::from_str::<Value>(text) else { continue };
                let Some(command) = parse_command(&frame) else { continue };

                recorded.lock().push(command.clone());
                let id = command.id;

                match responder(&command) {
                    Reply::Result(result) => {
                        let _ = out_tx.send(Outgoing::Frame(json!({"id": id, "result": result}).to_string()));
                    }
                    Reply::WithEvents(result, events) => {
                        let _ = out_tx.send(Outgoing::Frame(json!({"id": id, "result": result}).to_string()));
                        for event in events {
                            let _ = out_tx.send(Outgoing::Frame(event.to_string()));
                        }
                    }
                    Reply::Delayed(delay, result) => {
                        let out_tx = out_tx.clone();
                        tokio::spawn(async move {
                            sleep(delay).await;
                            let _ = out_tx.send(Outgoing::Frame(json!({"id": id, "result": result}).to_string()));
                        });
                    }
                    Reply::Error(code, message) => {
                        let frame = json!({"id": id, "error": {"code": code, "message": message}});
                        let _ = out_tx.send(Outgoing::Frame(frame.to_string()));
                    }
                    Reply::Silent => {}
                }
            }

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(Outgoing::Frame(text)) => {
                        if sink.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }
}

fn parse_command(frame: &Value) -> Option<Recorded> {
    Some(Recorded {
        id: frame.get("id")?.as_u64()?,
        method: frame.get("method")?.as_str()?.to_string(),
        params: frame.get("params").cloned().unwrap_or(Value::Null),
        session_id: frame
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
