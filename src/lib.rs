//! CDP Pilot - async client for the Chrome DevTools Protocol.
//!
//! One WebSocket carries every command and event. Commands are correlated
//! by id; events fan out to subscribers, globally or per flatten-mode
//! session. On top of that sit DOM node handles, a compact locator
//! grammar, network capture, and download tracking.
//!
//! # Architecture
//!
//! - [`Session`] owns the transport, the pending-request table and the
//!   subscriber maps. [`Session::child`] views share all three.
//! - [`Node`] keeps the stable DOM node id as its identity and caches the
//!   ephemeral remote object id for a short TTL.
//! - [`Listener`] and [`DownloadManager`] are event-driven state machines;
//!   their waits poll in-memory state and never block the transport.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cdp_pilot::{ListenOptions, Page, Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let browser = Session::builder()
//!         .url("ws://127.0.0.1:9222/devtools/browser/abc")
//!         .command_timeout(Duration::from_secs(20))
//!         .connect()
//!         .await?;
//!
//!     let targets = browser.targets().await?;
//!     let page = Page::attach(&browser, &targets[0].target_id).await?;
//!
//!     page.listener().start(ListenOptions::new().with_target("/api/")).await?;
//!     page.goto("https://example.com", Duration::from_secs(30)).await?;
//!
//!     for link in page.find_all("t:a").await? {
//!         println!("{:?}", link.attribute("href").await?);
//!     }
//!
//!     browser.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | RPC/event session and subscriber registry |
//! | [`browser`] | Page facade, nodes, locators, capture, downloads |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | WebSocket connection and event loop |

// ============================================================================
// Modules
// ============================================================================

/// Page-level automation: nodes, locators, capture, downloads.
pub mod browser;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// RPC/event session.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    Direction, DownloadManager, FailInfo, ListenOptions, Listener, Locator, LocatorKind, Mission,
    Navigator, Node, Packet, PacketStream, Page, Rect, RedirectHop, RequestData, ResponseData,
    UrlTarget,
};

// Session types
pub use session::{
    EventHandler, EventRegistry, Session, SessionBuilder, SessionOptions, TargetInfo, WeakSession,
};

// Protocol types
pub use protocol::{DownloadState, Event, ParsedEvent};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{
    HandlerId, NetworkId, NodeId, RemoteObjectId, RequestId, SessionId, TargetId,
};
