//! Page-level automation built on a [`Session`](crate::Session).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Page`] | Facade bundling the helpers below for one target |
//! | [`Navigator`] | Locator queries, navigation, evaluation |
//! | [`Node`] | DOM node handle with a cached remote object |
//! | [`Locator`] | Compiled locator string |
//! | [`Listener`] | Network capture |
//! | [`DownloadManager`] | Download tracking |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cdp_pilot::{Page, Session};
//!
//! # async fn example() -> cdp_pilot::Result<()> {
//! let browser = Session::connect("ws://127.0.0.1:9222/devtools/browser/abc").await?;
//! let targets = browser.targets().await?;
//! let target = &targets[0].target_id;
//!
//! let page = Page::attach(&browser, target).await?;
//! page.goto("https://example.com", Duration::from_secs(30)).await?;
//!
//! let heading = page.find("t:h1").await?;
//! println!("{}", heading.text().await?);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Download tracking.
pub mod downloads;

/// Network capture.
pub mod listener;

/// Locator grammar.
pub mod locator;

/// Document queries and navigation.
pub mod navigator;

/// DOM node handles.
pub mod node;

/// Page facade.
pub mod page;

mod cache;
mod scripts;
mod wait;

// ============================================================================
// Re-exports
// ============================================================================

pub use downloads::{DownloadManager, Mission};
pub use listener::{
    FailInfo, ListenOptions, Listener, Packet, PacketStream, RedirectHop, RequestData, ResponseData,
    UrlTarget,
};
pub use locator::{Locator, LocatorKind};
pub use navigator::{Direction, Navigator};
pub use node::{Node, Rect};
pub use page::Page;
