//! Document navigation: locator queries over the live DOM.
//!
//! A [`Navigator`] turns a [`Locator`](crate::Locator) into zero or more
//! [`Node`](crate::Node) handles. Structural (CSS) locators run through
//! `DOM.querySelectorAll`; path (XPath) locators run through
//! `DOM.performSearch` at document scope, or `document.evaluate` when scoped
//! to a node.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Navigator struct and accessors |
//! | `search` | Document and node-scoped lookups, waiting |
//! | `relative` | Ancestors, siblings, document order, compass directions |
//! | `navigation` | Page navigation, load waiting, evaluation |
//!
//! # Example
//!
//! ```ignore
//! let nav = Navigator::new(tab_session);
//! nav.goto("https://example.com", Duration::from_secs(10)).await?;
//!
//! let rows = nav.find_all("css:table tr").await?;
//! let label = nav.find("text=Email").await?;
//! let input = label.east("tag:input", 1).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod core;
mod navigation;
mod relative;
mod search;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Navigator;
pub use relative::Direction;
