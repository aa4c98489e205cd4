//! Page facade.
//!
//! Bundles the per-target helpers behind one handle. Every helper is built
//! once, when the page is created.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::TargetId;
use crate::session::Session;

use super::downloads::DownloadManager;
use super::listener::Listener;
use super::locator::Locator;
use super::navigator::Navigator;
use super::node::Node;

// ============================================================================
// Page
// ============================================================================

pub(crate) struct PageInner {
    session: Session,
    navigator: Navigator,
    listener: Listener,
    downloads: DownloadManager,
}

/// A handle to one attached page target.
///
/// Cheap to clone; clones share every helper.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("session_id", &self.inner.session.session_id())
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Wraps a session already bound to a page target.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(PageInner {
                navigator: Navigator::new(session.clone()),
                listener: Listener::new(session.clone()),
                downloads: DownloadManager::new(&session),
                session,
            }),
        }
    }

    /// Attaches to `target_id` through `browser` and wraps the child session.
    ///
    /// # Errors
    ///
    /// See [`Session::attach`].
    pub async fn attach(browser: &Session, target_id: &TargetId) -> Result<Self> {
        Ok(Self::new(browser.attach(target_id).await?))
    }
}

// ============================================================================
// Page - Accessors
// ============================================================================

impl Page {
    /// Returns the page's session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns the document navigator.
    #[inline]
    #[must_use]
    pub fn navigator(&self) -> &Navigator {
        &self.inner.navigator
    }

    /// Returns the network listener.
    #[inline]
    #[must_use]
    pub fn listener(&self) -> &Listener {
        &self.inner.listener
    }

    /// Returns the download manager.
    #[inline]
    #[must_use]
    pub fn downloads(&self) -> &DownloadManager {
        &self.inner.downloads
    }
}

// ============================================================================
// Page - Shortcuts
// ============================================================================

impl Page {
    /// Navigates and waits for load. Returns `false` on timeout.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<bool> {
        self.inner.navigator.goto(url, timeout).await
    }

    /// Finds the first match.
    pub async fn find(&self, locator: impl Into<Locator>) -> Result<Node> {
        self.inner.navigator.find(locator).await
    }

    /// Finds every match.
    pub async fn find_all(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.inner.navigator.find_all(locator).await
    }

    /// Evaluates an expression in the page.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.inner.navigator.evaluate(expression).await
    }

    /// Detaches from the target.
    ///
    /// Capture stops first so no handler outlives the session scope.
    pub async fn detach(&self) -> Result<()> {
        self.inner.listener.stop().await;
        self.inner.session.detach().await
    }
}
