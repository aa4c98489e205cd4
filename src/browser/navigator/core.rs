//! Core Navigator struct and accessors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::identifiers::NodeId;
use crate::session::Session;

use crate::browser::node::{DomContext, Node};

// ============================================================================
// Navigator
// ============================================================================

/// Locator queries against one target's document.
///
/// Cheap to clone; clones share the root id and object cache.
#[derive(Clone)]
pub struct Navigator {
    /// Document context shared with every node this navigator returns.
    pub(crate) ctx: Arc<DomContext>,
    /// Whether `Page.enable` has been sent.
    pub(crate) page_enabled: Arc<AtomicBool>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("session_id", &self.ctx.session.session_id())
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Creates a navigator for the document of `session`'s target.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            ctx: DomContext::new(session),
            page_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    /// Wraps a known node id in a handle bound to this document.
    #[must_use]
    pub fn node(&self, node_id: NodeId) -> Node {
        Node::new(Arc::clone(&self.ctx), node_id)
    }

    /// Forgets the cached root and remote objects.
    ///
    /// Happens automatically on `DOM.documentUpdated`.
    pub fn reset(&self) {
        self.ctx.reset();
    }
}
