//! DOM node handles.
//!
//! A [`Node`] stores only a stable protocol [`NodeId`]. Operations that need
//! a live JavaScript object resolve it on demand with `DOM.resolveNode`; the
//! resulting remote object id is kept in the document context's
//! [`ObjectCache`] for a short TTL so back-to-back operations on one node
//! issue a single resolve.
//!
//! Objects that leave the cache are freed with `Runtime.releaseObject`.
//!
//! Staleness is detected lazily: when the browser no longer knows the node,
//! the operation fails with [`Error::StaleNode`] (an [`Error::is_not_found`]
//! error) and the cache entry is dropped.
//!
//! # Example
//!
//! ```ignore
//! let button = nav.find("text=Submit").await?;
//! if button.is_displayed().await? {
//!     button.click().await?;
//! }
//! let gone = button.wait_deleted(Duration::from_secs(5)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, NodeId, RemoteObjectId};
use crate::protocol::{CallArgument, Command, DomCommand, RuntimeCommand};
use crate::session::Session;

use super::cache::ObjectCache;
use super::scripts;
use super::wait::poll_until;

// ============================================================================
// DomContext
// ============================================================================

/// State shared by every node of one target's document.
///
/// Holds the document root id and the object cache; both are reset when the
/// browser reports `DOM.documentUpdated`.
pub(crate) struct DomContext {
    /// Session the document belongs to.
    pub(crate) session: Session,
    /// `NodeId → RemoteObjectId` side table.
    cache: Mutex<ObjectCache>,
    /// Cached document root.
    root: Mutex<Option<NodeId>>,
    /// `DOM.documentUpdated` subscription.
    handler: HandlerId,
}

impl DomContext {
    /// Creates a context and subscribes to document replacement.
    pub(crate) fn new(session: Session) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let handler = session.on("DOM.documentUpdated", move |_| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.reset();
                }
            });

            Self {
                cache: Mutex::new(ObjectCache::new(session.options().node_cache_ttl)),
                root: Mutex::new(None),
                handler,
                session,
            }
        })
    }

    /// Forgets the root id and all cached objects.
    pub(crate) fn reset(&self) {
        *self.root.lock() = None;
        self.with_cache(ObjectCache::clear);
        debug!("Document replaced, DOM context reset");
    }

    /// Runs `f` on the object cache, then releases whatever it evicted.
    fn with_cache<R>(&self, f: impl FnOnce(&mut ObjectCache) -> R) -> R {
        let (result, evicted) = {
            let mut cache = self.cache.lock();
            let result = f(&mut cache);
            (result, cache.drain_evicted())
        };
        self.release(evicted);
        result
    }

    /// Frees remote objects in the page, best-effort.
    fn release(&self, object_ids: Vec<RemoteObjectId>) {
        if object_ids.is_empty() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            trace!(count = object_ids.len(), "No runtime, remote objects not released");
            return;
        };

        let session = self.session.clone();
        handle.spawn(async move {
            for object_id in object_ids {
                if let Err(e) = session
                    .send_command(Command::Runtime(RuntimeCommand::ReleaseObject {
                        object_id: object_id.clone(),
                    }))
                    .await
                {
                    trace!(%object_id, error = %e, "releaseObject failed");
                }
            }
        });
    }

    /// Returns the document root, fetching it if needed.
    pub(crate) async fn root(&self) -> Result<NodeId> {
        if let Some(root) = *self.root.lock() {
            return Ok(root);
        }

        let result = self
            .session
            .send_command(Command::Dom(DomCommand::GetDocument {
                depth: 0,
                pierce: false,
            }))
            .await?;

        let root = result
            .pointer("/root/nodeId")
            .and_then(Value::as_i64)
            .and_then(NodeId::new)
            .ok_or_else(|| Error::protocol("DOM.getDocument returned no root nodeId"))?;

        *self.root.lock() = Some(root);
        trace!(%root, "Document root fetched");
        Ok(root)
    }

    /// Turns a remote object that is a DOM node into a [`Node`].
    ///
    /// The object id is cached for the new node.
    pub(crate) async fn node_from_object(
        self: &Arc<Self>,
        object_id: RemoteObjectId,
    ) -> Result<Option<Node>> {
        self.root().await?;

        let result = self
            .session
            .send_command(Command::Dom(DomCommand::RequestNode {
                object_id: object_id.clone(),
            }))
            .await?;

        let Some(node_id) = result
            .get("nodeId")
            .and_then(Value::as_i64)
            .and_then(NodeId::new)
        else {
            return Ok(None);
        };

        self.with_cache(|cache| cache.insert(node_id, object_id, Instant::now()));
        Ok(Some(Node::new(Arc::clone(self), node_id)))
    }
}

impl Drop for DomContext {
    fn drop(&mut self) {
        self.session.off("DOM.documentUpdated", self.handler);

        let cache = self.cache.get_mut();
        cache.clear();
        let evicted = cache.drain_evicted();
        self.release(evicted);
    }
}

// ============================================================================
// Rect
// ============================================================================

/// Bounding box in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Returns the centre point.
    #[inline]
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

// ============================================================================
// Node
// ============================================================================

/// A possibly-stale reference to a DOM node.
#[derive(Clone)]
pub struct Node {
    /// Document context.
    pub(crate) ctx: Arc<DomContext>,
    /// Stable protocol id.
    node_id: NodeId,
}

// ============================================================================
// Node - Display
// ============================================================================

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("session_id", &self.ctx.session.session_id())
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && Arc::ptr_eq(&self.ctx, &other.ctx)
    }
}

impl Eq for Node {}

// ============================================================================
// Node - Constructor & Accessors
// ============================================================================

impl Node {
    pub(crate) fn new(ctx: Arc<DomContext>, node_id: NodeId) -> Self {
        Self { ctx, node_id }
    }

    /// Returns the protocol node id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node_id
    }

    /// Returns the session this node belongs to.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.ctx.session
    }
}

// ============================================================================
// Node - Resolution
// ============================================================================

impl Node {
    /// Resolves the node to a live remote object id.
    ///
    /// Served from the cache when a resolve happened within the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleNode`] if the browser no longer knows the node.
    pub async fn object_id(&self) -> Result<RemoteObjectId> {
        let now = Instant::now();
        if let Some(object_id) = self.ctx.with_cache(|cache| cache.get(self.node_id, now)) {
            return Ok(object_id);
        }

        let result = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::ResolveNode {
                node_id: self.node_id,
            }))
            .await
            .map_err(|e| self.stale(e))?;

        let object_id = result
            .pointer("/object/objectId")
            .and_then(Value::as_str)
            .map(RemoteObjectId::new)
            .ok_or_else(|| {
                self.invalidate();
                Error::stale_node(self.node_id)
            })?;

        trace!(node_id = %self.node_id, %object_id, "Node resolved");
        let node_id = self.node_id;
        let cached = object_id.clone();
        self.ctx
            .with_cache(|cache| cache.insert(node_id, cached, Instant::now()));
        Ok(object_id)
    }

    /// Drops the cached remote object id; the next operation resolves again.
    ///
    /// The dropped object is released in the page.
    pub fn invalidate(&self) {
        self.ctx.with_cache(|cache| cache.invalidate(self.node_id));
    }

    /// Maps a command failure on this node to [`Error::StaleNode`].
    fn stale(&self, error: Error) -> Error {
        if error.is_command_failure() {
            self.invalidate();
            Error::stale_node(self.node_id)
        } else {
            error
        }
    }

    /// Calls `function_declaration` with `this` bound to the node.
    ///
    /// Returns the raw `RemoteObject` JSON. When the cached object has gone
    /// stale the call is retried once with a fresh resolve.
    async fn call_remote(
        &self,
        function_declaration: &str,
        arguments: Vec<CallArgument>,
        return_by_value: bool,
    ) -> Result<Value> {
        let object_id = self.object_id().await?;
        let first = self
            .call_on(object_id, function_declaration, arguments.clone(), return_by_value)
            .await;

        match first {
            Err(e) if e.is_command_failure() => {
                debug!(node_id = %self.node_id, error = %e, "Remote object stale, resolving again");
                self.invalidate();
                let object_id = self.object_id().await?;
                self.call_on(object_id, function_declaration, arguments, return_by_value)
                    .await
            }
            other => other,
        }
    }

    async fn call_on(
        &self,
        object_id: RemoteObjectId,
        function_declaration: &str,
        arguments: Vec<CallArgument>,
        return_by_value: bool,
    ) -> Result<Value> {
        let mut result = self
            .ctx
            .session
            .send_command(Command::Runtime(RuntimeCommand::CallFunctionOn {
                function_declaration: function_declaration.to_string(),
                object_id,
                arguments,
                return_by_value,
                await_promise: true,
            }))
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("uncaught exception");
            return Err(Error::script_error(message));
        }

        Ok(result
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Calls a function on the node and returns its JSON value.
    ///
    /// `undefined` comes back as `Null`.
    ///
    /// # Errors
    ///
    /// - [`Error::StaleNode`] if the node is gone
    /// - [`Error::ScriptError`] if the function throws
    pub async fn call_function(
        &self,
        function_declaration: &str,
        arguments: Vec<CallArgument>,
    ) -> Result<Value> {
        let mut remote = self
            .call_remote(function_declaration, arguments, true)
            .await?;
        Ok(remote.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    /// Calls a function on the node that returns a DOM node, or `null`.
    pub(crate) async fn call_for_node(
        &self,
        function_declaration: &str,
        arguments: Vec<CallArgument>,
    ) -> Result<Option<Node>> {
        let remote = self
            .call_remote(function_declaration, arguments, false)
            .await?;

        match remote.get("objectId").and_then(Value::as_str) {
            Some(object_id) => {
                self.ctx
                    .node_from_object(RemoteObjectId::new(object_id))
                    .await
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Node - Properties
// ============================================================================

impl Node {
    /// Returns the `DOM.describeNode` description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleNode`] if the node is gone.
    pub async fn describe(&self) -> Result<Value> {
        let mut result = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::DescribeNode {
                node_id: self.node_id,
            }))
            .await
            .map_err(|e| self.stale(e))?;

        Ok(result.get_mut("node").map(Value::take).unwrap_or(Value::Null))
    }

    /// Returns the lower-case tag name (`#text` for text nodes).
    pub async fn tag(&self) -> Result<String> {
        let node = self.describe().await?;
        let name = node
            .get("localName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| node.get("nodeName").and_then(Value::as_str))
            .unwrap_or_default();
        Ok(name.to_lowercase())
    }

    /// Returns all attributes in document order.
    pub async fn attributes(&self) -> Result<Vec<(String, String)>> {
        let result = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::GetAttributes {
                node_id: self.node_id,
            }))
            .await
            .map_err(|e| self.stale(e))?;

        let flat: Vec<String> = result
            .get("attributes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(flat
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }

    /// Returns one attribute's value, or `None` if absent.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .attributes()
            .await?
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value)))
    }

    /// Returns the node's `textContent`.
    pub async fn text(&self) -> Result<String> {
        let value = self.call_function(scripts::TEXT, Vec::new()).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Returns the node's outer HTML.
    pub async fn html(&self) -> Result<String> {
        let result = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::GetOuterHtml {
                node_id: self.node_id,
            }))
            .await
            .map_err(|e| self.stale(e))?;

        Ok(result
            .get("outerHTML")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Returns the bounding box.
    pub async fn rect(&self) -> Result<Rect> {
        let value = self.call_function(scripts::RECT, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns `true` if the node is attached, visible and has a box.
    pub async fn is_displayed(&self) -> Result<bool> {
        let value = self.call_function(scripts::IS_DISPLAYED, Vec::new()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Scrolls the node into view and clicks it.
    pub async fn click(&self) -> Result<()> {
        debug!(node_id = %self.node_id, "Clicking node");
        self.call_function(scripts::CLICK, Vec::new()).await?;
        Ok(())
    }

    /// Evaluates `function_declaration` with a JSON argument list.
    ///
    /// Convenience over [`Node::call_function`] for by-value arguments.
    pub async fn run(&self, function_declaration: &str, args: &[Value]) -> Result<Value> {
        let arguments = args.iter().cloned().map(CallArgument::value).collect();
        self.call_function(function_declaration, arguments).await
    }
}

// ============================================================================
// Node - Waiting
// ============================================================================

impl Node {
    /// Waits until the node leaves the document.
    ///
    /// Returns `false` if it is still attached when `timeout` elapses.
    pub async fn wait_deleted(&self, timeout: Duration) -> Result<bool> {
        let interval = self.ctx.session.options().poll_interval;

        let deleted = poll_until(interval, timeout, move || async move {
            self.invalidate();
            match self.call_function(scripts::IS_CONNECTED, Vec::new()).await {
                Ok(connected) => Ok((connected == json!(false)).then_some(())),
                Err(e) if e.is_not_found() || e.is_command_failure() => Ok(Some(())),
                Err(e) => Err(e),
            }
        })
        .await?;

        Ok(deleted.is_some())
    }

    /// Waits until the node is displayed.
    ///
    /// Returns `false` on timeout. A node that goes stale never becomes
    /// displayed, so this also returns `false` in that case.
    pub async fn wait_displayed(&self, timeout: Duration) -> Result<bool> {
        let interval = self.ctx.session.options().poll_interval;

        let shown = poll_until(interval, timeout, move || async move {
            match self.is_displayed().await {
                Ok(true) => Ok(Some(true)),
                Ok(false) => Ok(None),
                Err(e) if e.is_not_found() => Ok(Some(false)),
                Err(e) => Err(e),
            }
        })
        .await?;

        Ok(shown.unwrap_or(false))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center() {
        let rect = Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        assert_eq!(rect.center(), (60.0, 45.0));
    }

    #[test]
    fn test_rect_deserialize() {
        let rect: Rect =
            serde_json::from_value(json!({"x": 1, "y": 2.5, "width": 3, "height": 4}))
                .expect("parse");
        assert_eq!(rect.y, 2.5);
        assert_eq!(rect.width, 3.0);
    }
}
