//! Command definitions organized by domain.
//!
//! Commands follow the protocol's `Domain.method` format. Only the commands
//! the core itself issues are modelled; anything else goes through
//! `Session::send` with raw params.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `DOM` | Document root, structural and path queries, node resolution |
//! | `Runtime` | Evaluation and function calls on remote objects |
//! | `Network` | Capture toggling, response bodies |
//! | `Browser` | Download behaviour and cancellation |
//! | `Target` | Target listing and flatten-mode attach |
//! | `Page` | Lifecycle events, navigation |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{NetworkId, NodeId, RemoteObjectId, SessionId, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// DOM domain commands.
    Dom(DomCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// Browser domain commands.
    Browser(BrowserCommand),
    /// Target domain commands.
    Target(TargetCommand),
    /// Page domain commands.
    Page(PageCommand),
}

impl Command {
    /// Splits the command into its wire `method` and `params`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails, or
    /// [`Error::Protocol`] if the serialized form has no method.
    pub fn into_parts(self) -> Result<(String, Value)> {
        let Value::Object(mut object) = serde_json::to_value(&self)? else {
            return Err(Error::protocol("command did not serialize to an object"));
        };

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(Error::protocol("command has no method")),
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((method, params))
    }
}

// ============================================================================
// DOM Commands
// ============================================================================

/// DOM domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum DomCommand {
    /// Get the document root (enables DOM events for the target).
    #[serde(rename = "DOM.getDocument")]
    GetDocument {
        /// Subtree depth to return.
        depth: i32,
        /// Traverse iframes and shadow roots.
        pierce: bool,
    },

    /// Structural query below a node.
    #[serde(rename = "DOM.querySelectorAll")]
    QuerySelectorAll {
        /// Scope node.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
        /// CSS selector.
        selector: String,
    },

    /// Start a path search over the whole document.
    #[serde(rename = "DOM.performSearch")]
    PerformSearch {
        /// XPath query.
        query: String,
        /// Include user-agent shadow DOM.
        #[serde(rename = "includeUserAgentShadowDOM")]
        include_user_agent_shadow_dom: bool,
    },

    /// Fetch a page of search results.
    #[serde(rename = "DOM.getSearchResults")]
    GetSearchResults {
        /// Search handle.
        #[serde(rename = "searchId")]
        search_id: String,
        /// First index (inclusive).
        #[serde(rename = "fromIndex")]
        from_index: usize,
        /// Last index (exclusive).
        #[serde(rename = "toIndex")]
        to_index: usize,
    },

    /// Release a search handle.
    #[serde(rename = "DOM.discardSearchResults")]
    DiscardSearchResults {
        /// Search handle.
        #[serde(rename = "searchId")]
        search_id: String,
    },

    /// Resolve a node to a live remote object.
    #[serde(rename = "DOM.resolveNode")]
    ResolveNode {
        /// Node to resolve.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },

    /// Push a remote object's node to the client and return its id.
    #[serde(rename = "DOM.requestNode")]
    RequestNode {
        /// Remote object of a DOM node.
        #[serde(rename = "objectId")]
        object_id: RemoteObjectId,
    },

    /// Describe a node (name, attributes).
    #[serde(rename = "DOM.describeNode")]
    DescribeNode {
        /// Node to describe.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },

    /// Flat `[name, value, ...]` attribute list.
    #[serde(rename = "DOM.getAttributes")]
    GetAttributes {
        /// Node to inspect.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },

    /// Outer HTML of a node.
    #[serde(rename = "DOM.getOuterHTML")]
    GetOuterHtml {
        /// Node to serialise.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Argument for `Runtime.callFunctionOn`.
#[derive(Debug, Clone, Serialize)]
pub struct CallArgument {
    /// Primitive or JSON value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Remote object passed by reference.
    #[serde(rename = "objectId", skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
}

impl CallArgument {
    /// Argument passed by value.
    #[inline]
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            object_id: None,
        }
    }

    /// Argument passed by remote reference.
    #[inline]
    #[must_use]
    pub fn object(object_id: RemoteObjectId) -> Self {
        Self {
            value: None,
            object_id: Some(object_id),
        }
    }
}

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate an expression in the page's main world.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// Expression source.
        expression: String,
        /// Return JSON value instead of a handle.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },

    /// Call a function with `this` bound to a remote object.
    #[serde(rename = "Runtime.callFunctionOn")]
    CallFunctionOn {
        /// Function source (`function(...) { ... }`).
        #[serde(rename = "functionDeclaration")]
        function_declaration: String,
        /// `this` for the call.
        #[serde(rename = "objectId")]
        object_id: RemoteObjectId,
        /// Call arguments.
        arguments: Vec<CallArgument>,
        /// Return JSON value instead of a handle.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },

    /// Release a remote object.
    #[serde(rename = "Runtime.releaseObject")]
    ReleaseObject {
        /// Object to release.
        #[serde(rename = "objectId")]
        object_id: RemoteObjectId,
    },
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Start emitting network events.
    #[serde(rename = "Network.enable")]
    Enable,

    /// Stop emitting network events.
    #[serde(rename = "Network.disable")]
    Disable,

    /// Fetch a finished request's body.
    #[serde(rename = "Network.getResponseBody")]
    GetResponseBody {
        /// Request whose body to fetch.
        #[serde(rename = "requestId")]
        request_id: NetworkId,
    },
}

// ============================================================================
// Browser Commands
// ============================================================================

/// Browser domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowserCommand {
    /// Configure download handling.
    #[serde(rename = "Browser.setDownloadBehavior")]
    SetDownloadBehavior {
        /// `deny`, `allow`, `allowAndName` or `default`.
        behavior: String,
        /// Target folder.
        #[serde(rename = "downloadPath", skip_serializing_if = "Option::is_none")]
        download_path: Option<String>,
        /// Emit download events.
        #[serde(rename = "eventsEnabled")]
        events_enabled: bool,
    },

    /// Cancel an in-progress download.
    #[serde(rename = "Browser.cancelDownload")]
    CancelDownload {
        /// Download guid.
        guid: String,
    },
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// List known targets.
    #[serde(rename = "Target.getTargets")]
    GetTargets,

    /// Attach to a target, returning a session id.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Multiplex over the existing socket.
        flatten: bool,
    },

    /// Detach a flatten-mode session.
    #[serde(rename = "Target.detachFromTarget")]
    DetachFromTarget {
        /// Session to detach.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Start emitting page lifecycle events.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Navigate the target.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },
}

// ============================================================================
// Tests
// ============================================================================
