//! Wire protocol message types.
//!
//! This module defines the JSON envelope exchanged with the browser over
//! the debugging socket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Shape |
//! |--------------|-----------|-------|
//! | `Request` | Client → Browser | `{id, method, params, sessionId?}` |
//! | `Response` | Browser → Client | `{id, result?, error?}` |
//! | `Event` | Browser → Client | `{method, params, sessionId?}` |
//!
//! Incoming frames are classified by shape: a numeric `id` means response,
//! a `method` without `id` means event, anything else is dropped.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Typed command definitions by domain |
//! | `event` | Event envelope and parsed event families |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    BrowserCommand, CallArgument, Command, DomCommand, NetworkCommand, PageCommand,
    RuntimeCommand, TargetCommand,
};
pub use event::{DownloadState, Event, Headers, ParsedEvent, ResponseInfo};
pub use request::{Request, Response, ResponseError};

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// Incoming
// ============================================================================

/// A classified incoming frame.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Response to a pending request.
    Response(Response),
    /// Unsolicited event.
    Event(Event),
}

impl Incoming {
    /// Classifies a text frame.
    ///
    /// Returns `None` for frames that are not JSON objects, responses with a
    /// non-numeric id, and objects with neither `id` nor `method`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value.as_object()?;

        match object.get("id") {
            Some(id) if id.is_u64() => serde_json::from_value(value).ok().map(Self::Response),
            Some(_) => None,
            None if object.get("method").is_some_and(Value::is_string) => {
                serde_json::from_value(value).ok().map(Self::Event)
            }
            None => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
