//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers keep the many string and integer ids of the protocol
//! from being mixed up at compile time.
//!
//! | Type | Wire form | Lifetime |
//! |------|-----------|----------|
//! | [`RequestId`] | `u64` | One in-flight command |
//! | [`SessionId`] | string | One attached target (flatten mode) |
//! | [`TargetId`] | string | One tab, frame or worker |
//! | [`NodeId`] | integer | Stable DOM node reference within a document |
//! | [`RemoteObjectId`] | string | Ephemeral live-object handle |
//! | [`NetworkId`] | string | One network request (per hop) |
//! | [`HandlerId`] | local only | One registered event handler |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// String Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// Flatten-mode session id assigned by `Target.attachToTarget`.
    SessionId
}

string_id! {
    /// Target id (tab, frame, worker).
    TargetId
}

string_id! {
    /// Remote object id from the `Runtime` domain.
    ///
    /// Goes stale whenever the page drops the object; never use it as a
    /// node's identity.
    RemoteObjectId
}

string_id! {
    /// Network request id shared by every phase of one request.
    NetworkId
}

// ============================================================================
// RequestId
// ============================================================================

/// Command id used for request/response correlation.
///
/// Process-local and monotonically increasing per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// NodeId
// ============================================================================

/// DOM node id, stable for the lifetime of a document.
///
/// Zero is never a real node; the protocol uses it for "no match".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    /// Creates a node id, returning `None` for the zero/negative sentinel.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Option<Self> {
        if id > 0 { Some(Self(id)) } else { None }
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// HandlerId
// ============================================================================

/// Token returned by `Session::on`, used to unregister that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Wraps a raw handler token.
    #[inline]
    #[must_use]
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_rejects_sentinel() {
        assert!(NodeId::new(0).is_none());
        assert!(NodeId::new(-3).is_none());
        assert_eq!(NodeId::new(7).map(NodeId::as_i64), Some(7));
    }

    #[test]
    fn test_string_id_display() {
        let id = SessionId::new("ABC123");
        assert_eq!(id.to_string(), "ABC123");
        assert_eq!(id.as_str(), "ABC123");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&RequestId::new(42)).expect("serialize");
        assert_eq!(json, "42");

        let id: NetworkId = serde_json::from_str("\"1000.2\"").expect("parse");
        assert_eq!(id.as_str(), "1000.2");
    }
}
