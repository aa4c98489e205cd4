//! Event message types.
//!
//! Events are notifications pushed by the browser without a request id.
//! In flatten mode they carry the `sessionId` of the target they came from.
//!
//! # Parsed Event Families
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Network` | `requestWillBeSent`, `requestWillBeSentExtraInfo`, `responseReceived`, `responseReceivedExtraInfo`, `loadingFinished`, `loadingFailed` |
//! | `Browser` | `downloadWillBegin`, `downloadProgress` |
//! | `DOM` | `documentUpdated` |
//! | `Page` | `loadEventFired` |
//! | `Target` | `detachedFromTarget` |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::{NetworkId, SessionId};

// ============================================================================
// Types
// ============================================================================

/// HTTP header map as reported by the protocol.
pub type Headers = FxHashMap<String, String>;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Network.loadingFinished",
///   "params": { "requestId": "1000.7", ... },
///   "sessionId": "6E2C..."
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Session the event belongs to (flatten mode).
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Event {
    /// Creates an event (used by tests and synthetic dispatch).
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, session_id: Option<SessionId>) -> Self {
        Self {
            method: method.into(),
            params,
            session_id,
        }
    }

    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "Network.loadingFinished".into(), .. };
    /// assert_eq!(event.domain(), "Network");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        self.parse_internal()
    }
}

// ============================================================================
// Supporting Types
// ============================================================================

/// Response portion of `Network.responseReceived` (and redirect hops).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseInfo {
    /// Final response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers.
    pub headers: Headers,
    /// MIME type.
    pub mime_type: String,
}

impl ResponseInfo {
    fn from_value(value: &Value) -> Self {
        Self {
            url: str_field(value, "url"),
            status: value
                .get("status")
                .and_then(Value::as_u64)
                .unwrap_or_default() as u16,
            status_text: str_field(value, "statusText"),
            headers: headers_field(value, "headers"),
            mime_type: str_field(value, "mimeType"),
        }
    }
}

/// Download lifecycle state reported by `Browser.downloadProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadState {
    /// Bytes are still arriving.
    InProgress,
    /// File fully written.
    Completed,
    /// Download was cancelled.
    Canceled,
}

impl DownloadState {
    /// Returns `true` for `Completed` and `Canceled`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "canceled" => Self::Canceled,
            _ => Self::InProgress,
        }
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    /// A request is about to be sent.
    RequestWillBeSent {
        /// Network request id.
        request_id: NetworkId,
        /// Request URL.
        url: String,
        /// HTTP method.
        method: String,
        /// Request headers.
        headers: Headers,
        /// Request body, when the browser inlines it.
        post_data: Option<String>,
        /// Whether a body exists even if not inlined.
        has_post_data: bool,
        /// Resource type (`Document`, `XHR`, `Fetch`, ...).
        resource_type: String,
        /// Frame the request belongs to.
        frame_id: String,
        /// Previous hop's response when this is a redirect.
        redirect_response: Option<ResponseInfo>,
    },

    /// Raw request headers as sent on the wire.
    RequestWillBeSentExtraInfo {
        /// Network request id.
        request_id: NetworkId,
        /// Wire-level request headers.
        headers: Headers,
    },

    /// Response headers received.
    ResponseReceived {
        /// Network request id.
        request_id: NetworkId,
        /// Resource type.
        resource_type: String,
        /// Response data.
        response: ResponseInfo,
    },

    /// Raw response headers as received on the wire.
    ResponseReceivedExtraInfo {
        /// Network request id.
        request_id: NetworkId,
        /// Wire-level status code.
        status_code: u16,
        /// Wire-level response headers.
        headers: Headers,
    },

    /// Request finished loading.
    LoadingFinished {
        /// Network request id.
        request_id: NetworkId,
        /// Bytes received over the wire.
        encoded_data_length: f64,
    },

    /// Request failed.
    LoadingFailed {
        /// Network request id.
        request_id: NetworkId,
        /// Browser's error text (`net::ERR_...`).
        error_text: String,
        /// Whether the request was cancelled.
        canceled: bool,
        /// Blocking reason, if blocked.
        blocked_reason: Option<String>,
    },

    /// A download is about to start.
    DownloadWillBegin {
        /// Download guid.
        guid: String,
        /// Download URL.
        url: String,
        /// Name suggested by the server.
        suggested_filename: String,
        /// Frame that started it.
        frame_id: String,
    },

    /// Download progress update.
    DownloadProgress {
        /// Download guid.
        guid: String,
        /// Total bytes expected (0 when unknown).
        total_bytes: u64,
        /// Bytes received so far.
        received_bytes: u64,
        /// Current state.
        state: DownloadState,
        /// Final path, reported once completed by newer browsers.
        file_path: Option<String>,
    },

    /// Document was replaced; all node ids are void.
    DocumentUpdated,

    /// Page `load` event fired.
    LoadEventFired,

    /// A flatten-mode session was detached.
    DetachedFromTarget {
        /// Session that went away.
        session_id: SessionId,
    },

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Event Parsing Implementation
// ============================================================================

impl Event {
    /// Internal parsing implementation.
    fn parse_internal(&self) -> ParsedEvent {
        let p = &self.params;

        match self.method.as_str() {
            "Network.requestWillBeSent" => {
                let request = p.get("request").unwrap_or(&Value::Null);
                ParsedEvent::RequestWillBeSent {
                    request_id: self.get_network_id(),
                    url: str_field(request, "url"),
                    method: str_field_or(request, "method", "GET"),
                    headers: headers_field(request, "headers"),
                    post_data: request
                        .get("postData")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    has_post_data: request
                        .get("hasPostData")
                        .and_then(Value::as_bool)
                        .unwrap_or_default(),
                    resource_type: str_field_or(p, "type", "Other"),
                    frame_id: str_field(p, "frameId"),
                    redirect_response: p
                        .get("redirectResponse")
                        .filter(|v| v.is_object())
                        .map(ResponseInfo::from_value),
                }
            }

            "Network.requestWillBeSentExtraInfo" => ParsedEvent::RequestWillBeSentExtraInfo {
                request_id: self.get_network_id(),
                headers: headers_field(p, "headers"),
            },

            "Network.responseReceived" => ParsedEvent::ResponseReceived {
                request_id: self.get_network_id(),
                resource_type: str_field_or(p, "type", "Other"),
                response: ResponseInfo::from_value(p.get("response").unwrap_or(&Value::Null)),
            },

            "Network.responseReceivedExtraInfo" => ParsedEvent::ResponseReceivedExtraInfo {
                request_id: self.get_network_id(),
                status_code: p
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u16,
                headers: headers_field(p, "headers"),
            },

            "Network.loadingFinished" => ParsedEvent::LoadingFinished {
                request_id: self.get_network_id(),
                encoded_data_length: p
                    .get("encodedDataLength")
                    .and_then(Value::as_f64)
                    .unwrap_or_default(),
            },

            "Network.loadingFailed" => ParsedEvent::LoadingFailed {
                request_id: self.get_network_id(),
                error_text: str_field(p, "errorText"),
                canceled: p
                    .get("canceled")
                    .and_then(Value::as_bool)
                    .unwrap_or_default(),
                blocked_reason: p
                    .get("blockedReason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },

            "Browser.downloadWillBegin" | "Page.downloadWillBegin" => {
                ParsedEvent::DownloadWillBegin {
                    guid: str_field(p, "guid"),
                    url: str_field(p, "url"),
                    suggested_filename: str_field(p, "suggestedFilename"),
                    frame_id: str_field(p, "frameId"),
                }
            }

            "Browser.downloadProgress" | "Page.downloadProgress" => ParsedEvent::DownloadProgress {
                guid: str_field(p, "guid"),
                total_bytes: num_as_u64(p, "totalBytes"),
                received_bytes: num_as_u64(p, "receivedBytes"),
                state: DownloadState::from_wire(&str_field(p, "state")),
                file_path: p
                    .get("filePath")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },

            "DOM.documentUpdated" => ParsedEvent::DocumentUpdated,

            "Page.loadEventFired" => ParsedEvent::LoadEventFired,

            "Target.detachedFromTarget" => ParsedEvent::DetachedFromTarget {
                session_id: SessionId::new(str_field(p, "sessionId")),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
                params: self.params.clone(),
            },
        }
    }

    /// Gets the `requestId` param as a network id.
    #[inline]
    fn get_network_id(&self) -> NetworkId {
        NetworkId::new(str_field(&self.params, "requestId"))
    }
}

// ============================================================================
// Field Helpers
// ============================================================================

/// Gets a string field, empty if absent.
#[inline]
fn str_field(value: &Value, key: &str) -> String {
    str_field_or(value, key, "")
}

/// Gets a string field with default.
#[inline]
fn str_field_or(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Byte counts arrive as JSON doubles.
#[inline]
fn num_as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or_default()
}

/// Gets a header object; non-string values are stringified.
fn headers_field(value: &Value, key: &str) -> Headers {
    value
        .get(key)
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn event(method: &str, params: Value) -> Event {
        Event::new(method, params, None)
    }

    #[test]
    fn test_event_envelope() {
        let event: Event = serde_json::from_str(
            r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}, "sessionId": "S9"}"#,
        )
        .expect("parse event");

        assert_eq!(event.domain(), "Page");
        assert_eq!(event.event_name(), "loadEventFired");
        assert_eq!(event.session_id, Some(SessionId::new("S9")));
        assert!(matches!(event.parse(), ParsedEvent::LoadEventFired));
    }

    #[test]
    fn test_request_will_be_sent() {
        let parsed = event(
            "Network.requestWillBeSent",
            json!({
                "requestId": "1000.1",
                "type": "XHR",
                "frameId": "F1",
                "request": {
                    "url": "https://example.com/api",
                    "method": "POST",
                    "headers": {"Content-Type": "application/json", "X-Num": 5},
                    "postData": "{\"a\":1}",
                    "hasPostData": true
                }
            }),
        )
        .parse();

        match parsed {
            ParsedEvent::RequestWillBeSent {
                request_id,
                url,
                method,
                headers,
                post_data,
                resource_type,
                redirect_response,
                ..
            } => {
                assert_eq!(request_id.as_str(), "1000.1");
                assert_eq!(url, "https://example.com/api");
                assert_eq!(method, "POST");
                assert_eq!(headers.get("X-Num").map(String::as_str), Some("5"));
                assert_eq!(post_data.as_deref(), Some("{\"a\":1}"));
                assert_eq!(resource_type, "XHR");
                assert!(redirect_response.is_none());
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_loading_failed() {
        let parsed = event(
            "Network.loadingFailed",
            json!({"requestId": "7", "errorText": "net::ERR_ABORTED", "canceled": true}),
        )
        .parse();

        match parsed {
            ParsedEvent::LoadingFailed {
                error_text,
                canceled,
                blocked_reason,
                ..
            } => {
                assert_eq!(error_text, "net::ERR_ABORTED");
                assert!(canceled);
                assert!(blocked_reason.is_none());
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_download_progress() {
        let parsed = event(
            "Browser.downloadProgress",
            json!({"guid": "g-1", "totalBytes": 200.0, "receivedBytes": 50.0, "state": "inProgress"}),
        )
        .parse();

        match parsed {
            ParsedEvent::DownloadProgress {
                guid,
                total_bytes,
                received_bytes,
                state,
                ..
            } => {
                assert_eq!(guid, "g-1");
                assert_eq!(total_bytes, 200);
                assert_eq!(received_bytes, 50);
                assert_eq!(state, DownloadState::InProgress);
                assert!(!state.is_terminal());
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event() {
        let parsed = event("Custom.thing", json!({"foo": "bar"})).parse();
        match parsed {
            ParsedEvent::Unknown { method, .. } => assert_eq!(method, "Custom.thing"),
            other => panic!("expected Unknown variant, got {other:?}"),
        }
    }
}
