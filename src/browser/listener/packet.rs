//! Captured request/response records.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::identifiers::NetworkId;
use crate::protocol::{Headers, ResponseInfo};

// ============================================================================
// RequestData
// ============================================================================

/// Request side of a [`Packet`].
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Headers as reported with `requestWillBeSent`.
    pub headers: Headers,
    /// Wire-level headers from `requestWillBeSentExtraInfo`, if any.
    pub extra_headers: Option<Headers>,
    /// Request body when the browser inlines it.
    pub post_data: Option<String>,
    /// Whether a body exists even if not inlined.
    pub has_post_data: bool,
    /// Resource type (`Document`, `XHR`, `Fetch`, ...).
    pub resource_type: String,
    /// Frame the request belongs to.
    pub frame_id: String,
}

// ============================================================================
// ResponseData
// ============================================================================

/// Response side of a [`Packet`].
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    /// Final response URL.
    pub url: String,
    /// HTTP status.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// Headers as reported with `responseReceived`.
    pub headers: Headers,
    /// Wire-level headers from `responseReceivedExtraInfo`, if any.
    pub extra_headers: Option<Headers>,
    /// MIME type.
    pub mime_type: String,
    /// Body exactly as `Network.getResponseBody` returned it.
    pub raw_body: Option<String>,
    /// Whether `raw_body` is base64.
    pub base64_encoded: bool,
    /// Decoded body bytes.
    body: Option<Vec<u8>>,
}

impl ResponseData {
    pub(crate) fn from_info(info: ResponseInfo) -> Self {
        Self {
            url: info.url,
            status: info.status,
            status_text: info.status_text,
            headers: info.headers,
            mime_type: info.mime_type,
            ..Self::default()
        }
    }

    /// Stores a fetched body, decoding base64 when flagged.
    ///
    /// A body that fails to decode keeps its raw form only.
    pub(crate) fn set_body(&mut self, raw: String, base64_encoded: bool) {
        self.body = if base64_encoded {
            STANDARD.decode(raw.as_bytes()).ok()
        } else {
            Some(raw.clone().into_bytes())
        };
        self.raw_body = Some(raw);
        self.base64_encoded = base64_encoded;
    }

    /// Decoded body bytes, if the body was fetched.
    #[inline]
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Body parsed as JSON, if it is valid JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }

    /// Header lookup, case-insensitive, preferring wire-level headers.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(self.extra_headers.as_ref(), name)
            .or_else(|| find_header(Some(&self.headers), name))
    }
}

fn find_header<'a>(headers: Option<&'a Headers>, name: &str) -> Option<&'a str> {
    headers?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

// ============================================================================
// FailInfo
// ============================================================================

/// Failure details from `Network.loadingFailed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailInfo {
    /// Browser error text (`net::ERR_...`).
    pub error_text: String,
    /// Whether the request was cancelled.
    pub canceled: bool,
    /// Blocking reason, if blocked.
    pub blocked_reason: Option<String>,
}

// ============================================================================
// RedirectHop
// ============================================================================

/// An earlier hop of a redirect chain.
#[derive(Debug, Clone, Default)]
pub struct RedirectHop {
    /// Request as sent for this hop.
    pub request: RequestData,
    /// The 3xx response that ended it.
    pub response: ResponseData,
}

// ============================================================================
// Packet
// ============================================================================

/// One request's correlated record.
///
/// Identity is the protocol request id. A redirect chain stays one packet:
/// `request` and `response` describe the last hop and `redirects` holds the
/// earlier ones, oldest first.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Protocol request id.
    pub request_id: NetworkId,
    /// Request side.
    pub request: RequestData,
    /// Response side, once received.
    pub response: Option<ResponseData>,
    /// Failure side, once failed.
    pub fail_info: Option<FailInfo>,
    /// Hops that ended in a redirect before `request`.
    pub redirects: Vec<RedirectHop>,
    /// Bytes received over the wire, once finished.
    pub encoded_data_length: Option<f64>,
}

impl Packet {
    pub(crate) fn new(request_id: NetworkId, request: RequestData) -> Self {
        Self {
            request_id,
            request,
            response: None,
            fail_info: None,
            redirects: Vec::new(),
            encoded_data_length: None,
        }
    }

    /// Returns `true` if the request was redirected at least once.
    #[inline]
    #[must_use]
    pub fn is_redirected(&self) -> bool {
        !self.redirects.is_empty()
    }

    /// URL of the first hop; equals [`Packet::url`] without redirects.
    #[must_use]
    pub fn original_url(&self) -> &str {
        self.redirects
            .first()
            .map_or(self.request.url.as_str(), |hop| hop.request.url.as_str())
    }

    /// Returns `true` once a response or a failure is present.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.response.is_some() || self.fail_info.is_some()
    }

    /// Returns `true` if the request failed.
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.fail_info.is_some()
    }

    /// Request URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// HTTP method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.request.method
    }

    /// Response status, if a response arrived.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_plain_body() {
        let mut response = ResponseData::default();
        response.set_body(r#"{"ok":true}"#.to_string(), false);

        assert_eq!(response.text().as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(response.json(), Some(json!({"ok": true})));
        assert!(!response.base64_encoded);
    }

    #[test]
    fn test_base64_body_is_decoded() {
        let mut response = ResponseData::default();
        response.set_body("aGVsbG8=".to_string(), true);

        assert_eq!(response.body(), Some(&b"hello"[..]));
        assert_eq!(response.raw_body.as_deref(), Some("aGVsbG8="));
        assert!(response.json().is_none());
    }

    #[test]
    fn test_bad_base64_keeps_raw_only() {
        let mut response = ResponseData::default();
        response.set_body("%%%".to_string(), true);

        assert!(response.body().is_none());
        assert_eq!(response.raw_body.as_deref(), Some("%%%"));
    }

    #[test]
    fn test_header_lookup_prefers_extra() {
        let mut response = ResponseData::default();
        response
            .headers
            .insert("Content-Type".to_string(), "text/plain".to_string());
        assert_eq!(response.header("content-type"), Some("text/plain"));

        let mut extra = Headers::default();
        extra.insert("content-type".to_string(), "text/html".to_string());
        response.extra_headers = Some(extra);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn test_completion_flags() {
        let mut packet = Packet::new(NetworkId::new("1"), RequestData::default());
        assert!(!packet.is_complete());

        packet.fail_info = Some(FailInfo {
            error_text: "net::ERR_ABORTED".to_string(),
            canceled: true,
            blocked_reason: None,
        });
        assert!(packet.is_complete());
        assert!(packet.is_failed());
        assert!(packet.status().is_none());
    }
}
