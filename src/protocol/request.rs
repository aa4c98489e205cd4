//! Request and Response message types.
//!
//! Defines the command envelope sent to the browser and the response
//! envelope correlated back to it by `id`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Request
// ============================================================================

/// A command request from the client to the browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 12,
///   "method": "DOM.querySelectorAll",
///   "params": { "nodeId": 1, "selector": "a" },
///   "sessionId": "6E2C..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Correlation id, unique among pending requests.
    pub id: RequestId,

    /// Protocol method in `Domain.method` form.
    pub method: String,

    /// Method parameters; always an object on the wire.
    pub params: Value,

    /// Flatten-mode session the command targets.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Request {
    /// Creates a new request.
    ///
    /// `Null` params are normalised to an empty object.
    #[inline]
    #[must_use]
    pub fn new(
        id: RequestId,
        method: impl Into<String>,
        params: Value,
        session_id: Option<SessionId>,
    ) -> Self {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Self {
            id,
            method: method.into(),
            params,
            session_id,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the browser.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 12, "result": { "nodeIds": [4, 9] } }
/// ```
///
/// Error:
/// ```json
/// { "id": 12, "error": { "code": -32000, "message": "Could not find node with given id" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<ResponseError>,

    /// Session the response belongs to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// The `error` object of a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Optional extra detail.
    #[serde(default)]
    pub data: Option<Value>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] carrying the protocol's
    /// `error.message` if the response was an error.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::command_failed(method, error.code, error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
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
    fn test_request_serialization() {
        let request = Request::new(
            RequestId::new(7),
            "DOM.getDocument",
            json!({ "depth": 0 }),
            None,
        );
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "DOM.getDocument");
        assert_eq!(value["params"]["depth"], 0);
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn test_request_with_session() {
        let request = Request::new(
            RequestId::new(1),
            "Network.enable",
            Value::Null,
            Some(SessionId::new("S1")),
        );
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["params"], json!({}));
    }

    #[test]
    fn test_success_response() {
        let response: Response =
            serde_json::from_str(r#"{"id": 3, "result": {"nodeIds": [1, 2]}}"#).expect("parse");
        assert!(!response.is_error());

        let result = response.into_result("DOM.querySelectorAll").expect("success");
        assert_eq!(result["nodeIds"], json!([1, 2]));
    }

    #[test]
    fn test_error_response() {
        let response: Response = serde_json::from_str(
            r#"{"id": 3, "error": {"code": -32000, "message": "No node with given id found"}}"#,
        )
        .expect("parse");
        assert!(response.is_error());

        let err = response.into_result("DOM.resolveNode").unwrap_err();
        match err {
            Error::CommandFailed {
                method,
                code,
                message,
            } => {
                assert_eq!(method, "DOM.resolveNode");
                assert_eq!(code, -32000);
                assert_eq!(message, "No node with given id found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_result_is_null() {
        let response: Response = serde_json::from_str(r#"{"id": 9}"#).expect("parse");
        assert_eq!(response.into_result("Page.enable").expect("ok"), Value::Null);
    }
}
