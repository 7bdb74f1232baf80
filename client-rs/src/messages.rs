//! JSON-RPC 2.0 message types for the Minecraft Server Management Protocol
//!
//! Outbound frames are [`Request`]s (a request with id 0 is a notification).
//! Inbound frames decode into a [`Frame`]: either a [`Response`] correlated by
//! id, or a [`ServerNotification`] pushed by the server.

use crate::error::{MsmpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Correlation id linking a request to its response
pub type RequestId = u64;

/// Id reserved for notifications, which never receive a response
pub const NOTIFICATION_ID: RequestId = 0;

pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request. `params` is normalized: `null` is omitted from the
    /// frame, arrays and objects pass through, a scalar becomes `[scalar]`.
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params: normalize_params(params),
        }
    }

    /// Build a notification (id 0)
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::new(NOTIFICATION_ID, method, params)
    }

    pub fn is_notification(&self) -> bool {
        self.id == NOTIFICATION_ID
    }

    /// Serialize into one text frame
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn normalize_params(params: Value) -> Option<Value> {
    match params {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(params),
        scalar => Some(Value::Array(vec![scalar])),
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, " ({})", data)?;
        }
        Ok(())
    }
}

/// Response to a correlated request
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success { id: RequestId, result: Value },
    Failure { id: RequestId, error: RpcError },
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Response::Success { id, result }
    }

    pub fn failure(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Response::Failure {
            id,
            error: RpcError {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Response::Success { id, .. } | Response::Failure { id, .. } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Convert into the result value, mapping a failure to [`MsmpError::Server`]
    pub fn into_result(self) -> Result<Value> {
        match self {
            Response::Success { result, .. } => Ok(result),
            Response::Failure { error, .. } => Err(MsmpError::Server(error)),
        }
    }

    /// Serialize into one text frame
    pub fn to_frame(&self) -> Result<String> {
        let value = match self {
            Response::Success { id, result } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result,
            }),
            Response::Failure { id, error } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": error,
            }),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

/// Notification pushed by the server (no id, no reply expected)
#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotification {
    pub method: String,
    pub params: Option<Value>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Response(Response),
    Notification(ServerNotification),
}

/// Loose shape used to classify inbound frames before building the typed value
#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl Frame {
    /// Decode one text frame.
    ///
    /// A frame with an `error` member is a failure response. A frame with a
    /// `method` and no `result` is a server notification. Anything else is a
    /// success response; a missing id decodes as 0, which never correlates.
    pub fn decode(text: &str) -> Result<Frame> {
        let raw: RawFrame = serde_json::from_str(text)
            .map_err(|e| MsmpError::Protocol(format!("malformed frame: {}", e)))?;
        let id = raw.id.unwrap_or(NOTIFICATION_ID);

        if let Some(error) = raw.error {
            return Ok(Frame::Response(Response::Failure { id, error }));
        }

        match (raw.method, raw.result) {
            (Some(method), None) => Ok(Frame::Notification(ServerNotification {
                method,
                params: raw.params,
            })),
            (_, result) => Ok(Frame::Response(Response::Success {
                id,
                result: result.unwrap_or(Value::Null),
            })),
        }
    }
}
