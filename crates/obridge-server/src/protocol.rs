//! JSON-RPC 2.0 envelope, session handshake state machine, and frame
//! decoding. See spec §4.6 and §6. Deliberately hand-rolled rather than
//! built on an off-the-shelf RPC crate — the spec scopes framing and the
//! session state machine as core (§1), not a transport concern.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC `id`: a string or an integer, never omitted on anything that
/// expects a reply. Requests that omit `id` are notifications (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

/// One inbound call. `params` defaults to `{}` so methods with no
/// arguments (`get_folders`) don't require callers to send `"params":{}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Value,
}

fn protocol_version() -> String {
    "2.0".to_string()
}

fn default_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl JsonRpcRequest {
    /// A request with no `id` is a notification: it runs through the
    /// handler but produces no response (spec §4.6).
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// One outbound reply. Carries exactly one of `result`/`error`, matching
/// spec §3's envelope invariant.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: JsonRpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub const fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub const fn failure(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Wire shape of a JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<crate::error_map::ErrorData>,
}

/// Parses one line-transport frame. The core's minimum contract supports
/// no batching: a top-level JSON array is rejected with `invalid_request`
/// even though it would otherwise deserialize (spec §4.6).
///
/// # Errors
/// Returns a human-readable message on malformed JSON, a non-object/array
/// top-level value, or an array (batching) payload.
pub fn decode_frame(raw: &str) -> Result<JsonRpcRequest, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("malformed JSON: {e}"))?;
    if value.is_array() {
        return Err("batch requests are not supported".to_string());
    }
    serde_json::from_value(value).map_err(|e| format!("malformed JSON-RPC envelope: {e}"))
}

/// Serializes a response back to one line-transport frame (no trailing
/// newline — the transport appends that).
#[must_use]
pub fn encode_frame(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#
            .to_string()
    })
}

/// Per-connection session state. Spec §4.6: `new → initializing → ready →
/// closing → closed`. The first call on a connection must be `initialize`;
/// anything else fails with `session_uninitialized` until that lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Initializing,
    Ready,
    Closing,
    Closed,
}

/// Per-connection state negotiated at handshake time (spec §3 `Session`).
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state_inner: Option<SessionState>,
    pub peer_name: Option<String>,
    pub peer_version: Option<String>,
    pub negotiated_capabilities: Vec<String>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_inner: Some(SessionState::New),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state_inner.unwrap_or(SessionState::New)
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        matches!(self.state(), SessionState::Ready | SessionState::Closing)
    }

    /// Records a successful `initialize` handshake, moving `new/initializing
    /// → ready`.
    pub fn complete_handshake(&mut self, peer_name: String, peer_version: String, capabilities: Vec<String>) {
        self.peer_name = Some(peer_name);
        self.peer_version = Some(peer_version);
        self.negotiated_capabilities = capabilities;
        self.state_inner = Some(SessionState::Ready);
    }

    /// Begins the `shutdown` method's transition to `closing` (spec §4.6).
    pub fn begin_closing(&mut self) {
        self.state_inner = Some(SessionState::Closing);
    }

    pub fn close(&mut self) {
        self.state_inner = Some(SessionState::Closed);
    }
}
