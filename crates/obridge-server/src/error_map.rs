//! Maps internal failure kinds to the stable JSON-RPC error shape clients
//! see on the wire. See spec §4.8 — this module implements that table
//! verbatim, including `retry_after` population for `rate_limited`.

use std::time::Duration;

use serde::Serialize;

use crate::protocol::JsonRpcError;

/// The closed set of internal failure kinds the bridge ever returns to a
/// caller. Adapter errors, router validation, and protocol framing errors
/// all funnel through this enum before becoming wire bytes.
#[derive(Debug, Clone)]
pub enum RpcFailure {
    InvalidRequest(String),
    MethodNotFound(String),
    InvalidParams(String),
    Internal(String),
    SessionUninitialized,
    Unavailable(String),
    NotFoundEmail(String),
    NotFoundFolder(String),
    PermissionDenied(String),
    SearchFailed(String),
    Timeout,
    RateLimited { retry_after: Duration },
    Overloaded,
}

impl RpcFailure {
    /// The stable numeric JSON-RPC code. Two kinds share `-32000`
    /// (`SessionUninitialized`, `Overloaded`) — they are distinguished on
    /// the wire by `data.type`, per spec §4.8.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Internal(_) => -32603,
            Self::SessionUninitialized | Self::Overloaded => -32000,
            Self::Unavailable(_) => -32001,
            Self::NotFoundEmail(_) | Self::NotFoundFolder(_) => -32002,
            Self::PermissionDenied(_) => -32004,
            Self::SearchFailed(_) => -32005,
            Self::Timeout => -32006,
            Self::RateLimited { .. } => -32007,
        }
    }

    #[must_use]
    pub const fn data_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::MethodNotFound(_) => "ProtocolError",
            Self::InvalidParams(_) => "ValidationError",
            Self::Internal(_) => "InternalError",
            Self::SessionUninitialized => "SessionError",
            Self::Unavailable(_) => "OutlookConnectionError",
            Self::NotFoundEmail(_) => "EmailNotFoundError",
            Self::NotFoundFolder(_) => "FolderNotFoundError",
            Self::PermissionDenied(_) => "PermissionError",
            Self::SearchFailed(_) => "SearchError",
            Self::Timeout => "TimeoutError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::Overloaded => "Overloaded",
        }
    }

    fn details(&self) -> String {
        match self {
            Self::InvalidRequest(d)
            | Self::MethodNotFound(d)
            | Self::InvalidParams(d)
            | Self::Internal(d)
            | Self::Unavailable(d)
            | Self::NotFoundEmail(d)
            | Self::NotFoundFolder(d)
            | Self::PermissionDenied(d)
            | Self::SearchFailed(d) => d.clone(),
            Self::SessionUninitialized => {
                "the first request on this session must be initialize".to_string()
            }
            Self::Timeout => "the request exceeded its deadline".to_string(),
            Self::RateLimited { .. } => "rate limit exceeded".to_string(),
            Self::Overloaded => "too many concurrent requests".to_string(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvalidRequest(_) => "invalid request".to_string(),
            Self::MethodNotFound(method) => format!("method not found: {method}"),
            Self::InvalidParams(_) => "invalid params".to_string(),
            Self::Internal(_) => "internal error".to_string(),
            Self::SessionUninitialized => "session not initialized".to_string(),
            Self::Unavailable(_) => "mail store unavailable".to_string(),
            Self::NotFoundEmail(_) => "email not found".to_string(),
            Self::NotFoundFolder(_) => "folder not found".to_string(),
            Self::PermissionDenied(_) => "permission denied".to_string(),
            Self::SearchFailed(_) => "search failed".to_string(),
            Self::Timeout => "request timed out".to_string(),
            Self::RateLimited { .. } => "rate limited".to_string(),
            Self::Overloaded => "server overloaded".to_string(),
        }
    }

    /// Build the wire `error` object: stable code, short message, and
    /// structured `data` (`type` + `details`, `retry_after` when relevant).
    #[must_use]
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.message(),
            data: Some(ErrorData {
                r#type: self.data_type().to_string(),
                details: self.details(),
                retry_after: match self {
                    Self::RateLimited { retry_after } => Some(retry_after.as_secs_f64()),
                    _ => None,
                },
            }),
        }
    }
}

/// `error.data` shape. Never includes mail content or file paths beyond
/// what the caller already supplied (spec §7).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub r#type: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

/// Translates an adapter-layer failure into the closed `RpcFailure` set.
/// Called by handlers right after an adapter call returns an error — never
/// by the router or protocol layer, which produce their own kinds directly.
#[must_use]
pub fn from_adapter_error(err: &obridge_adapter::AdapterError, context: &str) -> RpcFailure {
    use obridge_adapter::AdapterError as AE;
    match err {
        AE::Unavailable(reason) => RpcFailure::Unavailable(reason.clone()),
        AE::NotFound(id) => {
            if context == "email" {
                RpcFailure::NotFoundEmail(id.clone())
            } else {
                RpcFailure::NotFoundFolder(id.clone())
            }
        }
        AE::PermissionDenied(reason) => RpcFailure::PermissionDenied(reason.clone()),
        AE::InvalidArgument(reason) => RpcFailure::InvalidParams(reason.clone()),
        AE::Timeout => RpcFailure::Timeout,
        AE::Transient(reason) | AE::Permanent(reason) if context == "search" => {
            RpcFailure::SearchFailed(reason.clone())
        }
        AE::Transient(reason) | AE::Permanent(reason) => RpcFailure::Internal(reason.clone()),
    }
}
