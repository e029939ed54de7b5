//! Protocol, pooling, rate limiting, caching, and request handling for the
//! Outlook JSON-RPC bridge. A transport (line-based stdio or HTTP, see
//! `obridge-cli`) decodes a frame with [`protocol::decode_frame`], then
//! calls [`dispatch::dispatch`] against a shared [`lifecycle::ServerContext`]
//! and a per-connection [`protocol::Session`].

pub mod cache;
pub mod dispatch;
pub mod error_map;
pub mod handlers;
pub mod lifecycle;
pub mod pool;
pub mod protocol;
pub mod rate_limit;
pub mod router;

pub use dispatch::dispatch;
pub use lifecycle::{HealthSnapshot, LifecycleState, RequestCtx, ServerContext};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, Session};
