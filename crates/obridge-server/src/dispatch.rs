//! Ties the router, handlers, session state machine, and lifecycle
//! admission gate into the one entry point a transport calls per decoded
//! frame. See spec §4.5 "Dispatch" and §4.6 "Session handshake".

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error_map::RpcFailure;
use crate::handlers;
use crate::lifecycle::ServerContext;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, Session};
use crate::rate_limit::CallerKey;
use crate::router;

/// Runs one decoded request to completion. Returns `None` for a
/// notification (no `id`). Only `send_email` runs its side effect when sent
/// as a notification; every other method is dropped before admission (spec
/// §4.6).
pub async fn dispatch(
    ctx: &Arc<ServerContext>,
    session: &mut Session,
    caller: CallerKey,
    client_timeout: Option<Duration>,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone();
    ctx.metrics.requests_received.fetch_add(1, Ordering::Relaxed);

    let result = handle_method(ctx, session, caller, client_timeout, &request).await;

    match &result {
        Ok(_) => ctx.metrics.requests_completed.fetch_add(1, Ordering::Relaxed),
        Err(_) => ctx.metrics.requests_failed.fetch_add(1, Ordering::Relaxed),
    };

    let id = id?;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(failure) => JsonRpcResponse::failure(id, failure.to_json_rpc_error()),
    })
}

async fn handle_method(
    ctx: &Arc<ServerContext>,
    session: &mut Session,
    caller: CallerKey,
    client_timeout: Option<Duration>,
    request: &JsonRpcRequest,
) -> Result<Value, RpcFailure> {
    if !router::is_known_method(&request.method) {
        return Err(RpcFailure::MethodNotFound(request.method.clone()));
    }

    if request.id.is_none() && request.method != "send_email" {
        debug!(method = %request.method, "dropping notification, only send_email runs without a reply");
        return Ok(Value::Null);
    }

    if request.method == "initialize" {
        let params = router::validate_initialize(&request.params)?;
        return Ok(handlers::handle_initialize(session, params));
    }

    if !session.initialized() {
        return Err(RpcFailure::SessionUninitialized);
    }

    if request.method == "shutdown" {
        let response = handlers::handle_shutdown(session);
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move { ctx.shutdown().await });
        return Ok(response);
    }

    let permit = ctx.admit().await.map_err(|_| RpcFailure::Overloaded)?;
    let rctx = ctx.request_ctx(client_timeout, caller);

    let result = match request.method.as_str() {
        "get_folders" => handlers::handle_get_folders(ctx, &rctx).await,
        "list_inbox_emails" => {
            let params = router::validate_list_emails(&request.params, false)?;
            handlers::handle_list_inbox_emails(ctx, &rctx, params).await
        }
        "list_emails" => {
            let params = router::validate_list_emails(&request.params, true)?;
            handlers::handle_list_emails(ctx, &rctx, params).await
        }
        "get_email" => {
            let params = router::validate_get_email(&request.params)?;
            handlers::handle_get_email(ctx, &rctx, params).await
        }
        "search_emails" => {
            let params = router::validate_search_emails(&request.params)?;
            handlers::handle_search_emails(ctx, &rctx, params).await
        }
        "send_email" => {
            let email = router::validate_send_email(&request.params)?;
            handlers::handle_send_email(ctx, &rctx, email).await
        }
        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    };
    drop(permit);
    result
}
