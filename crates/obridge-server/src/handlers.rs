//! Method handlers (C6): the six mail operations plus the protocol-level
//! `initialize`/`shutdown` methods, expressed in terms of the pool, cache,
//! and rate limiter (C1–C4). See spec §4.5.
//!
//! Every handler is wrapped with: the request deadline, a retry policy for
//! `transient` adapter errors (at most 2 retries, exponential backoff
//! capped at the deadline), and translation of any adapter failure to the
//! closed [`RpcFailure`] set via [`crate::error_map`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use obridge_adapter::AdapterError;
use obridge_core::models::{EmailFull, EmailSummary, Folder, OutgoingEmail};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheValue};
use crate::error_map::{from_adapter_error, RpcFailure};
use crate::lifecycle::{RequestCtx, ServerContext};
use crate::pool::{ReleaseOutcome, SharedAdapter};
use crate::protocol::Session;
use crate::router::{GetEmailParams, InitializeParams, ListEmailsParams, SearchEmailsParams};

const SENT_ITEMS_FOLDER_HINT: &str = "sent";

/// Retries an adapter call up to twice on `Transient` failures, with
/// exponential backoff (50ms, 150ms) capped by the remaining request
/// deadline. Every attempt borrows and releases its own pool handle.
async fn call_adapter<T, F, Fut>(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    context: &'static str,
    op: F,
) -> Result<T, RpcFailure>
where
    F: Fn(SharedAdapter) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    const BACKOFFS: [Duration; 2] = [Duration::from_millis(50), Duration::from_millis(150)];
    let mut attempt = 0usize;
    loop {
        let remaining = rctx.remaining();
        if remaining.is_zero() {
            return Err(RpcFailure::Timeout);
        }
        let guard = match ctx.pool.acquire(remaining).await {
            Ok(guard) => guard,
            Err(AdapterError::Timeout) => return Err(RpcFailure::Timeout),
            Err(err) => return Err(from_adapter_error(&err, "pool")),
        };
        let adapter = guard.adapter().clone();
        let outcome = match tokio::time::timeout(remaining, op(adapter)).await {
            Ok(result) => result,
            Err(_) => {
                guard.release(ReleaseOutcome::Timeout);
                return Err(RpcFailure::Timeout);
            }
        };
        match outcome {
            Ok(value) => {
                guard.release(ReleaseOutcome::Healthy);
                return Ok(value);
            }
            Err(AdapterError::Unavailable(reason)) => {
                guard.release(ReleaseOutcome::Unavailable);
                return Err(RpcFailure::Unavailable(reason));
            }
            Err(AdapterError::Timeout) => {
                guard.release(ReleaseOutcome::Timeout);
                return Err(RpcFailure::Timeout);
            }
            Err(err) if err.is_retryable() && attempt < BACKOFFS.len() => {
                guard.release(ReleaseOutcome::Healthy);
                warn!(attempt, "retrying transient adapter failure");
                tokio::time::sleep(BACKOFFS[attempt].min(rctx.remaining())).await;
                attempt += 1;
            }
            Err(err) => {
                guard.release(ReleaseOutcome::Healthy);
                return Err(from_adapter_error(&err, context));
            }
        }
    }
}

async fn admit_rate_limit(ctx: &ServerContext, rctx: &RequestCtx) -> Result<(), RpcFailure> {
    ctx.rate_limiter
        .check(rctx.caller.clone(), rctx.remaining())
        .await
        .map_err(|denied| RpcFailure::RateLimited {
            retry_after: denied.retry_after,
        })
}

/// Runs `fetch` through the layered cache, unwrapping the stored
/// [`CacheValue`] back to `T` with `extract`/`wrap`. The cache's own error
/// channel only carries an opaque [`AdapterError`], so a real failure's
/// [`RpcFailure`] is stashed in `slot` and recovered after the call rather
/// than re-running `fetch` a second time.
async fn cached_fetch<T, Fut>(
    ctx: &ServerContext,
    key: CacheKey,
    wrap: impl FnOnce(T) -> CacheValue,
    extract: impl FnOnce(CacheValue) -> Option<T>,
    fetch: impl FnOnce() -> Fut,
) -> Result<T, RpcFailure>
where
    Fut: Future<Output = Result<T, RpcFailure>>,
{
    let slot: Arc<AsyncMutex<Option<RpcFailure>>> = Arc::new(AsyncMutex::new(None));
    let slot_for_fetch = Arc::clone(&slot);
    let cached = ctx
        .cache
        .get_or_fetch(key, async move {
            match fetch().await {
                Ok(value) => Ok(wrap(value)),
                Err(failure) => {
                    *slot_for_fetch.lock().await = Some(failure);
                    Err(AdapterError::Transient("fetch failed".to_string()))
                }
            }
        })
        .await;

    match cached {
        Ok(value) => extract(value).ok_or_else(|| RpcFailure::Internal("cache returned wrong value kind".to_string())),
        Err(_) => Err(slot
            .lock()
            .await
            .take()
            .unwrap_or(RpcFailure::Internal("fetch failed with no recorded cause".to_string()))),
    }
}

fn emails_to_json(emails: &[EmailSummary]) -> Value {
    serde_json::to_value(emails).unwrap_or(Value::Null)
}

/// `initialize` — the mandatory first call on a connection (spec §4.6).
pub fn handle_initialize(session: &mut Session, params: InitializeParams) -> Value {
    session.complete_handshake(
        params.client_name.clone(),
        params.client_version.clone(),
        params.capabilities.clone(),
    );
    json!({
        "server_name": "outlook-bridge",
        "server_version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "methods": crate::router::KNOWN_METHODS,
        },
    })
}

/// `shutdown` — moves the session to `closing` (spec §4.6). Does not
/// itself stop the server process; that is [`ServerContext::shutdown`].
pub fn handle_shutdown(session: &mut Session) -> Value {
    session.begin_closing();
    json!({ "status": "closing" })
}

/// `get_folders`.
pub async fn handle_get_folders(ctx: &ServerContext, rctx: &RequestCtx) -> Result<Value, RpcFailure> {
    admit_rate_limit(ctx, rctx).await?;
    let folders: Vec<Folder> = cached_fetch(
        ctx,
        CacheKey::Folders,
        CacheValue::Folders,
        |v| match v {
            CacheValue::Folders(f) => Some(f),
            _ => None,
        },
        || call_adapter(ctx, rctx, "folder", |adapter| async move { adapter.list_folders().await }),
    )
    .await?;
    Ok(json!({ "folders": folders }))
}

async fn resolve_inbox_id(ctx: &ServerContext, rctx: &RequestCtx) -> Result<String, RpcFailure> {
    call_adapter(ctx, rctx, "folder", |adapter| async move { adapter.resolve_inbox().await }).await
}

async fn list_emails_inner(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    folder_id: String,
    unread_only: bool,
    limit: u32,
) -> Result<Value, RpcFailure> {
    if !ctx.config.security.folder_permitted(&folder_id) {
        return Err(RpcFailure::PermissionDenied(format!(
            "folder {folder_id} is not permitted by policy"
        )));
    }
    let key = CacheKey::EmailList {
        folder_id: folder_id.clone(),
        unread_only,
        limit,
    };
    let folder_for_fetch = folder_id.clone();
    let emails: Vec<EmailSummary> = cached_fetch(
        ctx,
        key,
        CacheValue::Emails,
        |v| match v {
            CacheValue::Emails(e) => Some(e),
            _ => None,
        },
        || {
            call_adapter(ctx, rctx, "folder", move |adapter| {
                let folder_id = folder_for_fetch.clone();
                async move { adapter.list_emails(&folder_id, unread_only, limit).await }
            })
        },
    )
    .await?;

    Ok(json!({
        "emails": emails_to_json(&emails),
        "total_count": emails.len(),
        "folder": folder_id,
    }))
}

/// `list_inbox_emails` — resolves the default inbox, then delegates to the
/// same free function `list_emails` uses (spec §5 "Reentrancy": handlers
/// never call each other, shared logic lives in a free function).
pub async fn handle_list_inbox_emails(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    params: ListEmailsParams,
) -> Result<Value, RpcFailure> {
    admit_rate_limit(ctx, rctx).await?;
    let folder_id = resolve_inbox_id(ctx, rctx).await?;
    list_emails_inner(ctx, rctx, folder_id, params.unread_only, params.limit).await
}

/// `list_emails(folder_id, unread_only, limit)`.
pub async fn handle_list_emails(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    params: ListEmailsParams,
) -> Result<Value, RpcFailure> {
    admit_rate_limit(ctx, rctx).await?;
    let folder_id = params
        .folder_id
        .ok_or_else(|| RpcFailure::InvalidParams("folder_id is required".to_string()))?;
    list_emails_inner(ctx, rctx, folder_id, params.unread_only, params.limit).await
}

/// `get_email(email_id)`.
pub async fn handle_get_email(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    params: GetEmailParams,
) -> Result<Value, RpcFailure> {
    admit_rate_limit(ctx, rctx).await?;
    let email_id = params.email_id.clone();
    let key = CacheKey::Email {
        email_id: email_id.clone(),
    };
    let mut full: EmailFull = cached_fetch(
        ctx,
        key,
        |full: EmailFull| CacheValue::Email(Box::new(full)),
        |v| match v {
            CacheValue::Email(full) => Some(*full),
            _ => None,
        },
        || {
            call_adapter(ctx, rctx, "email", move |adapter| {
                let email_id = email_id.clone();
                async move { adapter.get_email(&email_id).await }
            })
        },
    )
    .await?;

    if !params.include_body {
        full.body_text.clear();
        full.body_html.clear();
    } else if ctx.config.security.sanitize_html && params.body_format == "html" {
        full.body_html = sanitize_html(&full.body_html);
    }
    if !params.include_attachments {
        full.attachments.clear();
    }

    Ok(json!({ "email": full }))
}

/// Strips active content from an email body before it reaches the caller.
/// Only applied when `security.sanitize_html` is enabled — the core does
/// not sanitize by default (spec §3: "body_html is NOT sanitized by the
/// core").
fn sanitize_html(raw: &str) -> String {
    ammonia::clean(raw)
}

/// `search_emails(query, folder_id?, limit)`.
pub async fn handle_search_emails(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    params: SearchEmailsParams,
) -> Result<Value, RpcFailure> {
    admit_rate_limit(ctx, rctx).await?;
    if let Some(folder_id) = &params.folder_id {
        if !ctx.config.security.folder_permitted(folder_id) {
            return Err(RpcFailure::PermissionDenied(format!(
                "folder {folder_id} is not permitted by policy"
            )));
        }
    }
    let key = CacheKey::Search {
        query: params.query.clone(),
        folder_id: params.folder_id.clone(),
        limit: params.limit,
    };
    let query = params.query.clone();
    let folder_id = params.folder_id.clone();
    let limit = params.limit;
    let emails: Vec<EmailSummary> = cached_fetch(
        ctx,
        key,
        CacheValue::Emails,
        |v| match v {
            CacheValue::Emails(e) => Some(e),
            _ => None,
        },
        || async move {
            call_adapter(ctx, rctx, "search", move |adapter| {
                let query = query.clone();
                let folder_id = folder_id.clone();
                async move { adapter.search(&query, folder_id.as_deref(), limit).await }
            })
            .await
            .map_err(|failure| match failure {
                RpcFailure::Unavailable(reason) => RpcFailure::SearchFailed(reason),
                other => other,
            })
        },
    )
    .await?;

    Ok(json!({
        "emails": emails_to_json(&emails),
        "total_count": emails.len(),
        "query": params.query,
    }))
}

/// `send_email` — no cache involvement. Recipients and attachment paths
/// are validated before admission (spec §4.5); attachment *existence* is
/// checked here since it needs filesystem access, unlike address syntax
/// which the router already validated.
pub async fn handle_send_email(
    ctx: &ServerContext,
    rctx: &RequestCtx,
    email: OutgoingEmail,
) -> Result<Value, RpcFailure> {
    for attachment in &email.attachments {
        let path = std::path::Path::new(&attachment.path);
        if !path.is_file() {
            return Err(RpcFailure::InvalidParams(format!(
                "attachment not readable: {}",
                attachment.path
            )));
        }
        if let Some(max) = ctx.config.security.max_email_size_bytes {
            if let Ok(metadata) = std::fs::metadata(path) {
                if metadata.len() > max {
                    return Err(RpcFailure::InvalidParams(format!(
                        "attachment {} exceeds max_email_size_bytes",
                        attachment.path
                    )));
                }
            }
        }
    }

    admit_rate_limit(ctx, rctx).await?;
    let save_to_sent = email.save_to_sent;
    let email_for_call = email;
    let email_id = call_adapter(ctx, rctx, "send", move |adapter| {
        let email = email_for_call.clone();
        async move { adapter.send(&email).await }
    })
    .await?;

    if save_to_sent {
        ctx.cache.invalidate_folder(SENT_ITEMS_FOLDER_HINT).await;
        debug!("invalidated sent-items listing cache after send");
    }

    Ok(json!({ "email_id": email_id, "status": "sent" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obridge_core::config::Config;
    use obridge_test_helpers::{FixedAdapterFactory, MockAdapter};

    fn test_ctx(adapter: Arc<MockAdapter>) -> Arc<ServerContext> {
        let mut config = Config::default();
        config.pool.min_connections = 0;
        config.pool.max_connections = 2;
        let factory = Arc::new(FixedAdapterFactory::new(adapter));
        ServerContext::new(config, factory)
    }

    fn rctx(ctx: &ServerContext) -> RequestCtx {
        ctx.request_ctx(None, None)
    }

    #[tokio::test]
    async fn get_folders_round_trips_through_cache() {
        let adapter = Arc::new(MockAdapter::with_sample_inbox(2));
        let ctx = test_ctx(adapter.clone());
        ctx.start().await.unwrap();
        let r = rctx(&ctx);
        let first = handle_get_folders(&ctx, &r).await.unwrap();
        let second = handle_get_folders(&ctx, &r).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn list_inbox_emails_resolves_inbox_then_lists() {
        let adapter = Arc::new(MockAdapter::with_sample_inbox(5));
        let ctx = test_ctx(adapter);
        ctx.start().await.unwrap();
        let r = rctx(&ctx);
        let result = handle_list_inbox_emails(
            &ctx,
            &r,
            ListEmailsParams {
                folder_id: None,
                unread_only: false,
                limit: 50,
            },
        )
        .await
        .unwrap();
        assert_eq!(result["emails"].as_array().unwrap().len(), 5);
        assert_eq!(result["folder"], "inbox-1");
    }

    #[tokio::test]
    async fn send_email_rejects_missing_attachment_before_admission() {
        let adapter = Arc::new(MockAdapter::with_sample_inbox(0));
        let ctx = test_ctx(adapter.clone());
        ctx.start().await.unwrap();
        let r = rctx(&ctx);
        let email = OutgoingEmail {
            to: vec!["a@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "hi".to_string(),
            body: "hello".to_string(),
            body_format: obridge_core::models::BodyFormat::Text,
            importance: obridge_core::models::Importance::Normal,
            attachments: vec![obridge_core::models::OutgoingAttachment {
                path: "/nonexistent/path/file.txt".to_string(),
            }],
            save_to_sent: false,
        };
        let err = handle_send_email(&ctx, &r, email).await.unwrap_err();
        assert!(matches!(err, RpcFailure::InvalidParams(_)));
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn get_email_not_found_maps_to_rpc_failure() {
        let adapter = Arc::new(MockAdapter::with_sample_inbox(0));
        let ctx = test_ctx(adapter);
        ctx.start().await.unwrap();
        let r = rctx(&ctx);
        let err = handle_get_email(
            &ctx,
            &r,
            GetEmailParams {
                email_id: "missing".to_string(),
                include_body: true,
                include_attachments: true,
                body_format: "html".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcFailure::NotFoundEmail(_)));
    }

    #[tokio::test]
    async fn pool_exhaustion_yields_timeout_not_hang() {
        let adapter = Arc::new(MockAdapter::with_sample_inbox(1));
        adapter.set_behavior(obridge_test_helpers::MockBehavior {
            call_latency: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let mut config = Config::default();
        config.pool.min_connections = 0;
        config.pool.max_connections = 1;
        config.request_timeout = Duration::from_millis(60);
        let factory = Arc::new(FixedAdapterFactory::new(adapter));
        let ctx = ServerContext::new(config, factory);
        ctx.start().await.unwrap();

        let params = GetEmailParams {
            email_id: "e1".to_string(),
            include_body: true,
            include_attachments: true,
            body_format: "html".to_string(),
        };
        let ctx1 = Arc::clone(&ctx);
        let r1 = ctx.request_ctx(None, None);
        let p1 = params.clone();
        let h1 = tokio::spawn(async move { handle_get_email(&ctx1, &r1, p1).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let r2 = ctx.request_ctx(None, None);
        let result2 = handle_get_email(&ctx, &r2, params).await;
        let _result1 = h1.await.unwrap();
        assert!(matches!(result2, Err(RpcFailure::Timeout)));
    }
}
