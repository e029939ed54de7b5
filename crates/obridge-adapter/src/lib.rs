//! The `MailAdapter` contract — the operations the bridge core demands from
//! whatever drives the underlying mail store.
//!
//! This crate defines the capability surface only. How a concrete adapter
//! talks to Outlook (COM automation, a mail protocol, or — for tests — an
//! in-memory fixture) is deliberately out of scope for the core; see
//! [`windows_outlook`] for the one reference sketch this crate ships.

pub mod windows_outlook;

use async_trait::async_trait;
use obridge_core::models::{EmailFull, EmailSummary, Folder, OutgoingEmail};
use thiserror::Error;

/// Closed failure taxonomy for adapter operations. The server's error
/// mapper (`obridge_server::error_map`) translates each variant to a
/// JSON-RPC error code; nothing else in the core inspects adapter failures
/// more granularly than this.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("mail store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out")]
    Timeout,

    /// Retryable infrastructure failure — the handler may retry up to the
    /// policy in spec §4.5 (at most 2 attempts, exponential backoff).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable failure distinct from the other named categories.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    /// Whether the handler's retry policy should retry this failure.
    /// Only `Transient` is retried (spec §7).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Outcome of a probe, used by the connection pool's health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Unavailable(String),
}

/// The capability surface the bridge core drives. Every method is
/// synchronous from the caller's point of view — the core handles
/// parallelism and timeouts around these calls (`tokio::task::spawn_blocking`
/// plus a deadline, see `obridge_server::pool`).
#[async_trait]
pub trait MailAdapter: Send + Sync + 'static {
    /// Cheap health check. MUST NOT touch user data.
    async fn probe(&self) -> ProbeOutcome;

    /// Every reachable folder, with `accessible` reflecting permission.
    async fn list_folders(&self) -> AdapterResult<Vec<Folder>>;

    /// The default inbox folder id for the active mail identity.
    async fn resolve_inbox(&self) -> AdapterResult<String>;

    /// Emails in `folder_id`, newest `received_time` first. `limit` is
    /// already validated to be in `[1, 1000]` by the router.
    async fn list_emails(
        &self,
        folder_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>>;

    /// Full email by id. `NotFound` if the id doesn't resolve,
    /// `PermissionDenied` if the store refuses access.
    async fn get_email(&self, email_id: &str) -> AdapterResult<EmailFull>;

    /// Opaque query, passed through to the store untouched. Empty results
    /// are not an error.
    async fn search(
        &self,
        query: &str,
        folder_id: Option<&str>,
        limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>>;

    /// Deliver through the local mail identity's outgoing pipeline.
    /// Returns the store-assigned id once queued for send.
    async fn send(&self, email: &OutgoingEmail) -> AdapterResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(AdapterError::Transient("x".into()).is_retryable());
        assert!(!AdapterError::Permanent("x".into()).is_retryable());
        assert!(!AdapterError::NotFound("x".into()).is_retryable());
        assert!(!AdapterError::Timeout.is_retryable());
    }
}
