//! Request router (C5): validates method name and parameter shape/ranges,
//! then hands a typed, validated params value to the matching handler in
//! [`crate::handlers`]. See spec §4.5.
//!
//! Handlers never call each other directly (spec §5 "Reentrancy") — any
//! logic two methods share lives here or in a free function, never behind
//! another handler's call.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error_map::RpcFailure;

/// Validated parameters for `list_inbox_emails` / `list_emails`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ListEmailsParams {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const fn default_limit() -> u32 {
    50
}

/// Validated parameters for `get_email`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GetEmailParams {
    pub email_id: String,
    #[serde(default = "default_true")]
    pub include_body: bool,
    #[serde(default = "default_true")]
    pub include_attachments: bool,
    #[serde(default = "default_body_format")]
    pub body_format: String,
}

const fn default_true() -> bool {
    true
}

fn default_body_format() -> String {
    "html".to_string()
}

/// Validated parameters for `search_emails`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchEmailsParams {
    pub query: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Validated parameters for `initialize`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct InitializeParams {
    pub client_name: String,
    pub client_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

const MAX_LIMIT: u32 = 1000;

fn deserialize_params<T: DeserializeOwned>(params: &Value) -> Result<T, RpcFailure> {
    serde_json::from_value(params.clone())
        .map_err(|e| RpcFailure::InvalidParams(format!("malformed params: {e}")))
}

/// `limit` must fall in `[1, 1000]` (spec §4.5, §8 boundary behaviors).
fn validate_limit(limit: u32) -> Result<(), RpcFailure> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(RpcFailure::InvalidParams(format!(
            "limit must be in [1, {MAX_LIMIT}], got {limit}"
        )));
    }
    Ok(())
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), RpcFailure> {
    if value.trim().is_empty() {
        return Err(RpcFailure::InvalidParams(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Cheap syntactic check — not a full RFC 5322 validator, just "looks like
/// an email address." Semantic delivery validity is the store's problem.
#[must_use]
pub fn looks_like_email_address(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn validate_list_emails(params: &Value, folder_required: bool) -> Result<ListEmailsParams, RpcFailure> {
    let parsed: ListEmailsParams = deserialize_params(params)?;
    if folder_required {
        match &parsed.folder_id {
            Some(id) => validate_non_empty("folder_id", id)?,
            None => return Err(RpcFailure::InvalidParams("folder_id is required".to_string())),
        }
    }
    validate_limit(parsed.limit)?;
    Ok(parsed)
}

pub fn validate_get_email(params: &Value) -> Result<GetEmailParams, RpcFailure> {
    let parsed: GetEmailParams = deserialize_params(params)?;
    validate_non_empty("email_id", &parsed.email_id)?;
    Ok(parsed)
}

pub fn validate_search_emails(params: &Value) -> Result<SearchEmailsParams, RpcFailure> {
    let parsed: SearchEmailsParams = deserialize_params(params)?;
    validate_non_empty("query", &parsed.query)?;
    validate_limit(parsed.limit)?;
    Ok(parsed)
}

pub fn validate_send_email(params: &Value) -> Result<obridge_core::models::OutgoingEmail, RpcFailure> {
    let email: obridge_core::models::OutgoingEmail = deserialize_params(params)?;
    if email.recipient_count() == 0 {
        return Err(RpcFailure::InvalidParams(
            "at least one of to/cc/bcc must be non-empty".to_string(),
        ));
    }
    for addr in email.to.iter().chain(&email.cc).chain(&email.bcc) {
        if !looks_like_email_address(addr) {
            return Err(RpcFailure::InvalidParams(format!(
                "not a syntactically valid email address: {addr}"
            )));
        }
    }
    Ok(email)
}

pub fn validate_initialize(params: &Value) -> Result<InitializeParams, RpcFailure> {
    let parsed: InitializeParams = deserialize_params(params)?;
    validate_non_empty("client_name", &parsed.client_name)?;
    Ok(parsed)
}

/// The fixed method name vocabulary. Anything else is `method_not_found`.
pub const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "shutdown",
    "get_folders",
    "list_inbox_emails",
    "list_emails",
    "get_email",
    "search_emails",
    "send_email",
];

#[must_use]
pub fn is_known_method(method: &str) -> bool {
    KNOWN_METHODS.contains(&method)
}
