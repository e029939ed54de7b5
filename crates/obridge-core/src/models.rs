//! Data model for the Outlook JSON-RPC bridge.
//!
//! These types are the stable JSON shape returned to clients. All datetime
//! fields are UTC. Unknown fields on deserialized input are silently
//! ignored by `serde`'s default behavior; the router logs when that
//! happens (see `obridge_server::router`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Folder
// =============================================================================

/// The kind of content a folder holds.
///
/// # Constraints
/// Closed set — a store that exposes something outside this vocabulary
/// reports it as `Other` rather than inventing a new variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderType {
    Mail,
    Calendar,
    Contacts,
    Notes,
    Tasks,
    Other,
}

/// A single mail-store folder.
///
/// # Constraints
/// - `id` uniquely identifies the folder for the lifetime of one server run.
/// - `accessible = false` means operations against this folder MUST fail
///   with a permission error rather than silently returning an empty result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub full_path: String,
    pub parent_id: Option<String>,
    pub item_count: u64,
    pub unread_count: u64,
    pub folder_type: FolderType,
    pub accessible: bool,
    pub has_subfolders: bool,
}

impl Folder {
    /// `unread_count` must never exceed `item_count`; this is the single
    /// invariant check callers that construct `Folder` by hand should run.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        self.unread_count <= self.item_count
    }
}

// =============================================================================
// Email
// =============================================================================

/// Importance flag as surfaced by the underlying store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    Low,
    Normal,
    High,
}

/// Summary view of an email — what listings and search return.
///
/// # Constraints
/// - `received_time` must not be later than "now" plus a small clock-skew
///   tolerance (see [`crate::config::CLOCK_SKEW_TOLERANCE`]).
/// - `body_preview` is best-effort and capped at 255 characters.
/// - `size_bytes == 0` means "unknown," not "empty message" — see
///   [`EmailSummary::size_known`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipients: Vec<String>,
    pub received_time: DateTime<Utc>,
    pub sent_time: DateTime<Utc>,
    pub is_read: bool,
    pub has_attachments: bool,
    pub importance: Importance,
    pub folder_id: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub body_preview: String,
}

impl EmailSummary {
    /// Whether `size_bytes` reflects a real, known size rather than the
    /// sentinel "unknown" value. See spec Open Questions: some store
    /// properties are not always reachable and report `0` in that case.
    #[must_use]
    pub const fn size_known(&self) -> bool {
        self.size_bytes > 0
    }
}

/// A single email attachment's metadata. Content retrieval is out of scope
/// (see spec §9 Open Questions) — only name/size/MIME type are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Full view of an email, returned by `get_email`.
///
/// `body_html` is returned exactly as the store provides it — the core does
/// not sanitize it. An optional sanitizer collaborator (see
/// `obridge_server::handlers::sanitize_html`) is applied only when
/// `security.sanitize_html` is enabled in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailFull {
    #[serde(flatten)]
    pub summary: EmailSummary,
    pub body_text: String,
    pub body_html: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachments: Vec<AttachmentMeta>,
}

// =============================================================================
// Outgoing email
// =============================================================================

/// Body format for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Text,
    Html,
    Rtf,
}

/// An attachment to be sent — a local file path readable by this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingAttachment {
    pub path: String,
}

/// A message to be handed to `MailAdapter::send`.
///
/// # Constraints
/// `to.len() + cc.len() + bcc.len() >= 1`. Every address in `to`/`cc`/`bcc`
/// must be syntactically valid (checked by the router before admission,
/// see `obridge_server::router::validate_send_email`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEmail {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub body_format: BodyFormat,
    #[serde(default = "default_importance")]
    pub importance: Importance,
    #[serde(default)]
    pub attachments: Vec<OutgoingAttachment>,
    #[serde(default)]
    pub save_to_sent: bool,
}

const fn default_importance() -> Importance {
    Importance::Normal
}

impl OutgoingEmail {
    /// Total recipient count across `to`, `cc`, and `bcc`.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_invariant_rejects_unread_over_total() {
        let folder = Folder {
            id: "f1".into(),
            name: "Inbox".into(),
            full_path: "/Inbox".into(),
            parent_id: None,
            item_count: 3,
            unread_count: 4,
            folder_type: FolderType::Mail,
            accessible: true,
            has_subfolders: false,
        };
        assert!(!folder.invariants_hold());
    }

    #[test]
    fn size_known_treats_zero_as_unknown() {
        let summary = EmailSummary {
            id: "1".into(),
            subject: String::new(),
            sender_name: String::new(),
            sender_email: "a@example.com".into(),
            recipients: vec![],
            received_time: Utc::now(),
            sent_time: Utc::now(),
            is_read: false,
            has_attachments: false,
            importance: Importance::Normal,
            folder_id: "f1".into(),
            size_bytes: 0,
            body_preview: String::new(),
        };
        assert!(!summary.size_known());
    }

    #[test]
    fn outgoing_email_recipient_count_sums_all_three_lists() {
        let email = OutgoingEmail {
            to: vec!["a@example.com".into()],
            cc: vec!["b@example.com".into(), "c@example.com".into()],
            bcc: vec![],
            subject: "hi".into(),
            body: "hello".into(),
            body_format: BodyFormat::Text,
            importance: Importance::Normal,
            attachments: vec![],
            save_to_sent: true,
        };
        assert_eq!(email.recipient_count(), 3);
    }
}
