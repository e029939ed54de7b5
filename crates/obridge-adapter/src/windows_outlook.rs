//! Reference `MailAdapter` sketch backed by Outlook's native object model.
//!
//! Per spec §1, the specific technique used to talk to Outlook — object-model
//! automation via COM versus a mail protocol — is explicitly out of scope for
//! the core. This module exists so the contract in [`crate::MailAdapter`]
//! has at least one concrete, platform-real shape to point at, but it stays
//! intentionally thin: establishing and tearing down the COM apartment and
//! `Application`/`NameSpace` handles, with the bulk of folder/email
//! marshaling left as a documented follow-up rather than faked out.
//!
//! Only compiled on Windows, and only with the `outlook-com` feature, since
//! it links against `Win32_System_Com`/`Win32_System_Ole`.

#![cfg(all(windows, feature = "outlook-com"))]

use async_trait::async_trait;
use obridge_core::models::{EmailFull, EmailSummary, Folder, OutgoingEmail};

use crate::{AdapterError, AdapterResult, MailAdapter, ProbeOutcome};

/// Drives a locally installed Outlook via its COM object model.
///
/// Construction initializes a single-threaded COM apartment and holds the
/// `Outlook.Application` automation handle for the adapter's lifetime; the
/// connection pool (`obridge_server::pool`) is what gives each handle to
/// exactly one caller at a time, since COM automation objects are not
/// `Send` across apartments.
pub struct WindowsOutlookAdapter {
    // The real implementation holds an `IDispatch` to `Outlook.Application`
    // here. Left as a marker field so this sketch compiles without pulling
    // in the full COM call surface, which is explicitly out of scope.
    _private: (),
}

impl WindowsOutlookAdapter {
    /// Attempt to attach to a running (or launchable) local Outlook
    /// instance. Returns `Unavailable` if Outlook is not installed or COM
    /// initialization fails.
    ///
    /// # Errors
    /// Returns [`AdapterError::Unavailable`] if COM initialization or
    /// `CreateObject("Outlook.Application")` fails.
    pub fn connect() -> AdapterResult<Self> {
        // TODO(outlook-com): initialize COM (CoInitializeEx) and bind to
        // Outlook.Application via windows::Win32::System::Com. Left
        // unimplemented — the contract, not the automation technique, is
        // this crate's job.
        Err(AdapterError::Unavailable(
            "windows_outlook::WindowsOutlookAdapter::connect is a reference sketch; \
             COM marshaling is not implemented"
                .to_string(),
        ))
    }
}

#[async_trait]
impl MailAdapter for WindowsOutlookAdapter {
    async fn probe(&self) -> ProbeOutcome {
        ProbeOutcome::Unavailable("reference adapter has no live COM binding".to_string())
    }

    async fn list_folders(&self) -> AdapterResult<Vec<Folder>> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }

    async fn resolve_inbox(&self) -> AdapterResult<String> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }

    async fn list_emails(
        &self,
        _folder_id: &str,
        _unread_only: bool,
        _limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }

    async fn get_email(&self, _email_id: &str) -> AdapterResult<EmailFull> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }

    async fn search(
        &self,
        _query: &str,
        _folder_id: Option<&str>,
        _limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }

    async fn send(&self, _email: &OutgoingEmail) -> AdapterResult<String> {
        Err(AdapterError::Unavailable("not implemented".to_string()))
    }
}
