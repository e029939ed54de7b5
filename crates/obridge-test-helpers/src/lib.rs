//! Shared fixtures for exercising the bridge without a live Outlook install.
//!
//! `MockAdapter` implements `obridge_adapter::MailAdapter` entirely in
//! memory, with knobs to inject latency, probe failures, and per-call
//! outcomes — enough to drive every scenario in spec §8 (pool exhaustion
//! timeouts, `unavailable` then reconnect, rate-limit denial under load).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use obridge_adapter::{AdapterError, AdapterResult, MailAdapter, ProbeOutcome};
use obridge_core::models::{EmailFull, EmailSummary, Folder, FolderType, Importance, OutgoingEmail};
use obridge_server::pool::{AdapterFactory, SharedAdapter};

/// Builds a default inbox folder plus `n` synthetic emails, useful for
/// quick handler/cache tests that don't care about fixture shape.
#[must_use]
pub fn sample_inbox(n: usize) -> (Folder, Vec<EmailSummary>) {
    let folder = Folder {
        id: "inbox-1".to_string(),
        name: "Inbox".to_string(),
        full_path: "/Inbox".to_string(),
        parent_id: None,
        item_count: n as u64,
        unread_count: (n / 2) as u64,
        folder_type: FolderType::Mail,
        accessible: true,
        has_subfolders: false,
    };
    let emails = (0..n)
        .map(|i| EmailSummary {
            id: format!("email-{i}"),
            subject: format!("Subject {i}"),
            sender_name: "Sender Name".to_string(),
            sender_email: "sender@example.com".to_string(),
            recipients: vec!["me@example.com".to_string()],
            received_time: Utc::now(),
            sent_time: Utc::now(),
            is_read: i % 2 == 0,
            has_attachments: false,
            importance: Importance::Normal,
            folder_id: folder.id.clone(),
            size_bytes: 1024,
            body_preview: format!("preview {i}"),
        })
        .collect();
    (folder, emails)
}

/// Controls for how [`MockAdapter`] behaves, set up front by a test.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Artificial per-call latency, to exercise pool exhaustion / timeouts.
    pub call_latency: Option<Duration>,
    /// If set, `probe()` reports unavailable with this reason.
    pub probe_unavailable: Option<String>,
    /// If set, every data-returning call fails with this error once, then
    /// the override is cleared (simulates a one-shot transient failure).
    pub fail_once_with: Option<AdapterError>,
}

/// An in-memory `MailAdapter` fixture. Folders/emails are seeded up front;
/// `send` appends to an internal "Sent Items" list so tests can assert on
/// what was queued for delivery.
pub struct MockAdapter {
    folders: Vec<Folder>,
    emails_by_folder: Mutex<HashMap<String, Vec<EmailSummary>>>,
    full_by_id: Mutex<HashMap<String, EmailFull>>,
    sent: Mutex<Vec<OutgoingEmail>>,
    behavior: Mutex<MockBehavior>,
    call_count: AtomicU64,
    next_id: AtomicU64,
}

impl MockAdapter {
    #[must_use]
    pub fn new(folders: Vec<Folder>, emails_by_folder: HashMap<String, Vec<EmailSummary>>) -> Self {
        Self {
            folders,
            emails_by_folder: Mutex::new(emails_by_folder),
            full_by_id: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            behavior: Mutex::new(MockBehavior::default()),
            call_count: AtomicU64::new(0),
            next_id: AtomicU64::new(1000),
        }
    }

    /// Convenience constructor: one inbox with `n` synthetic emails.
    #[must_use]
    pub fn with_sample_inbox(n: usize) -> Self {
        let (folder, emails) = sample_inbox(n);
        let mut map = HashMap::new();
        map.insert(folder.id.clone(), emails);
        Self::new(vec![folder], map)
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Total number of adapter calls made so far (any method), for
    /// asserting single-flight / cache-hit behavior.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Emails handed to `send()` so far, in order.
    #[must_use]
    pub fn sent_emails(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn seed_full_email(&self, email: EmailFull) {
        self.full_by_id
            .lock()
            .unwrap()
            .insert(email.summary.id.clone(), email);
    }

    async fn simulate_latency(&self) {
        let latency = self.behavior.lock().unwrap().call_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_one_shot_failure(&self) -> Option<AdapterError> {
        let mut behavior = self.behavior.lock().unwrap();
        behavior.fail_once_with.take()
    }
}

#[async_trait]
impl MailAdapter for MockAdapter {
    async fn probe(&self) -> ProbeOutcome {
        match self.behavior.lock().unwrap().probe_unavailable.clone() {
            Some(reason) => ProbeOutcome::Unavailable(reason),
            None => ProbeOutcome::Ok,
        }
    }

    async fn list_folders(&self) -> AdapterResult<Vec<Folder>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        if let Some(err) = self.take_one_shot_failure() {
            return Err(err);
        }
        Ok(self.folders.clone())
    }

    async fn resolve_inbox(&self) -> AdapterResult<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        self.folders
            .iter()
            .find(|f| f.folder_type == FolderType::Mail)
            .map(|f| f.id.clone())
            .ok_or_else(|| AdapterError::NotFound("no mail folder".to_string()))
    }

    async fn list_emails(
        &self,
        folder_id: &str,
        unread_only: bool,
        limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        if let Some(err) = self.take_one_shot_failure() {
            return Err(err);
        }
        let emails = self.emails_by_folder.lock().unwrap();
        let Some(list) = emails.get(folder_id) else {
            return Err(AdapterError::NotFound(format!("folder {folder_id}")));
        };
        let mut filtered: Vec<_> = list
            .iter()
            .filter(|e| !unread_only || !e.is_read)
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.received_time.cmp(&a.received_time));
        filtered.truncate(limit as usize);
        Ok(filtered)
    }

    async fn get_email(&self, email_id: &str) -> AdapterResult<EmailFull> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        if let Some(err) = self.take_one_shot_failure() {
            return Err(err);
        }
        self.full_by_id
            .lock()
            .unwrap()
            .get(email_id)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(email_id.to_string()))
    }

    async fn search(
        &self,
        query: &str,
        folder_id: Option<&str>,
        limit: u32,
    ) -> AdapterResult<Vec<EmailSummary>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        let emails = self.emails_by_folder.lock().unwrap();
        let mut matches: Vec<EmailSummary> = emails
            .iter()
            .filter(|(fid, _)| folder_id.is_none_or(|want| want == fid.as_str()))
            .flat_map(|(_, list)| list.iter().cloned())
            .filter(|e| e.subject.contains(query) || e.body_preview.contains(query))
            .collect();
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn send(&self, email: &OutgoingEmail) -> AdapterResult<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        if let Some(err) = self.take_one_shot_failure() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(email.clone());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(format!("sent-{id}"))
    }
}

/// An [`AdapterFactory`] that always hands back the same adapter instance.
/// Used by `obridge-server`'s own tests and by `ServerContext` construction
/// in integration tests, where a test wants one shared `MockAdapter` it can
/// keep asserting against rather than a fresh instance per pool slot.
pub struct FixedAdapterFactory {
    adapter: SharedAdapter,
}

impl FixedAdapterFactory {
    #[must_use]
    pub fn new(adapter: SharedAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl AdapterFactory for FixedAdapterFactory {
    async fn create(&self) -> AdapterResult<SharedAdapter> {
        Ok(self.adapter.clone())
    }
}
