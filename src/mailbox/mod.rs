//! Mailbox adapter — lists, fetches, and marks messages read.
//!
//! `MailboxSource` is the seam between the pipeline and the external
//! mailbox API. The production implementation is `GmailMailbox`
//! (REST v1); tests inject an in-memory fake.

pub mod content;
pub mod gmail;
pub mod oauth;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailboxError;

pub use content::{ExtractedBody, extract_body};
pub use gmail::GmailMailbox;

// ── Message types ───────────────────────────────────────────────────

/// Opaque handle to a mailbox message, as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: String,
}

/// A single message header.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// A node in the MIME payload tree. Leaf body data is URL-safe base64.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub mime_type: String,
    pub body_data: Option<String>,
    pub parts: Vec<MessagePart>,
}

/// A fully fetched message.
#[derive(Debug, Clone)]
pub struct FullMessage {
    pub id: String,
    pub thread_id: String,
    /// Source-provided short preview.
    pub snippet: String,
    pub headers: Vec<MessageHeader>,
    pub payload: Option<MessagePart>,
    /// Server-side receive timestamp.
    pub internal_timestamp: DateTime<Utc>,
}

impl FullMessage {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

// ── Source trait ────────────────────────────────────────────────────

/// Mailbox API seam — pure I/O, no business logic.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// List unread inbox messages received after `since` (defaults to
    /// 24 hours ago when `None`). Bounded by the adapter's page size.
    async fn list_candidate_messages(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>, MailboxError>;

    /// Fetch a message's full content.
    async fn fetch_full_message(
        &self,
        handle: &MessageHandle,
    ) -> Result<FullMessage, MailboxError>;

    /// Mark a message read. Failures are logged by callers, non-fatal.
    async fn mark_read(&self, handle: &MessageHandle) -> Result<(), MailboxError>;
}
