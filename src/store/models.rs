//! Domain records persisted by the store.
//!
//! Metadata bags are typed structs with a small set of known optional
//! fields; unknown keys survive round-trips through the store via
//! `#[serde(flatten)]` so foreign writers are not clobbered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// Outreach state of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailingStatus {
    NotContacted,
    Contacted,
    Sent,
    Replied,
    Bounced,
}

impl EmailingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotContacted => "not_contacted",
            Self::Contacted => "contacted",
            Self::Sent => "sent",
            Self::Replied => "replied",
            Self::Bounced => "bounced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "contacted" => Self::Contacted,
            "sent" => Self::Sent,
            "replied" => Self::Replied,
            "bounced" => Self::Bounced,
            _ => Self::NotContacted,
        }
    }
}

/// Deliverability assessment of a prospect address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailValidity {
    Valid,
    Risky,
    Invalid,
}

impl EmailValidity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Risky => "risky",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "risky" => Self::Risky,
            "invalid" => Self::Invalid,
            _ => Self::Valid,
        }
    }
}

/// Status of a scheduled follow-up send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Scheduled,
    Pending,
    Sent,
    Cancelled,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "sent" => Self::Sent,
            "cancelled" => Self::Cancelled,
            _ => Self::Scheduled,
        }
    }

    /// Scheduled and pending both count as "not yet sent or cancelled".
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Pending)
    }
}

/// Account role, used for notification fan-out and import entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Client,
    Expert,
    Apporteur,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::Expert => "expert",
            Self::Apporteur => "apporteur",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "client" => Some(Self::Client),
            "expert" => Some(Self::Expert),
            "apporteur" => Some(Self::Apporteur),
            _ => None,
        }
    }
}

/// Notification display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        }
    }
}

// ── Prospect ────────────────────────────────────────────────────────

/// Open metadata carried on a prospect row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProspectMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_from_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reply_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reply_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_stopped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounced_at: Option<DateTime<Utc>>,
    /// Unknown keys written by other services pass through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A potential customer contacted via outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    /// Unique, stored lowercase.
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub siren: Option<String>,
    /// Creation provenance ("import_csv", "email_reply", ...).
    pub source: String,
    pub emailing_status: EmailingStatus,
    pub email_validity: EmailValidity,
    pub score_priority: i64,
    pub metadata: ProspectMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a prospect.
#[derive(Debug, Clone)]
pub struct NewProspect {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub siren: Option<String>,
    pub source: String,
    pub emailing_status: EmailingStatus,
    pub email_validity: EmailValidity,
    pub score_priority: i64,
    pub metadata: ProspectMeta,
}

// ── Outbound email records ──────────────────────────────────────────

/// Metadata carried on an outbound email record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_email_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One row per email sent to a prospect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub step: i64,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub replied: bool,
    pub replied_at: Option<DateTime<Utc>>,
    pub bounced: bool,
    pub bounced_at: Option<DateTime<Utc>>,
    pub metadata: OutboundMeta,
}

/// Fields for recording an outbound send.
#[derive(Debug, Clone)]
pub struct NewOutboundEmail {
    pub prospect_id: Uuid,
    pub step: i64,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub metadata: OutboundMeta,
}

/// Snapshot of the inbound message stored on the outbound record when
/// it is marked replied.
#[derive(Debug, Clone)]
pub struct ReplyStamp {
    pub message_id: String,
    pub reply_from: String,
    pub reply_subject: String,
    pub received_email_id: Uuid,
}

// ── Scheduled follow-ups ────────────────────────────────────────────

/// Metadata carried on a scheduled follow-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUpMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_from: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A pending future send in an outreach sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledFollowUp {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub step_number: i64,
    pub scheduled_for: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub metadata: FollowUpMeta,
}

// ── Received emails ─────────────────────────────────────────────────

/// An inbound message archived after being classified as a genuine
/// reply (prospect variant). Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedEmail {
    pub id: Uuid,
    pub prospect_id: Uuid,
    /// The outbound record this reply answered. `None` for prospects
    /// auto-created from an inbound message (no prior outbound exists).
    pub outbound_email_id: Option<Uuid>,
    /// Source message id — the natural idempotency key.
    pub source_message_id: String,
    pub thread_id: String,
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub snippet: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_replied: bool,
}

/// Fields for archiving a prospect reply.
#[derive(Debug, Clone)]
pub struct NewReceivedEmail {
    pub prospect_id: Uuid,
    pub outbound_email_id: Option<Uuid>,
    pub source_message_id: String,
    pub thread_id: String,
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub snippet: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub received_at: DateTime<Utc>,
}

/// Expert↔client variant of a received email.
#[derive(Debug, Clone)]
pub struct NewExpertReceivedEmail {
    pub expert_email_id: Uuid,
    pub expert_id: Uuid,
    pub client_id: Uuid,
    pub client_product_id: Option<Uuid>,
    pub source_message_id: String,
    pub thread_id: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub snippet: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub received_at: DateTime<Utc>,
}

// ── Expert email thread links ───────────────────────────────────────

/// An expert-sent email tracked for reply threading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertEmail {
    pub id: Uuid,
    pub expert_id: Uuid,
    pub client_id: Uuid,
    pub client_product_id: Option<Uuid>,
    pub subject: String,
    /// Outbound SMTP message id, matched against inbound
    /// `In-Reply-To`/`References` headers.
    pub message_id: String,
    /// Only "sent" emails participate in thread matching.
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

/// Fields for recording an expert-sent email.
#[derive(Debug, Clone)]
pub struct NewExpertEmail {
    pub expert_id: Uuid,
    pub client_id: Uuid,
    pub client_product_id: Option<Uuid>,
    pub subject: String,
    pub message_id: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

// ── Profiles (accounts) ─────────────────────────────────────────────

/// A business profile — client, expert, apporteur, or admin account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub siren: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    /// Linked identity-provider account. Profiles without one are
    /// skipped during notification fan-out.
    pub auth_user_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a business profile.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub role: Role,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub siren: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub auth_user_id: Option<String>,
}

// ── Products and client relations ───────────────────────────────────

/// A product a client can be eligible for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
}

/// Fields for a product-eligibility link.
#[derive(Debug, Clone)]
pub struct NewClientProductLink {
    pub client_id: Uuid,
    pub product_id: Uuid,
    pub expert_id: Option<Uuid>,
}

/// Fields for a pre-scheduled appointment.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub client_id: Uuid,
    pub expert_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

/// Fields for an expert assignment.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub client_id: Uuid,
    pub expert_id: Uuid,
}

// ── Notifications ───────────────────────────────────────────────────

/// Structured action attached to a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Fields for creating a notification. Notifications are created,
/// never mutated, by this crate.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub role: Role,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub action: NotificationAction,
}

/// A stored notification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub role: Role,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub is_read: bool,
    pub action: NotificationAction,
    pub created_at: DateTime<Utc>,
}

// ── Import history ──────────────────────────────────────────────────

/// One row per executed import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportHistory {
    pub id: Uuid,
    pub entity_type: Role,
    pub file_name: String,
    pub total_rows: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub skipped_count: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emailing_status_round_trip() {
        for s in [
            EmailingStatus::NotContacted,
            EmailingStatus::Contacted,
            EmailingStatus::Sent,
            EmailingStatus::Replied,
            EmailingStatus::Bounced,
        ] {
            assert_eq!(EmailingStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn follow_up_active_states() {
        assert!(FollowUpStatus::Scheduled.is_active());
        assert!(FollowUpStatus::Pending.is_active());
        assert!(!FollowUpStatus::Sent.is_active());
        assert!(!FollowUpStatus::Cancelled.is_active());
    }

    #[test]
    fn prospect_meta_preserves_unknown_keys() {
        let json = r#"{"last_reply_from":"a@b.com","enrichment_score":42}"#;
        let meta: ProspectMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.last_reply_from.as_deref(), Some("a@b.com"));
        assert_eq!(meta.extra["enrichment_score"], 42);

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["enrichment_score"], 42);
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!(Role::parse("client"), Some(Role::Client));
        assert_eq!(Role::parse("superuser"), None);
    }
}
