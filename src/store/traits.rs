//! `Store` trait — single async interface for all persistence.
//!
//! The mail and import pipelines only see this trait; the concrete
//! backend (libSQL here, a hosted Postgres in production) is wired in
//! at startup. No method opens a transaction: each call is an
//! independently consistent operation, and callers rely on idempotency
//! rather than multi-row atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::models::*;

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Prospects ───────────────────────────────────────────────────

    /// Insert a new prospect. The email is stored lowercase.
    async fn insert_prospect(&self, new: NewProspect) -> Result<Prospect, DatabaseError>;

    /// Get a prospect by id.
    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, DatabaseError>;

    /// Case-insensitive exact email lookup.
    async fn find_prospect_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Prospect>, DatabaseError>;

    /// All prospects with a non-empty email, oldest first. Used by the
    /// domain-fallback matcher scan.
    async fn list_prospects_with_email(&self) -> Result<Vec<Prospect>, DatabaseError>;

    /// Update a prospect's outreach state. `validity` is left untouched
    /// when `None`. `metadata` replaces the stored bag (callers merge
    /// before writing).
    async fn update_prospect_status(
        &self,
        id: Uuid,
        status: EmailingStatus,
        validity: Option<EmailValidity>,
        metadata: &ProspectMeta,
    ) -> Result<(), DatabaseError>;

    // ── Outbound email records ──────────────────────────────────────

    /// Record an outbound send.
    async fn insert_outbound_email(
        &self,
        new: NewOutboundEmail,
    ) -> Result<OutboundEmail, DatabaseError>;

    /// Most recent outbound record for the prospect with
    /// `replied = false`, by send time. Already-replied records are
    /// never returned.
    async fn latest_unreplied_outbound(
        &self,
        prospect_id: Uuid,
    ) -> Result<Option<OutboundEmail>, DatabaseError>;

    /// Mark an outbound record replied, stamping the inbound snapshot
    /// into its metadata.
    async fn mark_outbound_replied(
        &self,
        id: Uuid,
        replied_at: DateTime<Utc>,
        stamp: &ReplyStamp,
    ) -> Result<(), DatabaseError>;

    /// Mark all of a prospect's not-yet-bounced outbound records as
    /// bounced. Returns the number of rows updated.
    async fn mark_outbounds_bounced(
        &self,
        prospect_id: Uuid,
        bounced_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<usize, DatabaseError>;

    // ── Scheduled follow-ups ────────────────────────────────────────

    /// Schedule a follow-up send.
    async fn insert_follow_up(
        &self,
        prospect_id: Uuid,
        step_number: i64,
        scheduled_for: DateTime<Utc>,
        status: FollowUpStatus,
    ) -> Result<ScheduledFollowUp, DatabaseError>;

    /// Cancel every scheduled/pending follow-up for the prospect,
    /// writing `meta` (cancellation reason) onto each. Returns the
    /// number of rows cancelled.
    async fn cancel_active_follow_ups(
        &self,
        prospect_id: Uuid,
        meta: &FollowUpMeta,
    ) -> Result<usize, DatabaseError>;

    /// Count follow-ups still in a scheduled/pending state.
    async fn count_active_follow_ups(&self, prospect_id: Uuid) -> Result<usize, DatabaseError>;

    // ── Received emails ─────────────────────────────────────────────

    /// True if a received email (either variant) already carries this
    /// source message id. The idempotent-ingestion guard.
    async fn received_email_exists(
        &self,
        source_message_id: &str,
    ) -> Result<bool, DatabaseError>;

    /// Archive a prospect reply.
    async fn insert_received_email(
        &self,
        new: NewReceivedEmail,
    ) -> Result<ReceivedEmail, DatabaseError>;

    /// Look up an archived prospect reply by source message id.
    async fn get_received_email_by_message_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<ReceivedEmail>, DatabaseError>;

    /// Archive an expert↔client reply.
    async fn insert_expert_received_email(
        &self,
        new: NewExpertReceivedEmail,
    ) -> Result<Uuid, DatabaseError>;

    // ── Expert email thread links ───────────────────────────────────

    /// Record an expert-sent email for reply threading.
    async fn insert_expert_email(
        &self,
        new: NewExpertEmail,
    ) -> Result<ExpertEmail, DatabaseError>;

    /// Find a sent expert email whose message id exactly equals one of
    /// the candidates.
    async fn find_sent_expert_email_by_message_ids(
        &self,
        candidates: &[String],
    ) -> Result<Option<ExpertEmail>, DatabaseError>;

    /// Fallback for mangled reference formatting: find a sent expert
    /// email whose message id contains the fragment.
    async fn find_sent_expert_email_containing(
        &self,
        fragment: &str,
    ) -> Result<Option<ExpertEmail>, DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Create a business profile.
    async fn insert_profile(&self, new: NewProfile) -> Result<Profile, DatabaseError>;

    /// Active profiles for a role, oldest first.
    async fn list_active_profiles_by_role(
        &self,
        role: Role,
    ) -> Result<Vec<Profile>, DatabaseError>;

    /// Case-insensitive email uniqueness check within a role.
    async fn profile_email_exists(&self, role: Role, email: &str)
    -> Result<bool, DatabaseError>;

    /// SIREN uniqueness check within a role.
    async fn profile_siren_exists(&self, role: Role, siren: &str)
    -> Result<bool, DatabaseError>;

    /// Case-insensitive substring match on name OR email within a
    /// role, oldest first so the result is deterministic.
    async fn find_profile_fuzzy(
        &self,
        role: Role,
        needle: &str,
    ) -> Result<Option<Profile>, DatabaseError>;

    // ── Identity provider surface ───────────────────────────────────

    /// Provision an identity-provider account. Returns its id.
    async fn create_auth_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<String, DatabaseError>;

    /// Delete an identity-provider account (compensating action).
    async fn delete_auth_user(&self, auth_user_id: &str) -> Result<(), DatabaseError>;

    // ── Products and client relations ───────────────────────────────

    /// Register a product (seed/tests).
    async fn insert_product(&self, name: &str) -> Result<Product, DatabaseError>;

    /// Resolve a product by exact id or case-insensitive substring
    /// name match, oldest first.
    async fn find_product_by_id_or_name(
        &self,
        needle: &str,
    ) -> Result<Option<Product>, DatabaseError>;

    async fn insert_client_product_link(
        &self,
        new: NewClientProductLink,
    ) -> Result<Uuid, DatabaseError>;

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Uuid, DatabaseError>;

    async fn insert_assignment(&self, new: NewAssignment) -> Result<Uuid, DatabaseError>;

    // ── Notifications ───────────────────────────────────────────────

    /// Create a notification row.
    async fn insert_notification(&self, new: NewNotification) -> Result<Uuid, DatabaseError>;

    /// Notifications for a recipient, newest first.
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError>;

    // ── Import history ──────────────────────────────────────────────

    /// Open an import-history row in `processing` state.
    async fn insert_import_history(
        &self,
        entity_type: Role,
        file_name: &str,
    ) -> Result<Uuid, DatabaseError>;

    /// Close an import-history row with final counts and status.
    async fn complete_import_history(
        &self,
        id: Uuid,
        total: i64,
        success: i64,
        error: i64,
        skipped: i64,
        status: &str,
    ) -> Result<(), DatabaseError>;
}
