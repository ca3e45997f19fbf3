//! Sequence controller — applies the state transition for a
//! classified-and-matched inbound message.
//!
//! Every mutation is attempted independently: a failure on one update
//! (say, cancelling follow-ups) is logged and recorded, but later
//! steps still run. Failure isolation, not transactional atomicity —
//! each mutation is individually idempotent or tolerant of
//! at-least-once application.
//!
//! Invariant upheld here: once a prospect's status becomes `replied`
//! or `bounced`, none of its follow-ups may be left in a
//! scheduled/pending state when the controller returns.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::mailbox::ExtractedBody;
use crate::notify::{NotificationEmitter, NotificationPayload};
use crate::pipeline::classifier::{
    BounceInfo, BounceSeverity, ClassifierRules, ReplyInfo,
};
use crate::pipeline::matcher::email_domain;
use crate::store::Store;
use crate::store::models::*;

/// Cancellation reason recorded on follow-ups killed by a bounce.
const CANCEL_REASON_BOUNCED: &str = "email_bounced";
/// Cancellation reason recorded on follow-ups killed by a reply.
const CANCEL_REASON_REPLIED: &str = "prospect_replied";

/// Outcome of one controller invocation. `updates` counts store
/// mutations that succeeded; `errors` collects the ones that did not.
#[derive(Debug, Default)]
pub struct MutationLog {
    pub updates: usize,
    pub errors: Vec<String>,
}

impl MutationLog {
    fn ok(&mut self) {
        self.updates += 1;
    }

    fn fail(&mut self, context: &str, e: impl std::fmt::Display) {
        warn!("{context}: {e}");
        self.errors.push(format!("{context}: {e}"));
    }
}

/// An inbound message ready for archiving: classification plus the
/// identifiers and content the received-email row needs.
#[derive(Debug, Clone)]
pub struct InboundReply {
    pub source_message_id: String,
    pub thread_id: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub reply: ReplyInfo,
    pub body: ExtractedBody,
}

/// Applies reply/bounce state transitions against the store.
pub struct SequenceController {
    store: Arc<dyn Store>,
    emitter: Arc<NotificationEmitter>,
    rules: Arc<ClassifierRules>,
}

impl SequenceController {
    pub fn new(
        store: Arc<dyn Store>,
        emitter: Arc<NotificationEmitter>,
        rules: Arc<ClassifierRules>,
    ) -> Self {
        Self {
            store,
            emitter,
            rules,
        }
    }

    // ── Bounce path ─────────────────────────────────────────────────

    /// Handle a delivery-failure notice: stamp the prospect's outbound
    /// records, flip its status and validity, and cancel the sequence.
    pub async fn apply_bounce(&self, bounce: &BounceInfo) -> MutationLog {
        let mut log = MutationLog::default();

        let Some(ref recipient) = bounce.recipient else {
            info!("Bounce without an extractable recipient, nothing to update");
            return log;
        };

        let prospect = match self.store.find_prospect_by_email(recipient).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(recipient = %recipient, "Bounce for an unknown address, skipping");
                return log;
            }
            Err(e) => {
                log.fail("Bounce prospect lookup failed", e);
                return log;
            }
        };

        let now = Utc::now();

        match self
            .store
            .mark_outbounds_bounced(prospect.id, now, &bounce.reason)
            .await
        {
            Ok(n) => {
                info!(prospect = %prospect.id, count = n, "Outbound records marked bounced");
                log.ok();
            }
            Err(e) => log.fail("Failed to mark outbound records bounced", e),
        }

        let validity = match bounce.severity {
            BounceSeverity::Hard => EmailValidity::Invalid,
            BounceSeverity::Soft => EmailValidity::Risky,
        };
        let mut meta = prospect.metadata.clone();
        meta.bounce_reason = Some(bounce.reason.clone());
        meta.bounced_at = Some(now);
        meta.sequence_stopped = Some(true);

        match self
            .store
            .update_prospect_status(prospect.id, EmailingStatus::Bounced, Some(validity), &meta)
            .await
        {
            Ok(()) => log.ok(),
            Err(e) => log.fail("Failed to update prospect bounce status", e),
        }

        match self
            .store
            .cancel_active_follow_ups(
                prospect.id,
                &FollowUpMeta {
                    cancelled_reason: Some(CANCEL_REASON_BOUNCED.into()),
                    cancelled_at: Some(now),
                    reply_from: None,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(n) => {
                info!(prospect = %prospect.id, count = n, "Follow-ups cancelled after bounce");
                log.ok();
            }
            Err(e) => log.fail("Failed to cancel follow-ups after bounce", e),
        }

        log
    }

    // ── Prospect reply path ─────────────────────────────────────────

    /// Archive a prospect reply and stop the sequence. `outbound` is
    /// the record the reply answers; `None` means the prospect was
    /// auto-created from this very message.
    pub async fn apply_prospect_reply(
        &self,
        prospect: &Prospect,
        outbound: Option<&OutboundEmail>,
        inbound: &InboundReply,
    ) -> MutationLog {
        let mut log = MutationLog::default();
        let auto_created = outbound.is_none();

        // The archived row anchors everything else; abort on failure.
        let received = match self
            .store
            .insert_received_email(NewReceivedEmail {
                prospect_id: prospect.id,
                outbound_email_id: outbound.map(|o| o.id),
                source_message_id: inbound.source_message_id.clone(),
                thread_id: inbound.thread_id.clone(),
                from_email: inbound.reply.from_email.clone(),
                from_name: inbound.reply.from_name.clone(),
                to_email: inbound.reply.to_email.clone(),
                subject: inbound.reply.subject.clone(),
                body_html: inbound.body.html.clone(),
                body_text: inbound.body.text.clone(),
                snippet: inbound.body.snippet.clone(),
                in_reply_to: inbound.reply.in_reply_to.clone(),
                references: inbound.reply.references.clone(),
                received_at: inbound.received_at,
            })
            .await
        {
            Ok(received) => {
                log.ok();
                received
            }
            Err(e) => {
                log.fail("Failed to archive received email", e);
                return log;
            }
        };

        let now = Utc::now();

        if let Some(outbound) = outbound {
            match self
                .store
                .mark_outbound_replied(
                    outbound.id,
                    inbound.received_at,
                    &ReplyStamp {
                        message_id: inbound.source_message_id.clone(),
                        reply_from: inbound.reply.from_email.clone(),
                        reply_subject: inbound.reply.subject.clone(),
                        received_email_id: received.id,
                    },
                )
                .await
            {
                Ok(()) => log.ok(),
                Err(e) => log.fail("Failed to mark outbound record replied", e),
            }
        }

        let mut meta = prospect.metadata.clone();
        meta.last_reply_from = Some(inbound.reply.from_email.clone());
        meta.last_reply_at = Some(now);
        meta.sequence_stopped = Some(true);

        match self
            .store
            .update_prospect_status(prospect.id, EmailingStatus::Replied, None, &meta)
            .await
        {
            Ok(()) => log.ok(),
            Err(e) => log.fail("Failed to update prospect reply status", e),
        }

        match self
            .store
            .cancel_active_follow_ups(
                prospect.id,
                &FollowUpMeta {
                    cancelled_reason: Some(CANCEL_REASON_REPLIED.into()),
                    cancelled_at: Some(now),
                    reply_from: Some(inbound.reply.from_email.clone()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(n) => {
                info!(prospect = %prospect.id, count = n, "Follow-ups cancelled after reply");
                log.ok();
            }
            Err(e) => log.fail("Failed to cancel follow-ups after reply", e),
        }

        let created = self
            .emitter
            .notify_role(
                Role::Admin,
                &reply_notification(prospect, received.id, &inbound.reply.from_email, auto_created),
            )
            .await;
        info!(count = created, "Admin notifications created for reply");

        log
    }

    // ── Expert-client reply path ────────────────────────────────────

    /// Archive a reply on an expert↔client thread. No outreach
    /// sequence exists there, so nothing is cancelled.
    pub async fn apply_expert_reply(
        &self,
        expert_email: &ExpertEmail,
        inbound: &InboundReply,
    ) -> MutationLog {
        let mut log = MutationLog::default();

        match self
            .store
            .insert_expert_received_email(NewExpertReceivedEmail {
                expert_email_id: expert_email.id,
                expert_id: expert_email.expert_id,
                client_id: expert_email.client_id,
                client_product_id: expert_email.client_product_id,
                source_message_id: inbound.source_message_id.clone(),
                thread_id: inbound.thread_id.clone(),
                from_email: inbound.reply.from_email.clone(),
                to_email: inbound.reply.to_email.clone(),
                subject: inbound.reply.subject.clone(),
                body_html: inbound.body.html.clone(),
                body_text: inbound.body.text.clone(),
                snippet: inbound.body.snippet.clone(),
                in_reply_to: inbound.reply.in_reply_to.clone(),
                references: inbound.reply.references.clone(),
                received_at: inbound.received_at,
            })
            .await
        {
            Ok(received_id) => {
                log.ok();
                let notified = self
                    .emitter
                    .notify_user(
                        expert_email.expert_id,
                        Role::Expert,
                        &NotificationPayload {
                            kind: "client_reply".into(),
                            title: "Your client replied".into(),
                            message: format!(
                                "{} replied on the thread \"{}\".",
                                inbound.reply.from_email, expert_email.subject
                            ),
                            priority: NotificationPriority::High,
                            action: NotificationAction {
                                url: Some(format!("/expert/emails/{received_id}")),
                                label: Some("View reply".into()),
                                metadata: serde_json::json!({
                                    "expert_email_id": expert_email.id,
                                    "client_id": expert_email.client_id,
                                    "email_received_id": received_id,
                                }),
                            },
                        },
                    )
                    .await;
                if !notified {
                    log.errors
                        .push("Expert notification insert failed".to_string());
                }
            }
            Err(e) => log.fail("Failed to archive expert reply", e),
        }

        log
    }

    // ── Auto-creation ───────────────────────────────────────────────

    /// Create a prospect from an unmatched inbound reply.
    ///
    /// Returns `None` (message dropped) when the sender matches a
    /// system-sender pattern. On an email-uniqueness violation the
    /// existing prospect is returned instead — the address raced in
    /// through another path.
    pub async fn auto_create_prospect(
        &self,
        reply: &ReplyInfo,
    ) -> Result<Option<Prospect>, DatabaseError> {
        if self.rules.is_system_sender(&reply.from_email) {
            info!(
                from = %reply.from_email,
                "Suppressing auto-creation for system sender"
            );
            return Ok(None);
        }

        let (first_name, last_name) = split_display_name(&reply.from_name);
        let company_name = email_domain(&reply.from_email)
            .and_then(|d| d.split('.').next().map(str::to_string));

        let mut metadata = ProspectMeta::default();
        metadata.created_from = Some("email_reply".into());
        metadata.original_from_header = Some(if reply.from_name.is_empty() {
            reply.from_email.clone()
        } else {
            format!("{} <{}>", reply.from_name, reply.from_email)
        });
        metadata.auto_created = Some(true);

        let new = NewProspect {
            email: reply.from_email.clone(),
            first_name,
            last_name,
            company_name,
            siren: None,
            source: "email_reply".into(),
            emailing_status: EmailingStatus::Replied,
            email_validity: EmailValidity::Valid,
            // Inbound replies are high-value leads.
            score_priority: 5,
            metadata,
        };

        match self.store.insert_prospect(new).await {
            Ok(prospect) => {
                info!(prospect = %prospect.id, email = %prospect.email, "Prospect auto-created");
                Ok(Some(prospect))
            }
            Err(DatabaseError::Constraint(_)) => {
                self.store.find_prospect_by_email(&reply.from_email).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Best-effort whitespace split of a display name: first token is the
/// first name, the remainder the last name.
fn split_display_name(name: &str) -> (Option<String>, Option<String>) {
    let cleaned = name.trim().replace(['\'', '"'], "");
    let mut parts = cleaned.split_whitespace();
    match (parts.next(), parts.clone().count()) {
        (None, _) => (None, None),
        (Some(first), 0) => (Some(first.to_string()), None),
        (Some(first), _) => (
            Some(first.to_string()),
            Some(parts.collect::<Vec<_>>().join(" ")),
        ),
    }
}

/// Build the admin-facing notification for a prospect reply.
fn reply_notification(
    prospect: &Prospect,
    received_id: uuid::Uuid,
    reply_from: &str,
    is_new_prospect: bool,
) -> NotificationPayload {
    let prospect_name = match (&prospect.first_name, &prospect.last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        _ => prospect
            .company_name
            .clone()
            .unwrap_or_else(|| prospect.email.clone()),
    };

    let (kind, title, message, priority) = if is_new_prospect {
        (
            "prospect_new_email",
            format!("New contact: {prospect_name}"),
            format!(
                "An email was received from {prospect_name} ({}). A prospect was created \
                 automatically. Review the email and reply directly.",
                prospect.email
            ),
            NotificationPriority::Urgent,
        )
    } else {
        (
            "prospect_reply",
            format!("Reply received from {prospect_name}"),
            format!(
                "Prospect {prospect_name} ({}) replied to your outreach email. Review the \
                 reply and answer directly.",
                prospect.email
            ),
            NotificationPriority::High,
        )
    };

    NotificationPayload {
        kind: kind.into(),
        title,
        message,
        priority,
        action: NotificationAction {
            url: Some(format!(
                "/admin/prospection/email-reply/{}/{}",
                prospect.id, received_id
            )),
            label: Some("View email and reply".into()),
            metadata: serde_json::json!({
                "prospect_id": prospect.id,
                "email_received_id": received_id,
                "prospect_email": prospect.email,
                "prospect_name": prospect_name,
                "reply_from": reply_from,
                "is_new_prospect": is_new_prospect,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_display_name_two_tokens() {
        assert_eq!(
            split_display_name("Jane Doe"),
            (Some("Jane".into()), Some("Doe".into()))
        );
    }

    #[test]
    fn split_display_name_many_tokens_keeps_remainder() {
        assert_eq!(
            split_display_name("Jean Marie de la Tour"),
            (Some("Jean".into()), Some("Marie de la Tour".into()))
        );
    }

    #[test]
    fn split_display_name_single_token() {
        assert_eq!(split_display_name("Jane"), (Some("Jane".into()), None));
    }

    #[test]
    fn split_display_name_empty() {
        assert_eq!(split_display_name("  "), (None, None));
    }

    #[test]
    fn split_display_name_strips_quotes() {
        assert_eq!(
            split_display_name("\"Jane Doe\""),
            (Some("Jane".into()), Some("Doe".into()))
        );
    }

    #[test]
    fn reply_notification_new_prospect_is_urgent() {
        let prospect = Prospect {
            id: uuid::Uuid::new_v4(),
            email: "bob@newco.com".into(),
            first_name: None,
            last_name: None,
            company_name: Some("newco".into()),
            siren: None,
            source: "email_reply".into(),
            emailing_status: EmailingStatus::Replied,
            email_validity: EmailValidity::Valid,
            score_priority: 5,
            metadata: ProspectMeta::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let payload = reply_notification(&prospect, uuid::Uuid::new_v4(), "bob@newco.com", true);
        assert_eq!(payload.kind, "prospect_new_email");
        assert_eq!(payload.priority, NotificationPriority::Urgent);
        assert!(payload.title.contains("newco"));
        assert!(payload.action.url.as_deref().unwrap().starts_with("/admin/prospection/email-reply/"));
    }

    #[test]
    fn reply_notification_known_prospect_is_high() {
        let prospect = Prospect {
            id: uuid::Uuid::new_v4(),
            email: "jane@acme.com".into(),
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            company_name: None,
            siren: None,
            source: "import_csv".into(),
            emailing_status: EmailingStatus::Replied,
            email_validity: EmailValidity::Valid,
            score_priority: 3,
            metadata: ProspectMeta::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let payload = reply_notification(&prospect, uuid::Uuid::new_v4(), "jane@acme.com", false);
        assert_eq!(payload.kind, "prospect_reply");
        assert_eq!(payload.priority, NotificationPriority::High);
        assert!(payload.title.contains("Jane Doe"));
    }
}
