//! Entity matcher — resolves an inbound reply's sender to a known
//! business record.
//!
//! Two target domains, tried in order:
//! 1. Expert↔client thread: the cleaned `In-Reply-To`/`References`
//!    ids against sent expert emails — exact match first, then a
//!    substring fallback for mail clients that mangle reference
//!    formatting.
//! 2. Prospect: exact case-insensitive address, then a linear
//!    same-domain scan. Outbound-record resolution is always "most
//!    recent unreplied by send time" — an already-replied record is
//!    never re-matched.

use std::sync::Arc;

use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::classifier::ReplyInfo;
use crate::store::Store;
use crate::store::models::{ExpertEmail, OutboundEmail, Prospect};

/// Resolution result for a classified reply.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// The reply belongs to an expert↔client thread.
    ExpertThread(ExpertEmail),
    /// The reply belongs to a prospect; `outbound` is the record the
    /// reply answers, when one exists.
    Prospect {
        prospect: Prospect,
        outbound: OutboundEmail,
    },
    /// No known entity — the caller decides whether to auto-create.
    Unmatched,
}

/// Resolves reply senders against the store.
pub struct EntityMatcher {
    store: Arc<dyn Store>,
}

impl EntityMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve a reply to a business entity.
    pub async fn match_reply(&self, reply: &ReplyInfo) -> Result<MatchOutcome, PipelineError> {
        if let Some(expert_email) = self.match_expert_thread(reply).await? {
            debug!(
                expert_email = %expert_email.id,
                "Reply matched an expert-client thread"
            );
            return Ok(MatchOutcome::ExpertThread(expert_email));
        }

        if let Some((prospect, outbound)) = self.match_prospect(&reply.from_email).await? {
            debug!(prospect = %prospect.id, "Reply matched a prospect");
            return Ok(MatchOutcome::Prospect { prospect, outbound });
        }

        Ok(MatchOutcome::Unmatched)
    }

    /// Thread-id candidates: the angle-bracket-stripped `In-Reply-To`
    /// plus all `References` ids.
    fn reference_candidates(reply: &ReplyInfo) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(ref id) = reply.in_reply_to {
            candidates.push(clean_message_id(id));
        }
        for id in &reply.references {
            let cleaned = clean_message_id(id);
            if !candidates.contains(&cleaned) {
                candidates.push(cleaned);
            }
        }
        candidates.retain(|c| !c.is_empty());
        candidates
    }

    async fn match_expert_thread(
        &self,
        reply: &ReplyInfo,
    ) -> Result<Option<ExpertEmail>, PipelineError> {
        let candidates = Self::reference_candidates(reply);
        if candidates.is_empty() {
            return Ok(None);
        }

        // Exact match on the stored outbound message id.
        if let Some(hit) = self
            .store
            .find_sent_expert_email_by_message_ids(&candidates)
            .await?
        {
            return Ok(Some(hit));
        }

        // Fallback: stored id contains the candidate.
        for candidate in &candidates {
            if let Some(hit) = self
                .store
                .find_sent_expert_email_containing(candidate)
                .await?
            {
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }

    async fn match_prospect(
        &self,
        from_email: &str,
    ) -> Result<Option<(Prospect, OutboundEmail)>, PipelineError> {
        // (a) Exact case-insensitive address match.
        if let Some(prospect) = self.store.find_prospect_by_email(from_email).await? {
            if let Some(outbound) = self.store.latest_unreplied_outbound(prospect.id).await? {
                return Ok(Some((prospect, outbound)));
            }
        }

        // (b) Same-domain scan. O(n) over prospects with an email;
        // correctness concern only, kept behind the store seam.
        let Some(reply_domain) = email_domain(from_email) else {
            return Ok(None);
        };
        for prospect in self.store.list_prospects_with_email().await? {
            if email_domain(&prospect.email).as_deref() == Some(reply_domain.as_str()) {
                if let Some(outbound) = self.store.latest_unreplied_outbound(prospect.id).await? {
                    return Ok(Some((prospect, outbound)));
                }
            }
        }

        Ok(None)
    }
}

/// Strip angle brackets and whitespace from a message id.
pub fn clean_message_id(id: &str) -> String {
    id.trim().trim_start_matches('<').trim_end_matches('>').to_string()
}

/// Lowercase domain part of an address, if it has one.
pub fn email_domain(email: &str) -> Option<String> {
    email.rsplit_once('@').map(|(_, d)| d.to_lowercase())
}
