//! Mail pipeline runner — one sequential batch per trigger.
//!
//! Flow per message: fetch → extract → classify → (bounce path |
//! idempotency guard → match → mutate → notify) → mark read.
//!
//! The runner owns an atomic "is running" guard: an overlapping
//! trigger is skipped with a log line, never queued. Per-item errors
//! are appended to the run report and processing continues with the
//! next message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::error::PipelineError;
use crate::mailbox::{FullMessage, MailboxSource, MessageHandle, extract_body};
use crate::notify::NotificationEmitter;
use crate::pipeline::classifier::{Classification, ClassifierRules, ReplyClassifier};
use crate::pipeline::controller::{InboundReply, MutationLog, SequenceController};
use crate::pipeline::matcher::{EntityMatcher, MatchOutcome};
use crate::store::Store;

/// Result aggregate for one polling run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    /// Messages that went through classification and handling.
    pub processed: usize,
    /// Messages whose handling produced at least one store mutation.
    pub updated: usize,
    /// Per-item error messages. Partial failures land here, they never
    /// abort the batch.
    pub errors: Vec<String>,
}

/// The mail ingestion pipeline.
pub struct MailPipeline {
    mailbox: Arc<dyn MailboxSource>,
    store: Arc<dyn Store>,
    classifier: ReplyClassifier,
    matcher: EntityMatcher,
    controller: SequenceController,
    running: AtomicBool,
}

impl MailPipeline {
    pub fn new(
        mailbox: Arc<dyn MailboxSource>,
        store: Arc<dyn Store>,
        rules: ClassifierRules,
    ) -> Self {
        let rules = Arc::new(rules);
        let emitter = Arc::new(NotificationEmitter::new(Arc::clone(&store)));
        Self {
            mailbox,
            store: Arc::clone(&store),
            classifier: ReplyClassifier::new(Arc::clone(&rules)),
            matcher: EntityMatcher::new(Arc::clone(&store)),
            controller: SequenceController::new(store, emitter, rules),
            running: AtomicBool::new(false),
        }
    }

    /// Run one polling batch.
    ///
    /// Returns `PipelineError::AlreadyRunning` when a previous run is
    /// still executing, and `PipelineError::Mailbox` when the listing
    /// call itself fails (nothing was mutated at that point).
    pub async fn run(&self, since: Option<DateTime<Utc>>) -> Result<RunReport, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Skipping mail poll: previous run still in progress");
            return Err(PipelineError::AlreadyRunning);
        }

        let result = self.run_inner(since).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, since: Option<DateTime<Utc>>) -> Result<RunReport, PipelineError> {
        let handles = self.mailbox.list_candidate_messages(since).await?;
        if handles.is_empty() {
            debug!("No candidate messages");
            return Ok(RunReport::default());
        }

        info!(count = handles.len(), "Processing mailbox batch");
        let mut report = RunReport::default();

        for handle in &handles {
            match self.process_message(handle).await {
                Ok(ItemOutcome::Handled(log)) => {
                    report.processed += 1;
                    if log.updates > 0 {
                        report.updated += 1;
                    }
                    report.errors.extend(log.errors);
                    self.mark_read(handle).await;
                }
                Ok(ItemOutcome::Duplicate) => {
                    debug!(id = %handle.id, "Message already ingested, skipping");
                    report.processed += 1;
                    self.mark_read(handle).await;
                }
                Ok(ItemOutcome::Skipped { reason }) => {
                    debug!(id = %handle.id, reason = %reason, "Message skipped");
                    self.mark_read(handle).await;
                }
                Err(e) => {
                    error!(id = %handle.id, error = %e, "Failed to process message");
                    report.errors.push(format!("Message {}: {e}", handle.id));
                }
            }
        }

        info!(
            processed = report.processed,
            updated = report.updated,
            errors = report.errors.len(),
            "Mail poll complete"
        );
        Ok(report)
    }

    async fn process_message(
        &self,
        handle: &MessageHandle,
    ) -> Result<ItemOutcome, PipelineError> {
        let message = self.mailbox.fetch_full_message(handle).await?;
        let body = extract_body(&message);

        match self.classifier.classify(&message, &body) {
            Classification::Skip { reason } => Ok(ItemOutcome::Skipped { reason }),

            Classification::Bounce(bounce) => {
                info!(
                    id = %message.id,
                    recipient = ?bounce.recipient,
                    severity = ?bounce.severity,
                    "Bounce detected"
                );
                let log = self.controller.apply_bounce(&bounce).await;
                Ok(ItemOutcome::Handled(log))
            }

            Classification::Reply(reply) => {
                // Idempotent ingestion guard: re-delivery and window
                // overlap are expected, not exceptional.
                if self.store.received_email_exists(&message.id).await? {
                    return Ok(ItemOutcome::Duplicate);
                }

                let inbound = build_inbound(&message, reply, body);
                let log = match self.matcher.match_reply(&inbound.reply).await? {
                    MatchOutcome::ExpertThread(expert_email) => {
                        self.controller
                            .apply_expert_reply(&expert_email, &inbound)
                            .await
                    }
                    MatchOutcome::Prospect { prospect, outbound } => {
                        self.controller
                            .apply_prospect_reply(&prospect, Some(&outbound), &inbound)
                            .await
                    }
                    MatchOutcome::Unmatched => {
                        match self.controller.auto_create_prospect(&inbound.reply).await? {
                            Some(prospect) => {
                                let mut log = self
                                    .controller
                                    .apply_prospect_reply(&prospect, None, &inbound)
                                    .await;
                                // Creation itself is a mutation.
                                log.updates += 1;
                                log
                            }
                            None => {
                                return Ok(ItemOutcome::Skipped {
                                    reason: "system sender, auto-creation suppressed".into(),
                                });
                            }
                        }
                    }
                };
                Ok(ItemOutcome::Handled(log))
            }
        }
    }

    /// Mark-read failures are logged, never fatal.
    async fn mark_read(&self, handle: &MessageHandle) {
        if let Err(e) = self.mailbox.mark_read(handle).await {
            warn!(id = %handle.id, error = %e, "Failed to mark message read");
        }
    }
}

enum ItemOutcome {
    Handled(MutationLog),
    Duplicate,
    Skipped { reason: String },
}

fn build_inbound(
    message: &FullMessage,
    reply: crate::pipeline::classifier::ReplyInfo,
    body: crate::mailbox::ExtractedBody,
) -> InboundReply {
    InboundReply {
        source_message_id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        received_at: message.internal_timestamp,
        reply,
        body,
    }
}

// ── Poller ──────────────────────────────────────────────────────────

/// Spawn a background task that runs the pipeline on an interval.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop
/// polling. An interval tick that lands while a previous run is still
/// executing is skipped, not queued.
pub fn spawn_mail_poller(
    pipeline: Arc<MailPipeline>,
    config: PollConfig,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Mail poller started — polling every {}s, lookback {}h",
            config.interval_secs, config.lookback_hours
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Mail poller shutting down");
                return;
            }

            let since = Utc::now() - chrono::Duration::hours(config.lookback_hours);
            match pipeline.run(Some(since)).await {
                Ok(report) => {
                    if !report.errors.is_empty() {
                        warn!(errors = report.errors.len(), "Mail poll finished with errors");
                    }
                }
                Err(PipelineError::AlreadyRunning) => {
                    // Logged inside run(); nothing to do.
                }
                Err(e) => error!("Mail poll failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
