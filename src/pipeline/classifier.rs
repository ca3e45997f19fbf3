//! Reply classifier — decides whether an inbound message is a
//! delivery-failure notice, a reply to a tracked outbound email, or
//! noise to skip.
//!
//! Two independent checks run in order:
//! 1. Bounce detection — the From address matches a system-sender
//!    pattern. The failed recipient is regex-scanned out of the
//!    subject, then the body.
//! 2. Reply-thread guard — a message with neither `In-Reply-To` nor
//!    `References` is never a reply and is skipped entirely.
//!
//! The pattern lists are plain data on `ClassifierRules` so they can
//! be unit-tested and extended without touching pipeline control flow.

use regex::Regex;

use crate::mailbox::{ExtractedBody, FullMessage};

// ── Outcomes ────────────────────────────────────────────────────────

/// Permanence of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceSeverity {
    /// Permanent — the address is dead.
    Hard,
    /// Temporary — full mailbox, greylisting, outage.
    Soft,
}

/// A classified delivery-failure notice.
#[derive(Debug, Clone)]
pub struct BounceInfo {
    /// The address the failed delivery was originally sent to, when
    /// one could be extracted.
    pub recipient: Option<String>,
    pub severity: BounceSeverity,
    pub reason: String,
}

/// A classified reply to a tracked thread.
#[derive(Debug, Clone)]
pub struct ReplyInfo {
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub subject: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

/// Classification outcome for one inbound message.
#[derive(Debug, Clone)]
pub enum Classification {
    Bounce(BounceInfo),
    Reply(ReplyInfo),
    Skip { reason: String },
}

impl Classification {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bounce(_) => "bounce",
            Self::Reply(_) => "reply",
            Self::Skip { .. } => "skip",
        }
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// Injectable classification policy.
pub struct ClassifierRules {
    /// Case-insensitive substrings identifying automated mail-system
    /// senders.
    system_senders: Vec<String>,
    /// Phrases marking a permanent failure.
    hard_phrases: Vec<String>,
    /// Phrases marking a temporary failure.
    soft_phrases: Vec<String>,
    /// Email-address pattern for recipient extraction.
    email_pattern: Regex,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            system_senders: [
                "mailer-daemon@",
                "postmaster@",
                "bounce@",
                "bounces@",
                "noreply@",
                "no-reply@",
                "donotreply@",
                "mail-delivery@",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            hard_phrases: [
                "user unknown",
                "no such user",
                "address not found",
                "recipient address rejected",
                "does not exist",
                "invalid recipient",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            soft_phrases: [
                "mailbox full",
                "quota exceeded",
                "temporarily unavailable",
                "try again later",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            email_pattern: Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("static regex"),
        }
    }
}

impl ClassifierRules {
    /// True if the address belongs to an automated mail system.
    pub fn is_system_sender(&self, address: &str) -> bool {
        let lower = address.to_lowercase();
        self.system_senders.iter().any(|p| lower.contains(p))
    }

    /// Add a system-sender pattern (case-insensitive substring).
    pub fn add_system_sender(&mut self, pattern: &str) {
        self.system_senders.push(pattern.to_lowercase());
    }

    fn classify_severity(&self, haystack: &str) -> (BounceSeverity, String) {
        let lower = haystack.to_lowercase();
        for phrase in &self.hard_phrases {
            if lower.contains(phrase) {
                return (BounceSeverity::Hard, phrase.clone());
            }
        }
        for phrase in &self.soft_phrases {
            if lower.contains(phrase) {
                return (BounceSeverity::Soft, phrase.clone());
            }
        }
        (BounceSeverity::Hard, "Unknown".to_string())
    }

    /// Pull the first email address out of the subject, then the body.
    fn extract_failed_recipient(&self, subject: &str, body_text: &str) -> Option<String> {
        self.email_pattern
            .find(subject)
            .or_else(|| self.email_pattern.find(body_text))
            .map(|m| m.as_str().to_lowercase())
    }
}

// ── Classifier ──────────────────────────────────────────────────────

/// Stateless classifier over an injectable rule set. The rules are
/// shared with the sequence controller, which re-checks the
/// system-sender patterns before auto-creating prospects.
pub struct ReplyClassifier {
    rules: std::sync::Arc<ClassifierRules>,
}

impl ReplyClassifier {
    pub fn new(rules: std::sync::Arc<ClassifierRules>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> std::sync::Arc<ClassifierRules> {
        std::sync::Arc::clone(&self.rules)
    }

    /// Classify one message.
    pub fn classify(&self, message: &FullMessage, body: &ExtractedBody) -> Classification {
        let from_header = message.header("From").unwrap_or_default();
        let (from_name, from_email) = parse_address(from_header);

        // Check 1: bounce detection.
        if self.rules.is_system_sender(&from_email) {
            let subject = message.header("Subject").unwrap_or_default();
            let body_text = body.text.as_deref().or(body.html.as_deref()).unwrap_or("");
            let recipient = self.rules.extract_failed_recipient(subject, body_text);
            let (severity, reason) = self
                .rules
                .classify_severity(&format!("{subject}\n{body_text}"));
            return Classification::Bounce(BounceInfo {
                recipient,
                severity,
                reason,
            });
        }

        // Check 2: reply-thread guard. Cold inbound mail carries
        // neither header and never enters the pipeline.
        let in_reply_to = message.header("In-Reply-To").map(str::to_string);
        let references = message
            .header("References")
            .map(|v| v.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();

        if in_reply_to.is_none() && references.is_empty() {
            return Classification::Skip {
                reason: "no In-Reply-To or References header".into(),
            };
        }

        if from_email.is_empty() {
            return Classification::Skip {
                reason: "missing From address".into(),
            };
        }
        let to_header = message.header("To").unwrap_or_default();
        let (_, to_email) = parse_address(to_header);
        if to_email.is_empty() {
            return Classification::Skip {
                reason: "missing To address".into(),
            };
        }

        Classification::Reply(ReplyInfo {
            from_email,
            from_name,
            to_email,
            subject: message.header("Subject").unwrap_or_default().to_string(),
            in_reply_to,
            references,
        })
    }
}

impl Default for ReplyClassifier {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(ClassifierRules::default()))
    }
}

// ── Address parsing ─────────────────────────────────────────────────

/// Split a `From`/`To` header like `"Jane Doe" <jane@acme.com>` into
/// (display name, lowercase address). Bare addresses yield an empty
/// name.
pub fn parse_address(header: &str) -> (String, String) {
    let trimmed = header.trim();
    if let (Some(lt), Some(gt)) = (trimmed.find('<'), trimmed.rfind('>')) {
        if lt < gt {
            let email = trimmed[lt + 1..gt].trim().to_lowercase();
            let name = trimmed[..lt].trim().trim_matches('"').trim().to_string();
            return (name, email);
        }
    }
    let email = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    (String::new(), email)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::mailbox::{FullMessage, MessageHeader};

    fn make_message(headers: &[(&str, &str)], snippet: &str) -> FullMessage {
        FullMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            snippet: snippet.into(),
            headers: headers
                .iter()
                .map(|(n, v)| MessageHeader {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            payload: None,
            internal_timestamp: Utc::now(),
        }
    }

    fn body(text: &str) -> ExtractedBody {
        ExtractedBody {
            html: None,
            text: Some(text.into()),
            snippet: String::new(),
        }
    }

    #[test]
    fn detects_mailer_daemon_bounce() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[
                ("From", "Mail Delivery Subsystem <mailer-daemon@mail.example.com>"),
                ("Subject", "Delivery Status Notification: jane@acme.com"),
            ],
            "",
        );
        let result = classifier.classify(&msg, &body("550 User unknown"));
        match result {
            Classification::Bounce(info) => {
                assert_eq!(info.recipient.as_deref(), Some("jane@acme.com"));
                assert_eq!(info.severity, BounceSeverity::Hard);
                assert_eq!(info.reason, "user unknown");
            }
            other => panic!("Expected bounce, got {:?}", other),
        }
    }

    #[test]
    fn bounce_recipient_prefers_subject_over_body() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[
                ("From", "postmaster@relay.net"),
                ("Subject", "Undeliverable: subject@acme.com"),
            ],
            "",
        );
        let result = classifier.classify(&msg, &body("the address body@acme.com failed"));
        match result {
            Classification::Bounce(info) => {
                assert_eq!(info.recipient.as_deref(), Some("subject@acme.com"));
            }
            other => panic!("Expected bounce, got {:?}", other),
        }
    }

    #[test]
    fn bounce_recipient_falls_back_to_body() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[("From", "bounce@relay.net"), ("Subject", "Delivery failed")],
            "",
        );
        let result = classifier.classify(&msg, &body("could not reach jane@acme.com"));
        match result {
            Classification::Bounce(info) => {
                assert_eq!(info.recipient.as_deref(), Some("jane@acme.com"));
            }
            other => panic!("Expected bounce, got {:?}", other),
        }
    }

    #[test]
    fn soft_bounce_on_mailbox_full() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[("From", "mailer-daemon@mx.org"), ("Subject", "Delayed")],
            "",
        );
        let result = classifier.classify(&msg, &body("Mailbox full, try again later"));
        match result {
            Classification::Bounce(info) => {
                assert_eq!(info.severity, BounceSeverity::Soft);
                assert_eq!(info.reason, "mailbox full");
            }
            other => panic!("Expected bounce, got {:?}", other),
        }
    }

    #[test]
    fn unknown_bounce_defaults_to_hard() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[("From", "mailer-daemon@mx.org"), ("Subject", "Failure")],
            "",
        );
        let result = classifier.classify(&msg, &body("something went wrong"));
        match result {
            Classification::Bounce(info) => {
                assert_eq!(info.severity, BounceSeverity::Hard);
                assert_eq!(info.reason, "Unknown");
            }
            other => panic!("Expected bounce, got {:?}", other),
        }
    }

    #[test]
    fn bounce_check_runs_before_thread_guard() {
        // Bounces rarely carry In-Reply-To; they must still classify.
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[("From", "mailer-daemon@mx.org"), ("Subject", "Failure")],
            "",
        );
        assert!(matches!(
            classifier.classify(&msg, &body("x")),
            Classification::Bounce(_)
        ));
    }

    #[test]
    fn skips_message_without_thread_headers() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[
                ("From", "cold@outreach.biz"),
                ("To", "us@example.com"),
                ("Subject", "Grow your pipeline 10x"),
            ],
            "",
        );
        assert!(matches!(
            classifier.classify(&msg, &body("buy now")),
            Classification::Skip { .. }
        ));
    }

    #[test]
    fn references_alone_is_enough() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[
                ("From", "Jane <jane@acme.com>"),
                ("To", "us@example.com"),
                ("Subject", "Re: intro"),
                ("References", "<a@smtp> <b@smtp>"),
            ],
            "",
        );
        match classifier.classify(&msg, &body("sounds good")) {
            Classification::Reply(info) => {
                assert_eq!(info.from_email, "jane@acme.com");
                assert_eq!(info.from_name, "Jane");
                assert_eq!(info.references, vec!["<a@smtp>", "<b@smtp>"]);
                assert!(info.in_reply_to.is_none());
            }
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn reply_without_to_header_is_skipped() {
        let classifier = ReplyClassifier::default();
        let msg = make_message(
            &[
                ("From", "jane@acme.com"),
                ("Subject", "Re: intro"),
                ("In-Reply-To", "<a@smtp>"),
            ],
            "",
        );
        assert!(matches!(
            classifier.classify(&msg, &body("x")),
            Classification::Skip { .. }
        ));
    }

    #[test]
    fn parse_address_variants() {
        assert_eq!(
            parse_address("\"Jane Doe\" <Jane@Acme.COM>"),
            ("Jane Doe".to_string(), "jane@acme.com".to_string())
        );
        assert_eq!(
            parse_address("jane@acme.com"),
            (String::new(), "jane@acme.com".to_string())
        );
        assert_eq!(
            parse_address("Jane Doe <jane@acme.com>"),
            ("Jane Doe".to_string(), "jane@acme.com".to_string())
        );
        assert_eq!(parse_address(""), (String::new(), String::new()));
    }

    #[test]
    fn custom_system_sender_pattern() {
        let mut rules = ClassifierRules::default();
        rules.add_system_sender("autoresponder@");
        let classifier = ReplyClassifier::new(std::sync::Arc::new(rules));
        let msg = make_message(
            &[("From", "autoresponder@corp.io"), ("Subject", "Out of office")],
            "",
        );
        assert!(matches!(
            classifier.classify(&msg, &body("")),
            Classification::Bounce(_)
        ));
    }
}
