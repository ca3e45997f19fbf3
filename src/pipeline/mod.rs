//! Mail ingestion pipeline.
//!
//! Inbound messages flow through:
//! 1. `MailboxSource::list_candidate_messages()` — adapter I/O
//! 2. `extract_body()` — MIME part decoding
//! 3. `ReplyClassifier::classify()` — bounce / reply / skip
//! 4. `EntityMatcher::match_reply()` — thread and prospect resolution
//! 5. `SequenceController` — status mutation, sequence cancellation,
//!    notification fan-out

pub mod classifier;
pub mod controller;
pub mod matcher;
pub mod runner;

pub use classifier::{Classification, ClassifierRules, ReplyClassifier};
pub use controller::SequenceController;
pub use matcher::{EntityMatcher, MatchOutcome};
pub use runner::{MailPipeline, RunReport, spawn_mail_poller};
