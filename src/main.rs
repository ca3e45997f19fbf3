use std::sync::Arc;
use std::sync::atomic::Ordering;

use outreach_core::config::{HttpConfig, MailboxConfig, PollConfig};
use outreach_core::http::{AppState, api_routes};
use outreach_core::import::ImportService;
use outreach_core::mailbox::{GmailMailbox, MailboxSource};
use outreach_core::pipeline::{ClassifierRules, MailPipeline, spawn_mail_poller};
use outreach_core::store::{LibSqlStore, Store};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing: env-filtered stderr plus a daily-rolling
    // file under ./logs.
    let file_appender = tracing_appender::rolling::daily("./logs", "outreach-core.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stderr))
        .with_target(false)
        .init();

    let http_config = HttpConfig::from_env();
    let poll_config = PollConfig::from_env();

    eprintln!("📬 outreach-core v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", http_config.port);

    // ── Database ────────────────────────────────────────────────────
    let db_path =
        std::env::var("OUTREACH_DB_PATH").unwrap_or_else(|_| "./data/outreach.db".to_string());

    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Mailbox + pipeline ──────────────────────────────────────────
    let mailbox_config = match MailboxConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("   Mailbox disabled ({e})");
            None
        }
    };

    let mailbox: Arc<dyn MailboxSource> = match mailbox_config {
        Some(ref config) => Arc::new(GmailMailbox::new(config.clone())),
        None => Arc::new(DisabledMailbox),
    };

    let pipeline = Arc::new(MailPipeline::new(
        mailbox,
        Arc::clone(&store),
        ClassifierRules::default(),
    ));

    // The interval poller only runs with a configured mailbox; the
    // HTTP trigger stays available either way.
    let poller = if mailbox_config.is_some() {
        eprintln!(
            "   Mail poll: every {}s (lookback {}h)",
            poll_config.interval_secs, poll_config.lookback_hours
        );
        Some(spawn_mail_poller(Arc::clone(&pipeline), poll_config))
    } else {
        None
    };

    // ── HTTP server ─────────────────────────────────────────────────
    let import = Arc::new(ImportService::new(Arc::clone(&store)));
    let state = AppState {
        pipeline,
        import,
        mailbox_config,
    };
    let router = api_routes(state, http_config.max_upload_bytes);

    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", http_config.port)).await?;

    tokio::select! {
        result = axum::serve(listener, router) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Shutting down");
        }
    }

    if let Some((handle, shutdown)) = poller {
        shutdown.store(true, Ordering::Relaxed);
        handle.abort();
    }

    Ok(())
}

/// Stand-in mailbox used when no credentials are configured — every
/// call reports the mailbox as unavailable.
struct DisabledMailbox;

#[async_trait::async_trait]
impl MailboxSource for DisabledMailbox {
    async fn list_candidate_messages(
        &self,
        _since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<outreach_core::mailbox::MessageHandle>, outreach_core::error::MailboxError>
    {
        Err(outreach_core::error::MailboxError::Auth(
            "mailbox is not configured".into(),
        ))
    }

    async fn fetch_full_message(
        &self,
        _handle: &outreach_core::mailbox::MessageHandle,
    ) -> Result<outreach_core::mailbox::FullMessage, outreach_core::error::MailboxError> {
        Err(outreach_core::error::MailboxError::Auth(
            "mailbox is not configured".into(),
        ))
    }

    async fn mark_read(
        &self,
        _handle: &outreach_core::mailbox::MessageHandle,
    ) -> Result<(), outreach_core::error::MailboxError> {
        Err(outreach_core::error::MailboxError::Auth(
            "mailbox is not configured".into(),
        ))
    }
}
