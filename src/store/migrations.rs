//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()`
//! checks the current version and applies only the new ones
//! sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "prospect_pipeline",
        sql: r#"
            CREATE TABLE IF NOT EXISTS prospects (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT,
                last_name TEXT,
                company_name TEXT,
                siren TEXT,
                source TEXT NOT NULL DEFAULT 'manual',
                emailing_status TEXT NOT NULL DEFAULT 'not_contacted',
                email_validity TEXT NOT NULL DEFAULT 'valid',
                score_priority INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_prospects_email ON prospects(email);
            CREATE INDEX IF NOT EXISTS idx_prospects_status ON prospects(emailing_status);

            CREATE TABLE IF NOT EXISTS prospect_emails (
                id TEXT PRIMARY KEY,
                prospect_id TEXT NOT NULL REFERENCES prospects(id),
                step INTEGER NOT NULL DEFAULT 1,
                subject TEXT NOT NULL DEFAULT '',
                sent_at TEXT NOT NULL,
                replied INTEGER NOT NULL DEFAULT 0,
                replied_at TEXT,
                bounced INTEGER NOT NULL DEFAULT 0,
                bounced_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_prospect_emails_prospect
                ON prospect_emails(prospect_id, replied);

            CREATE TABLE IF NOT EXISTS prospect_email_scheduled (
                id TEXT PRIMARY KEY,
                prospect_id TEXT NOT NULL REFERENCES prospects(id),
                step_number INTEGER NOT NULL DEFAULT 1,
                scheduled_for TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled',
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_prospect_email_scheduled_status
                ON prospect_email_scheduled(prospect_id, status);

            CREATE TABLE IF NOT EXISTS prospect_email_received (
                id TEXT PRIMARY KEY,
                prospect_id TEXT NOT NULL REFERENCES prospects(id),
                outbound_email_id TEXT,
                source_message_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL DEFAULT '',
                from_email TEXT NOT NULL,
                from_name TEXT NOT NULL DEFAULT '',
                to_email TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                body_html TEXT,
                body_text TEXT,
                snippet TEXT NOT NULL DEFAULT '',
                in_reply_to TEXT,
                refs TEXT NOT NULL DEFAULT '[]',
                received_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_replied INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_prospect_email_received_msg
                ON prospect_email_received(source_message_id);

            CREATE TABLE IF NOT EXISTS expert_client_emails (
                id TEXT PRIMARY KEY,
                expert_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                client_product_id TEXT,
                subject TEXT NOT NULL DEFAULT '',
                message_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'sent',
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_expert_client_emails_msg
                ON expert_client_emails(message_id);

            CREATE TABLE IF NOT EXISTS expert_email_received (
                id TEXT PRIMARY KEY,
                expert_email_id TEXT NOT NULL REFERENCES expert_client_emails(id),
                expert_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                client_product_id TEXT,
                source_message_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL DEFAULT '',
                from_email TEXT NOT NULL,
                to_email TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                body_html TEXT,
                body_text TEXT,
                snippet TEXT NOT NULL DEFAULT '',
                in_reply_to TEXT,
                refs TEXT NOT NULL DEFAULT '[]',
                received_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                role TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                is_read INTEGER NOT NULL DEFAULT 0,
                action TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient
                ON notifications(recipient_id);
        "#,
    },
    Migration {
        version: 2,
        name: "import_system",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                email TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                company_name TEXT,
                siren TEXT,
                phone TEXT,
                city TEXT,
                auth_user_id TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_profiles_role_email ON profiles(role, email);

            CREATE TABLE IF NOT EXISTS auth_users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS client_product_links (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES profiles(id),
                product_id TEXT NOT NULL REFERENCES products(id),
                expert_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES profiles(id),
                expert_id TEXT,
                scheduled_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES profiles(id),
                expert_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS import_history (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                file_name TEXT NOT NULL,
                total_rows INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                skipped_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'processing',
                started_at TEXT NOT NULL,
                completed_at TEXT
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` tracking table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            conn.execute(
                "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
                libsql::params![migration.version, migration.name],
            )
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!(
                    "Failed to record migration V{}: {e}",
                    migration.version
                ))
            })?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}
