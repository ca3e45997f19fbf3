//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Metadata bags are
//! stored as JSON text; multi-row mutations (bounce stamping,
//! follow-up cancellation) run as sequential per-row updates, matching
//! the no-transaction contract of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::*;
use crate::store::traits::Store;

/// libSQL store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent
/// async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

/// Read a nullable TEXT column. NULL (or a missing value) maps to
/// `None` rather than an error.
fn get_opt(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("Invalid uuid {s}: {e}")))
}

fn parse_optional_uuid(s: Option<String>) -> Option<Uuid> {
    s.and_then(|s| Uuid::parse_str(&s).ok())
}

fn meta_to_json<T: serde::Serialize>(meta: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(meta).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn meta_from_json<T: serde::de::DeserializeOwned + Default>(s: &str) -> T {
    serde_json::from_str(s).unwrap_or_default()
}

fn refs_to_json(refs: &[String]) -> String {
    serde_json::to_string(refs).unwrap_or_else(|_| "[]".to_string())
}

fn refs_from_json(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

// ── Row mappers ─────────────────────────────────────────────────────

const PROSPECT_COLUMNS: &str = "id, email, first_name, last_name, company_name, siren, source, \
     emailing_status, email_validity, score_priority, metadata, created_at, updated_at";

fn row_to_prospect(row: &libsql::Row) -> Result<Prospect, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let metadata: String = row.get(10).map_err(query_err)?;
    let created: String = row.get(11).map_err(query_err)?;
    let updated: String = row.get(12).map_err(query_err)?;
    Ok(Prospect {
        id: parse_uuid(&id)?,
        email: row.get(1).map_err(query_err)?,
        first_name: get_opt(row, 2),
        last_name: get_opt(row, 3),
        company_name: get_opt(row, 4),
        siren: get_opt(row, 5),
        source: row.get(6).map_err(query_err)?,
        emailing_status: EmailingStatus::parse(&row.get::<String>(7).map_err(query_err)?),
        email_validity: EmailValidity::parse(&row.get::<String>(8).map_err(query_err)?),
        score_priority: row.get(9).map_err(query_err)?,
        metadata: meta_from_json(&metadata),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const OUTBOUND_COLUMNS: &str =
    "id, prospect_id, step, subject, sent_at, replied, replied_at, bounced, bounced_at, metadata";

fn row_to_outbound(row: &libsql::Row) -> Result<OutboundEmail, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let prospect_id: String = row.get(1).map_err(query_err)?;
    let sent_at: String = row.get(4).map_err(query_err)?;
    let metadata: String = row.get(9).map_err(query_err)?;
    Ok(OutboundEmail {
        id: parse_uuid(&id)?,
        prospect_id: parse_uuid(&prospect_id)?,
        step: row.get(2).map_err(query_err)?,
        subject: row.get(3).map_err(query_err)?,
        sent_at: parse_datetime(&sent_at),
        replied: row.get::<i64>(5).map_err(query_err)? != 0,
        replied_at: parse_optional_datetime(get_opt(row, 6)),
        bounced: row.get::<i64>(7).map_err(query_err)? != 0,
        bounced_at: parse_optional_datetime(get_opt(row, 8)),
        metadata: meta_from_json(&metadata),
    })
}

fn row_to_follow_up(row: &libsql::Row) -> Result<ScheduledFollowUp, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let prospect_id: String = row.get(1).map_err(query_err)?;
    let scheduled_for: String = row.get(3).map_err(query_err)?;
    let status: String = row.get(4).map_err(query_err)?;
    let metadata: String = row.get(5).map_err(query_err)?;
    Ok(ScheduledFollowUp {
        id: parse_uuid(&id)?,
        prospect_id: parse_uuid(&prospect_id)?,
        step_number: row.get(2).map_err(query_err)?,
        scheduled_for: parse_datetime(&scheduled_for),
        status: FollowUpStatus::parse(&status),
        metadata: meta_from_json(&metadata),
    })
}

const RECEIVED_COLUMNS: &str = "id, prospect_id, outbound_email_id, source_message_id, thread_id, \
     from_email, from_name, to_email, subject, body_html, body_text, snippet, in_reply_to, refs, \
     received_at, is_read, is_replied";

fn row_to_received(row: &libsql::Row) -> Result<ReceivedEmail, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let prospect_id: String = row.get(1).map_err(query_err)?;
    let refs: String = row.get(13).map_err(query_err)?;
    let received_at: String = row.get(14).map_err(query_err)?;
    Ok(ReceivedEmail {
        id: parse_uuid(&id)?,
        prospect_id: parse_uuid(&prospect_id)?,
        outbound_email_id: parse_optional_uuid(get_opt(row, 2)),
        source_message_id: row.get(3).map_err(query_err)?,
        thread_id: row.get(4).map_err(query_err)?,
        from_email: row.get(5).map_err(query_err)?,
        from_name: row.get(6).map_err(query_err)?,
        to_email: row.get(7).map_err(query_err)?,
        subject: row.get(8).map_err(query_err)?,
        body_html: get_opt(row, 9),
        body_text: get_opt(row, 10),
        snippet: row.get(11).map_err(query_err)?,
        in_reply_to: get_opt(row, 12),
        references: refs_from_json(&refs),
        received_at: parse_datetime(&received_at),
        is_read: row.get::<i64>(15).map_err(query_err)? != 0,
        is_replied: row.get::<i64>(16).map_err(query_err)? != 0,
    })
}

const EXPERT_EMAIL_COLUMNS: &str =
    "id, expert_id, client_id, client_product_id, subject, message_id, status, sent_at";

fn row_to_expert_email(row: &libsql::Row) -> Result<ExpertEmail, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let expert_id: String = row.get(1).map_err(query_err)?;
    let client_id: String = row.get(2).map_err(query_err)?;
    let sent_at: String = row.get(7).map_err(query_err)?;
    Ok(ExpertEmail {
        id: parse_uuid(&id)?,
        expert_id: parse_uuid(&expert_id)?,
        client_id: parse_uuid(&client_id)?,
        client_product_id: parse_optional_uuid(get_opt(row, 3)),
        subject: row.get(4).map_err(query_err)?,
        message_id: row.get(5).map_err(query_err)?,
        status: row.get(6).map_err(query_err)?,
        sent_at: parse_datetime(&sent_at),
    })
}

const PROFILE_COLUMNS: &str = "id, role, email, first_name, last_name, company_name, siren, \
     phone, city, auth_user_id, active, created_at";

fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let role: String = row.get(1).map_err(query_err)?;
    let created_at: String = row.get(11).map_err(query_err)?;
    Ok(Profile {
        id: parse_uuid(&id)?,
        role: Role::parse(&role).ok_or_else(|| {
            DatabaseError::Serialization(format!("Unknown profile role: {role}"))
        })?,
        email: row.get(2).map_err(query_err)?,
        first_name: get_opt(row, 3),
        last_name: get_opt(row, 4),
        company_name: get_opt(row, 5),
        siren: get_opt(row, 6),
        phone: get_opt(row, 7),
        city: get_opt(row, 8),
        auth_user_id: get_opt(row, 9),
        active: row.get::<i64>(10).map_err(query_err)? != 0,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_notification(row: &libsql::Row) -> Result<Notification, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let recipient: String = row.get(1).map_err(query_err)?;
    let role: String = row.get(2).map_err(query_err)?;
    let priority: String = row.get(6).map_err(query_err)?;
    let action: String = row.get(8).map_err(query_err)?;
    let created_at: String = row.get(9).map_err(query_err)?;
    Ok(Notification {
        id: parse_uuid(&id)?,
        recipient_id: parse_uuid(&recipient)?,
        role: Role::parse(&role).unwrap_or(Role::Admin),
        kind: row.get(3).map_err(query_err)?,
        title: row.get(4).map_err(query_err)?,
        message: row.get(5).map_err(query_err)?,
        priority: NotificationPriority::parse(&priority),
        is_read: row.get::<i64>(7).map_err(query_err)? != 0,
        action: meta_from_json(&action),
        created_at: parse_datetime(&created_at),
    })
}

// ── Store implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlStore {
    async fn insert_prospect(&self, new: NewProspect) -> Result<Prospect, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata = meta_to_json(&new.metadata)?;

        self.conn()
            .execute(
                "INSERT INTO prospects (id, email, first_name, last_name, company_name, siren, \
                 source, emailing_status, email_validity, score_priority, metadata, created_at, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id.to_string(),
                    new.email.to_lowercase(),
                    new.first_name.clone(),
                    new.last_name.clone(),
                    new.company_name.clone(),
                    new.siren.clone(),
                    new.source.clone(),
                    new.emailing_status.as_str(),
                    new.email_validity.as_str(),
                    new.score_priority,
                    metadata,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;

        Ok(Prospect {
            id,
            email: new.email.to_lowercase(),
            first_name: new.first_name,
            last_name: new.last_name,
            company_name: new.company_name,
            siren: new.siren,
            source: new.source,
            emailing_status: new.emailing_status,
            email_validity: new.email_validity,
            score_priority: new.score_priority,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, DatabaseError> {
        let sql = format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![id.to_string()])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_prospect(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_prospect_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Prospect>, DatabaseError> {
        let sql = format!(
            "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE lower(email) = lower(?1) LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![email])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_prospect(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_prospects_with_email(&self) -> Result<Vec<Prospect>, DatabaseError> {
        let sql = format!(
            "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE email != '' ORDER BY created_at ASC"
        );
        let mut rows = self.conn().query(&sql, ()).await.map_err(query_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            out.push(row_to_prospect(&row)?);
        }
        Ok(out)
    }

    async fn update_prospect_status(
        &self,
        id: Uuid,
        status: EmailingStatus,
        validity: Option<EmailValidity>,
        metadata: &ProspectMeta,
    ) -> Result<(), DatabaseError> {
        let meta = meta_to_json(metadata)?;
        let now = Utc::now().to_rfc3339();
        let changed = match validity {
            Some(v) => self
                .conn()
                .execute(
                    "UPDATE prospects SET emailing_status = ?1, email_validity = ?2, \
                     metadata = ?3, updated_at = ?4 WHERE id = ?5",
                    params![status.as_str(), v.as_str(), meta, now, id.to_string()],
                )
                .await
                .map_err(query_err)?,
            None => self
                .conn()
                .execute(
                    "UPDATE prospects SET emailing_status = ?1, metadata = ?2, updated_at = ?3 \
                     WHERE id = ?4",
                    params![status.as_str(), meta, now, id.to_string()],
                )
                .await
                .map_err(query_err)?,
        };
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "prospect".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_outbound_email(
        &self,
        new: NewOutboundEmail,
    ) -> Result<OutboundEmail, DatabaseError> {
        let id = Uuid::new_v4();
        let metadata = meta_to_json(&new.metadata)?;

        self.conn()
            .execute(
                "INSERT INTO prospect_emails (id, prospect_id, step, subject, sent_at, replied, \
                 bounced, metadata) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
                params![
                    id.to_string(),
                    new.prospect_id.to_string(),
                    new.step,
                    new.subject.clone(),
                    new.sent_at.to_rfc3339(),
                    metadata,
                ],
            )
            .await
            .map_err(query_err)?;

        Ok(OutboundEmail {
            id,
            prospect_id: new.prospect_id,
            step: new.step,
            subject: new.subject,
            sent_at: new.sent_at,
            replied: false,
            replied_at: None,
            bounced: false,
            bounced_at: None,
            metadata: new.metadata,
        })
    }

    async fn latest_unreplied_outbound(
        &self,
        prospect_id: Uuid,
    ) -> Result<Option<OutboundEmail>, DatabaseError> {
        let sql = format!(
            "SELECT {OUTBOUND_COLUMNS} FROM prospect_emails \
             WHERE prospect_id = ?1 AND replied = 0 ORDER BY sent_at DESC LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![prospect_id.to_string()])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_outbound(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_outbound_replied(
        &self,
        id: Uuid,
        replied_at: DateTime<Utc>,
        stamp: &ReplyStamp,
    ) -> Result<(), DatabaseError> {
        // Merge the reply snapshot into the existing metadata bag.
        let sql = format!("SELECT {OUTBOUND_COLUMNS} FROM prospect_emails WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![id.to_string()])
            .await
            .map_err(query_err)?;
        let row = rows.next().await.map_err(query_err)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity: "prospect_email".into(),
                id: id.to_string(),
            }
        })?;
        let mut record = row_to_outbound(&row)?;
        record.metadata.message_id = Some(stamp.message_id.clone());
        record.metadata.reply_from = Some(stamp.reply_from.clone());
        record.metadata.reply_subject = Some(stamp.reply_subject.clone());
        record.metadata.received_email_id = Some(stamp.received_email_id);
        let meta = meta_to_json(&record.metadata)?;

        self.conn()
            .execute(
                "UPDATE prospect_emails SET replied = 1, replied_at = ?1, metadata = ?2 \
                 WHERE id = ?3",
                params![replied_at.to_rfc3339(), meta, id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn mark_outbounds_bounced(
        &self,
        prospect_id: Uuid,
        bounced_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<usize, DatabaseError> {
        let sql = format!(
            "SELECT {OUTBOUND_COLUMNS} FROM prospect_emails \
             WHERE prospect_id = ?1 AND bounced = 0"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![prospect_id.to_string()])
            .await
            .map_err(query_err)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_outbound(&row)?);
        }

        let mut updated = 0;
        for mut record in records {
            record.metadata.bounce_reason = Some(reason.to_string());
            let meta = meta_to_json(&record.metadata)?;
            self.conn()
                .execute(
                    "UPDATE prospect_emails SET bounced = 1, bounced_at = ?1, metadata = ?2 \
                     WHERE id = ?3",
                    params![bounced_at.to_rfc3339(), meta, record.id.to_string()],
                )
                .await
                .map_err(query_err)?;
            updated += 1;
        }
        Ok(updated)
    }

    async fn insert_follow_up(
        &self,
        prospect_id: Uuid,
        step_number: i64,
        scheduled_for: DateTime<Utc>,
        status: FollowUpStatus,
    ) -> Result<ScheduledFollowUp, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO prospect_email_scheduled (id, prospect_id, step_number, \
                 scheduled_for, status, metadata) VALUES (?1, ?2, ?3, ?4, ?5, '{}')",
                params![
                    id.to_string(),
                    prospect_id.to_string(),
                    step_number,
                    scheduled_for.to_rfc3339(),
                    status.as_str(),
                ],
            )
            .await
            .map_err(query_err)?;

        Ok(ScheduledFollowUp {
            id,
            prospect_id,
            step_number,
            scheduled_for,
            status,
            metadata: FollowUpMeta::default(),
        })
    }

    async fn cancel_active_follow_ups(
        &self,
        prospect_id: Uuid,
        meta: &FollowUpMeta,
    ) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, prospect_id, step_number, scheduled_for, status, metadata \
                 FROM prospect_email_scheduled \
                 WHERE prospect_id = ?1 AND status IN ('scheduled', 'pending')",
                params![prospect_id.to_string()],
            )
            .await
            .map_err(query_err)?;
        let mut follow_ups = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            follow_ups.push(row_to_follow_up(&row)?);
        }

        let mut cancelled = 0;
        for mut follow_up in follow_ups {
            follow_up.metadata.cancelled_reason = meta.cancelled_reason.clone();
            follow_up.metadata.cancelled_at = meta.cancelled_at;
            follow_up.metadata.reply_from = meta.reply_from.clone();
            let merged = meta_to_json(&follow_up.metadata)?;
            self.conn()
                .execute(
                    "UPDATE prospect_email_scheduled SET status = 'cancelled', metadata = ?1 \
                     WHERE id = ?2",
                    params![merged, follow_up.id.to_string()],
                )
                .await
                .map_err(query_err)?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn count_active_follow_ups(&self, prospect_id: Uuid) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM prospect_email_scheduled \
                 WHERE prospect_id = ?1 AND status IN ('scheduled', 'pending')",
                params![prospect_id.to_string()],
            )
            .await
            .map_err(query_err)?;
        let row = rows.next().await.map_err(query_err)?;
        match row {
            Some(row) => Ok(row.get::<i64>(0).map_err(query_err)? as usize),
            None => Ok(0),
        }
    }

    async fn received_email_exists(
        &self,
        source_message_id: &str,
    ) -> Result<bool, DatabaseError> {
        for table in ["prospect_email_received", "expert_email_received"] {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE source_message_id = ?1");
            let mut rows = self
                .conn()
                .query(&sql, params![source_message_id])
                .await
                .map_err(query_err)?;
            if let Some(row) = rows.next().await.map_err(query_err)? {
                if row.get::<i64>(0).map_err(query_err)? > 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn insert_received_email(
        &self,
        new: NewReceivedEmail,
    ) -> Result<ReceivedEmail, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO prospect_email_received (id, prospect_id, outbound_email_id, \
                 source_message_id, thread_id, from_email, from_name, to_email, subject, \
                 body_html, body_text, snippet, in_reply_to, refs, received_at, is_read, \
                 is_replied) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, 0)",
                params![
                    id.to_string(),
                    new.prospect_id.to_string(),
                    new.outbound_email_id.map(|u| u.to_string()),
                    new.source_message_id.clone(),
                    new.thread_id.clone(),
                    new.from_email.clone(),
                    new.from_name.clone(),
                    new.to_email.clone(),
                    new.subject.clone(),
                    new.body_html.clone(),
                    new.body_text.clone(),
                    new.snippet.clone(),
                    new.in_reply_to.clone(),
                    refs_to_json(&new.references),
                    new.received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;

        Ok(ReceivedEmail {
            id,
            prospect_id: new.prospect_id,
            outbound_email_id: new.outbound_email_id,
            source_message_id: new.source_message_id,
            thread_id: new.thread_id,
            from_email: new.from_email,
            from_name: new.from_name,
            to_email: new.to_email,
            subject: new.subject,
            body_html: new.body_html,
            body_text: new.body_text,
            snippet: new.snippet,
            in_reply_to: new.in_reply_to,
            references: new.references,
            received_at: new.received_at,
            is_read: false,
            is_replied: false,
        })
    }

    async fn get_received_email_by_message_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<ReceivedEmail>, DatabaseError> {
        let sql = format!(
            "SELECT {RECEIVED_COLUMNS} FROM prospect_email_received \
             WHERE source_message_id = ?1 LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![source_message_id])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_received(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_expert_received_email(
        &self,
        new: NewExpertReceivedEmail,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO expert_email_received (id, expert_email_id, expert_id, client_id, \
                 client_product_id, source_message_id, thread_id, from_email, to_email, subject, \
                 body_html, body_text, snippet, in_reply_to, refs, received_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    id.to_string(),
                    new.expert_email_id.to_string(),
                    new.expert_id.to_string(),
                    new.client_id.to_string(),
                    new.client_product_id.map(|u| u.to_string()),
                    new.source_message_id.clone(),
                    new.thread_id.clone(),
                    new.from_email.clone(),
                    new.to_email.clone(),
                    new.subject.clone(),
                    new.body_html.clone(),
                    new.body_text.clone(),
                    new.snippet.clone(),
                    new.in_reply_to.clone(),
                    refs_to_json(&new.references),
                    new.received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;
        Ok(id)
    }

    async fn insert_expert_email(
        &self,
        new: NewExpertEmail,
    ) -> Result<ExpertEmail, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO expert_client_emails (id, expert_id, client_id, client_product_id, \
                 subject, message_id, status, sent_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.to_string(),
                    new.expert_id.to_string(),
                    new.client_id.to_string(),
                    new.client_product_id.map(|u| u.to_string()),
                    new.subject.clone(),
                    new.message_id.clone(),
                    new.status.clone(),
                    new.sent_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;

        Ok(ExpertEmail {
            id,
            expert_id: new.expert_id,
            client_id: new.client_id,
            client_product_id: new.client_product_id,
            subject: new.subject,
            message_id: new.message_id,
            status: new.status,
            sent_at: new.sent_at,
        })
    }

    async fn find_sent_expert_email_by_message_ids(
        &self,
        candidates: &[String],
    ) -> Result<Option<ExpertEmail>, DatabaseError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let placeholders: Vec<String> =
            (1..=candidates.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT {EXPERT_EMAIL_COLUMNS} FROM expert_client_emails \
             WHERE status = 'sent' AND message_id IN ({}) ORDER BY sent_at ASC LIMIT 1",
            placeholders.join(", ")
        );
        let values: Vec<libsql::Value> = candidates
            .iter()
            .map(|c| libsql::Value::from(c.clone()))
            .collect();
        let mut rows = self.conn().query(&sql, values).await.map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_expert_email(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_sent_expert_email_containing(
        &self,
        fragment: &str,
    ) -> Result<Option<ExpertEmail>, DatabaseError> {
        let sql = format!(
            "SELECT {EXPERT_EMAIL_COLUMNS} FROM expert_client_emails \
             WHERE status = 'sent' AND message_id LIKE '%' || ?1 || '%' \
             ORDER BY sent_at ASC LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![fragment])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_expert_email(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_profile(&self, new: NewProfile) -> Result<Profile, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO profiles (id, role, email, first_name, last_name, company_name, \
                 siren, phone, city, auth_user_id, active, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)",
                params![
                    id.to_string(),
                    new.role.as_str(),
                    new.email.to_lowercase(),
                    new.first_name.clone(),
                    new.last_name.clone(),
                    new.company_name.clone(),
                    new.siren.clone(),
                    new.phone.clone(),
                    new.city.clone(),
                    new.auth_user_id.clone(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;

        Ok(Profile {
            id,
            role: new.role,
            email: new.email.to_lowercase(),
            first_name: new.first_name,
            last_name: new.last_name,
            company_name: new.company_name,
            siren: new.siren,
            phone: new.phone,
            city: new.city,
            auth_user_id: new.auth_user_id,
            active: true,
            created_at: now,
        })
    }

    async fn list_active_profiles_by_role(
        &self,
        role: Role,
    ) -> Result<Vec<Profile>, DatabaseError> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE role = ?1 AND active = 1 ORDER BY created_at ASC"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![role.as_str()])
            .await
            .map_err(query_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            out.push(row_to_profile(&row)?);
        }
        Ok(out)
    }

    async fn profile_email_exists(
        &self,
        role: Role,
        email: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM profiles WHERE role = ?1 AND lower(email) = lower(?2)",
                params![role.as_str(), email],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(query_err)? > 0),
            None => Ok(false),
        }
    }

    async fn profile_siren_exists(
        &self,
        role: Role,
        siren: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM profiles WHERE role = ?1 AND siren = ?2",
                params![role.as_str(), siren],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(query_err)? > 0),
            None => Ok(false),
        }
    }

    async fn find_profile_fuzzy(
        &self,
        role: Role,
        needle: &str,
    ) -> Result<Option<Profile>, DatabaseError> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE role = ?1 AND active = 1 AND ( \
                 lower(coalesce(first_name, '') || ' ' || coalesce(last_name, '') || ' ' || \
                       coalesce(company_name, '')) LIKE '%' || lower(?2) || '%' \
                 OR lower(email) LIKE '%' || lower(?2) || '%') \
             ORDER BY created_at ASC LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![role.as_str(), needle])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_auth_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO auth_users (id, email, password_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.clone(),
                    email.to_lowercase(),
                    password_hash,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;
        Ok(id)
    }

    async fn delete_auth_user(&self, auth_user_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM auth_users WHERE id = ?1",
                params![auth_user_id],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn insert_product(&self, name: &str) -> Result<Product, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO products (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), name, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(Product {
            id,
            name: name.to_string(),
        })
    }

    async fn find_product_by_id_or_name(
        &self,
        needle: &str,
    ) -> Result<Option<Product>, DatabaseError> {
        // Exact id match first, then fuzzy name match.
        if let Ok(id) = Uuid::parse_str(needle.trim()) {
            let mut rows = self
                .conn()
                .query(
                    "SELECT id, name FROM products WHERE id = ?1",
                    params![id.to_string()],
                )
                .await
                .map_err(query_err)?;
            if let Some(row) = rows.next().await.map_err(query_err)? {
                let id: String = row.get(0).map_err(query_err)?;
                return Ok(Some(Product {
                    id: parse_uuid(&id)?,
                    name: row.get(1).map_err(query_err)?,
                }));
            }
        }

        let mut rows = self
            .conn()
            .query(
                "SELECT id, name FROM products WHERE lower(name) LIKE '%' || lower(?1) || '%' \
                 ORDER BY created_at ASC LIMIT 1",
                params![needle.trim()],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let id: String = row.get(0).map_err(query_err)?;
                Ok(Some(Product {
                    id: parse_uuid(&id)?,
                    name: row.get(1).map_err(query_err)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_client_product_link(
        &self,
        new: NewClientProductLink,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO client_product_links (id, client_id, product_id, expert_id, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    new.client_id.to_string(),
                    new.product_id.to_string(),
                    new.expert_id.map(|u| u.to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO appointments (id, client_id, expert_id, scheduled_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    new.client_id.to_string(),
                    new.expert_id.map(|u| u.to_string()),
                    new.scheduled_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn insert_assignment(&self, new: NewAssignment) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO assignments (id, client_id, expert_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    new.client_id.to_string(),
                    new.expert_id.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let action = meta_to_json(&new.action)?;
        self.conn()
            .execute(
                "INSERT INTO notifications (id, recipient_id, role, kind, title, message, \
                 priority, is_read, action, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
                params![
                    id.to_string(),
                    new.recipient_id.to_string(),
                    new.role.as_str(),
                    new.kind.clone(),
                    new.title.clone(),
                    new.message.clone(),
                    new.priority.as_str(),
                    action,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, recipient_id, role, kind, title, message, priority, is_read, \
                 action, created_at FROM notifications WHERE recipient_id = ?1 \
                 ORDER BY created_at DESC",
                params![recipient_id.to_string()],
            )
            .await
            .map_err(query_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            out.push(row_to_notification(&row)?);
        }
        Ok(out)
    }

    async fn insert_import_history(
        &self,
        entity_type: Role,
        file_name: &str,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO import_history (id, entity_type, file_name, status, started_at) \
                 VALUES (?1, ?2, ?3, 'processing', ?4)",
                params![
                    id.to_string(),
                    entity_type.as_str(),
                    file_name,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn complete_import_history(
        &self,
        id: Uuid,
        total: i64,
        success: i64,
        error: i64,
        skipped: i64,
        status: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE import_history SET total_rows = ?1, success_count = ?2, \
                 error_count = ?3, skipped_count = ?4, status = ?5, completed_at = ?6 \
                 WHERE id = ?7",
                params![
                    total,
                    success,
                    error,
                    skipped,
                    status,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_prospect(email: &str) -> NewProspect {
        NewProspect {
            email: email.into(),
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            company_name: Some("Acme".into()),
            siren: None,
            source: "import_csv".into(),
            emailing_status: EmailingStatus::Contacted,
            email_validity: EmailValidity::Valid,
            score_priority: 3,
            metadata: ProspectMeta::default(),
        }
    }

    #[tokio::test]
    async fn prospect_email_lookup_is_case_insensitive() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_prospect(new_prospect("Jane@Acme.COM"))
            .await
            .unwrap();

        let found = store
            .find_prospect_by_email("JANE@acme.com")
            .await
            .unwrap()
            .unwrap();
        // Stored lowercase on insert.
        assert_eq!(found.email, "jane@acme.com");
    }

    #[tokio::test]
    async fn duplicate_prospect_email_is_a_constraint_violation() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_prospect(new_prospect("jane@acme.com"))
            .await
            .unwrap();
        let err = store
            .insert_prospect(new_prospect("jane@acme.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn latest_unreplied_outbound_skips_replied_records() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let prospect = store
            .insert_prospect(new_prospect("jane@acme.com"))
            .await
            .unwrap();

        let older = store
            .insert_outbound_email(NewOutboundEmail {
                prospect_id: prospect.id,
                step: 1,
                subject: "Step 1".into(),
                sent_at: Utc::now() - chrono::Duration::days(7),
                metadata: OutboundMeta::default(),
            })
            .await
            .unwrap();
        let newer = store
            .insert_outbound_email(NewOutboundEmail {
                prospect_id: prospect.id,
                step: 2,
                subject: "Step 2".into(),
                sent_at: Utc::now() - chrono::Duration::days(1),
                metadata: OutboundMeta::default(),
            })
            .await
            .unwrap();

        // The newest record is already replied — must not be returned.
        store
            .mark_outbound_replied(
                newer.id,
                Utc::now(),
                &ReplyStamp {
                    message_id: "m1".into(),
                    reply_from: "jane@acme.com".into(),
                    reply_subject: "Re:".into(),
                    received_email_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap();

        let found = store
            .latest_unreplied_outbound(prospect.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, older.id);
    }

    #[tokio::test]
    async fn cancel_active_follow_ups_leaves_sent_untouched() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let prospect = store
            .insert_prospect(new_prospect("jane@acme.com"))
            .await
            .unwrap();

        store
            .insert_follow_up(prospect.id, 1, Utc::now(), FollowUpStatus::Sent)
            .await
            .unwrap();
        store
            .insert_follow_up(prospect.id, 2, Utc::now(), FollowUpStatus::Scheduled)
            .await
            .unwrap();
        store
            .insert_follow_up(prospect.id, 3, Utc::now(), FollowUpStatus::Pending)
            .await
            .unwrap();

        let cancelled = store
            .cancel_active_follow_ups(
                prospect.id,
                &FollowUpMeta {
                    cancelled_reason: Some("prospect_replied".into()),
                    cancelled_at: Some(Utc::now()),
                    reply_from: Some("jane@acme.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(cancelled, 2);
        assert_eq!(store.count_active_follow_ups(prospect.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn received_email_dedup_key_covers_both_variants() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let prospect = store
            .insert_prospect(new_prospect("jane@acme.com"))
            .await
            .unwrap();

        assert!(!store.received_email_exists("gm-1").await.unwrap());

        store
            .insert_received_email(NewReceivedEmail {
                prospect_id: prospect.id,
                outbound_email_id: None,
                source_message_id: "gm-1".into(),
                thread_id: "t-1".into(),
                from_email: "jane@acme.com".into(),
                from_name: "Jane Doe".into(),
                to_email: "us@example.com".into(),
                subject: "Re: hello".into(),
                body_html: None,
                body_text: Some("yes".into()),
                snippet: "yes".into(),
                in_reply_to: Some("<abc@mail>".into()),
                references: vec!["<abc@mail>".into()],
                received_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.received_email_exists("gm-1").await.unwrap());
    }

    #[tokio::test]
    async fn expert_email_match_exact_and_substring() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let sent = store
            .insert_expert_email(NewExpertEmail {
                expert_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                client_product_id: None,
                subject: "Intro".into(),
                message_id: "<abc123@smtp.example.com>".into(),
                status: "sent".into(),
                sent_at: Utc::now(),
            })
            .await
            .unwrap();

        let exact = store
            .find_sent_expert_email_by_message_ids(&["<abc123@smtp.example.com>".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exact.id, sent.id);

        let fuzzy = store
            .find_sent_expert_email_containing("abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fuzzy.id, sent.id);

        assert!(
            store
                .find_sent_expert_email_by_message_ids(&["<other@x>".into()])
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn draft_expert_emails_never_match() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_expert_email(NewExpertEmail {
                expert_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                client_product_id: None,
                subject: "Draft".into(),
                message_id: "<draft@smtp>".into(),
                status: "draft".into(),
                sent_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(
            store
                .find_sent_expert_email_by_message_ids(&["<draft@smtp>".into()])
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn fuzzy_profile_match_on_name_or_email() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let expert = store
            .insert_profile(NewProfile {
                role: Role::Expert,
                email: "marc@experts.fr".into(),
                first_name: Some("Marc".into()),
                last_name: Some("Dupont".into()),
                company_name: Some("Dupont Conseil".into()),
                siren: None,
                phone: None,
                city: None,
                auth_user_id: Some("auth-1".into()),
            })
            .await
            .unwrap();

        let by_name = store
            .find_profile_fuzzy(Role::Expert, "dupont")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, expert.id);

        let by_email = store
            .find_profile_fuzzy(Role::Expert, "marc@experts")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, expert.id);

        assert!(
            store
                .find_profile_fuzzy(Role::Client, "dupont")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn product_resolution_by_id_then_name() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let product = store.insert_product("TICPE").await.unwrap();

        let by_id = store
            .find_product_by_id_or_name(&product.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.id, product.id);

        let by_name = store
            .find_product_by_id_or_name("ticpe")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, product.id);
    }

    #[tokio::test]
    async fn prospect_metadata_round_trips_unknown_keys() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut meta = ProspectMeta::default();
        meta.extra
            .insert("enrichment_score".into(), serde_json::json!(42));
        let mut new = new_prospect("jane@acme.com");
        new.metadata = meta;
        let prospect = store.insert_prospect(new).await.unwrap();

        let loaded = store.get_prospect(prospect.id).await.unwrap().unwrap();
        assert_eq!(loaded.metadata.extra["enrichment_score"], 42);
    }
}
