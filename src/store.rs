//! Persistence layer: append/read accessors over the SQLite tables.
//!
//! [`Store`] is a cheap-to-clone handle around the connection pool. It is
//! passed explicitly to the conversation engine and the tool functions;
//! there is no global database handle.
//!
//! Turns, contacts, and unknown questions are append-only. Sessions are
//! the only rows that change after insertion (`last_seen_at`,
//! `message_count`).

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::{Config, HistoryPolicy};
use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{
    now_ts, Contact, ConversationTurn, DocumentRecord, NewContact, Role, UnknownQuestion,
    VisitorSession,
};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database file and apply migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A migrated private in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = db::connect_in_memory().await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============ Sessions ============

    /// Create the session on first sight, otherwise refresh `last_seen_at`.
    pub async fn touch_session(&self, session_id: &str) -> Result<VisitorSession> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, started_at, last_seen_at, message_count)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(session_id) DO UPDATE SET last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.session(session_id)
            .await?
            .ok_or(Error::Persistence(sqlx::Error::RowNotFound))
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<VisitorSession>> {
        let row = sqlx::query(
            "SELECT session_id, started_at, last_seen_at, message_count FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| VisitorSession {
            session_id: row.get("session_id"),
            started_at: row.get("started_at"),
            last_seen_at: row.get("last_seen_at"),
            message_count: row.get("message_count"),
        }))
    }

    // ============ Turns ============

    /// Append a single turn, creating the session if needed.
    pub async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn> {
        let mut turns = self.append_turns(session_id, &[(role, content)]).await?;
        turns
            .pop()
            .ok_or(Error::Persistence(sqlx::Error::RowNotFound))
    }

    /// Append turns in order within one transaction: ensure the session
    /// exists, insert every turn, bump `message_count` and `last_seen_at`.
    /// Either all turns are recorded or none are.
    pub async fn append_turns(
        &self,
        session_id: &str,
        turns: &[(Role, &str)],
    ) -> Result<Vec<ConversationTurn>> {
        if turns.iter().any(|(role, _)| *role == Role::System) {
            return Err(Error::Validation(
                "system messages are not stored as turns".to_string(),
            ));
        }

        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, started_at, last_seen_at, message_count)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(turns.len());
        for (role, content) in turns {
            let id = sqlx::query(
                "INSERT INTO turns (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(role.as_str())
            .bind(*content)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            stored.push(ConversationTurn {
                id,
                session_id: session_id.to_string(),
                role: *role,
                content: content.to_string(),
                created_at: now,
            });
        }

        sqlx::query(
            "UPDATE sessions SET message_count = message_count + ?, last_seen_at = ? WHERE session_id = ?",
        )
        .bind(turns.len() as i64)
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    /// Every turn of a session (all roles), oldest first.
    pub async fn turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM turns WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(turn_from_row).collect()
    }

    /// User and assistant turns to replay to the model, oldest first,
    /// truncated according to `policy`.
    pub async fn history(
        &self,
        session_id: &str,
        policy: HistoryPolicy,
    ) -> Result<Vec<ConversationTurn>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit: i64 = match policy {
            HistoryPolicy::DropOldest { max_turns } => max_turns as i64,
            HistoryPolicy::Unbounded => -1,
        };

        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, created_at FROM (
                SELECT id, session_id, role, content, created_at
                FROM turns
                WHERE session_id = ? AND role IN ('user', 'assistant')
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(turn_from_row).collect()
    }

    // ============ Contacts ============

    pub async fn insert_contact(&self, contact: &NewContact) -> Result<Contact> {
        let now = now_ts();
        let id = sqlx::query(
            r#"
            INSERT INTO contacts (session_id, name, email, company, position, notes, interest_level, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contact.session_id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.company)
        .bind(&contact.position)
        .bind(&contact.notes)
        .bind(contact.interest_level.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Contact {
            id,
            session_id: contact.session_id.clone(),
            name: contact.name.clone(),
            email: contact.email.clone(),
            company: contact.company.clone(),
            position: contact.position.clone(),
            notes: contact.notes.clone(),
            interest_level: contact.interest_level,
            captured_at: now,
        })
    }

    /// Most recently captured contacts first.
    pub async fn recent_contacts(&self, limit: i64) -> Result<Vec<Contact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, name, email, company, position, notes, interest_level, captured_at
            FROM contacts
            ORDER BY captured_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let level: String = row.get("interest_level");
                Ok(Contact {
                    id: row.get("id"),
                    session_id: row.get("session_id"),
                    name: row.get("name"),
                    email: row.get("email"),
                    company: row.get("company"),
                    position: row.get("position"),
                    notes: row.get("notes"),
                    interest_level: level.parse()?,
                    captured_at: row.get("captured_at"),
                })
            })
            .collect()
    }

    pub async fn contact_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ============ Unknown questions ============

    pub async fn insert_unknown_question(
        &self,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<UnknownQuestion> {
        let now = now_ts();
        let id = sqlx::query(
            "INSERT INTO unknown_questions (session_id, question, asked_at) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(question)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(UnknownQuestion {
            id,
            session_id: session_id.map(str::to_string),
            question_text: question.to_string(),
            asked_at: now,
        })
    }

    pub async fn recent_unknown_questions(&self, limit: i64) -> Result<Vec<UnknownQuestion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, question, asked_at
            FROM unknown_questions
            ORDER BY asked_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UnknownQuestion {
                id: row.get("id"),
                session_id: row.get("session_id"),
                question_text: row.get("question"),
                asked_at: row.get("asked_at"),
            })
            .collect())
    }

    // ============ Documents ============

    /// Record (or refresh) the metadata of a processed document.
    pub async fn upsert_document(&self, record: &DocumentRecord) -> Result<()> {
        let keywords_json = serde_json::to_string(&record.keywords)?;

        sqlx::query(
            r#"
            INSERT INTO documents (filename, file_type, content_hash, content_length, size_bytes, summary, keywords_json, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                file_type = excluded.file_type,
                content_hash = excluded.content_hash,
                content_length = excluded.content_length,
                size_bytes = excluded.size_bytes,
                summary = excluded.summary,
                keywords_json = excluded.keywords_json,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(&record.filename)
        .bind(&record.file_type)
        .bind(&record.content_hash)
        .bind(record.content_length() as i64)
        .bind(record.size_bytes as i64)
        .bind(&record.summary)
        .bind(&keywords_json)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============ Analytics events ============

    pub async fn log_event(
        &self,
        event_type: &str,
        data: serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics_events (event_type, event_data, session_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(event_type)
        .bind(data.to_string())
        .bind(session_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn turn_from_row(row: &SqliteRow) -> Result<ConversationTurn> {
    let role: String = row.get("role");
    Ok(ConversationTurn {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: role.parse()?,
        content: row.get("content"),
        created_at: row.get("created_at"),
    })
}
