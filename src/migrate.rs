use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Visitor sessions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Conversation turns
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'tool')),
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Captured contacts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            company TEXT,
            position TEXT,
            notes TEXT,
            interest_level TEXT NOT NULL DEFAULT 'medium'
                CHECK (interest_level IN ('low', 'medium', 'high')),
            captured_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Questions the assistant could not answer
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unknown_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            question TEXT NOT NULL,
            asked_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Document metadata
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            filename TEXT PRIMARY KEY,
            file_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            content_length INTEGER NOT NULL,
            size_bytes INTEGER NOT NULL,
            summary TEXT NOT NULL,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            processed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Analytics events
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analytics_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            event_data TEXT,
            session_id TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Turns, contacts, and unknown questions are append-only facts
    for table in ["turns", "contacts", "unknown_questions"] {
        let sql = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {table}_append_only
            BEFORE UPDATE ON {table}
            BEGIN
                SELECT RAISE(ABORT, '{table} rows are append-only');
            END
            "#
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_created_at ON turns(created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_captured_at ON contacts(captured_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_unknown_questions_question ON unknown_questions(question)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analytics_events_type ON analytics_events(event_type, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
