//! Read-side analytics over the conversation database.
//!
//! Nothing here is maintained incrementally: every figure is a SQL
//! aggregate computed when asked for. Used by `folio analytics` and the
//! `GET /analytics` endpoint.

use serde::Serialize;
use sqlx::Row;

use crate::error::Result;
use crate::models::{now_ts, InterestLevel};
use crate::store::Store;

const TOP_UNKNOWN_QUESTIONS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD` (UTC).
    pub day: String,
    pub messages: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestCount {
    pub level: InterestLevel,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionFrequency {
    pub question: String,
    pub frequency: i64,
    pub last_asked: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub period_days: u32,
    pub since: i64,
    /// Visitor messages in the period.
    pub total_conversations: i64,
    pub unique_visitors: i64,
    pub new_contacts: i64,
    pub daily_messages: Vec<DailyCount>,
    pub interest_levels: Vec<InterestCount>,
    pub common_unknown_questions: Vec<QuestionFrequency>,
    pub events_by_type: Vec<EventCount>,
}

/// Aggregate the last `days` days of activity.
pub async fn summary(store: &Store, days: u32) -> Result<AnalyticsSummary> {
    let pool = store.pool();
    let since = now_ts() - i64::from(days) * 86_400;

    let total_conversations: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM turns WHERE role = 'user' AND created_at >= ?",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    let unique_visitors: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT session_id) FROM turns WHERE created_at >= ?")
            .bind(since)
            .fetch_one(pool)
            .await?;

    let new_contacts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE captured_at >= ?")
            .bind(since)
            .fetch_one(pool)
            .await?;

    let daily_messages = sqlx::query(
        r#"
        SELECT date(created_at, 'unixepoch') AS day, COUNT(*) AS messages
        FROM turns
        WHERE role = 'user' AND created_at >= ?
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| DailyCount {
        day: row.get("day"),
        messages: row.get("messages"),
    })
    .collect();

    let level_rows = sqlx::query(
        r#"
        SELECT interest_level, COUNT(*) AS count
        FROM contacts
        WHERE captured_at >= ?
        GROUP BY interest_level
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    let interest_levels = InterestLevel::ALL
        .iter()
        .map(|level| InterestCount {
            level: *level,
            count: level_rows
                .iter()
                .find(|row| row.get::<String, _>("interest_level") == level.as_str())
                .map(|row| row.get("count"))
                .unwrap_or(0),
        })
        .collect();

    // All-time, like the unanswered-question backlog it describes
    let common_unknown_questions = sqlx::query(
        r#"
        SELECT question, COUNT(*) AS frequency, MAX(asked_at) AS last_asked
        FROM unknown_questions
        GROUP BY question
        ORDER BY frequency DESC, last_asked DESC
        LIMIT ?
        "#,
    )
    .bind(TOP_UNKNOWN_QUESTIONS)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| QuestionFrequency {
        question: row.get("question"),
        frequency: row.get("frequency"),
        last_asked: row.get("last_asked"),
    })
    .collect();

    let events_by_type = sqlx::query(
        r#"
        SELECT event_type, COUNT(*) AS count
        FROM analytics_events
        WHERE created_at >= ?
        GROUP BY event_type
        ORDER BY count DESC, event_type ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| EventCount {
        event_type: row.get("event_type"),
        count: row.get("count"),
    })
    .collect();

    Ok(AnalyticsSummary {
        period_days: days,
        since,
        total_conversations,
        unique_visitors,
        new_contacts,
        daily_messages,
        interest_levels,
        common_unknown_questions,
        events_by_type,
    })
}

/// Human-readable report for the CLI.
pub fn render(summary: &AnalyticsSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Folio Analytics (last {} days)\n", summary.period_days));
    out.push_str("================================\n\n");
    out.push_str(&format!("  Conversations:   {}\n", summary.total_conversations));
    out.push_str(&format!("  Unique visitors: {}\n", summary.unique_visitors));
    out.push_str(&format!("  New contacts:    {}\n", summary.new_contacts));

    if !summary.daily_messages.is_empty() {
        out.push_str("\n  Messages per day:\n");
        for day in &summary.daily_messages {
            out.push_str(&format!("  {:<12} {:>6}\n", day.day, day.messages));
        }
    }

    out.push_str("\n  Interest levels:\n");
    for level in &summary.interest_levels {
        out.push_str(&format!("  {:<12} {:>6}\n", level.level.as_str(), level.count));
    }

    if !summary.common_unknown_questions.is_empty() {
        out.push_str("\n  Common unanswered questions:\n");
        out.push_str(&format!("  {:>5}   {:<16} {}\n", "TIMES", "LAST ASKED", "QUESTION"));
        out.push_str(&format!("  {}\n", "-".repeat(60)));
        for q in &summary.common_unknown_questions {
            out.push_str(&format!(
                "  {:>5}   {:<16} {}\n",
                q.frequency,
                format_ts_relative(q.last_asked),
                q.question
            ));
        }
    }

    if !summary.events_by_type.is_empty() {
        out.push_str("\n  Events:\n");
        for event in &summary.events_by_type {
            out.push_str(&format!("  {:<20} {:>6}\n", event.event_type, event.count));
        }
    }

    out
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let delta = now_ts() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
