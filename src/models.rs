//! Core data models used throughout folio.
//!
//! Timestamps are Unix seconds (UTC), matching what is stored in SQLite.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Speaker of a message. `System` only ever appears on the wire; stored
/// turns are `User`, `Assistant`, or `Tool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(Error::Validation(format!("unknown role: {}", other))),
        }
    }
}

/// One stored message of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

/// A visitor's continuous interaction window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorSession {
    pub session_id: String,
    pub started_at: i64,
    pub last_seen_at: i64,
    /// Number of turns (all roles) recorded for the session.
    pub message_count: i64,
}

/// How keen a visitor is on following up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl InterestLevel {
    pub const ALL: [InterestLevel; 3] = [InterestLevel::Low, InterestLevel::Medium, InterestLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterestLevel::Low => "low",
            InterestLevel::Medium => "medium",
            InterestLevel::High => "high",
        }
    }
}

impl fmt::Display for InterestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterestLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(InterestLevel::Low),
            "medium" => Ok(InterestLevel::Medium),
            "high" => Ok(InterestLevel::High),
            other => Err(Error::Validation(format!("unknown interest level: {}", other))),
        }
    }
}

/// Contact details captured by the `record_contact` tool, before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub session_id: Option<String>,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub interest_level: InterestLevel,
}

/// A stored contact. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: i64,
    pub session_id: Option<String>,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub interest_level: InterestLevel,
    pub captured_at: i64,
}

/// A question the assistant could not answer from its context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownQuestion {
    pub id: i64,
    pub session_id: Option<String>,
    pub question_text: String,
    pub asked_at: i64,
}

/// A processed profile document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub filename: String,
    /// Lowercase extension without the dot (`"pdf"`, `"md"`, ...).
    pub file_type: String,
    #[serde(skip_serializing)]
    pub extracted_text: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub content_hash: String,
    pub size_bytes: u64,
    pub processed_at: i64,
}

impl DocumentRecord {
    pub fn content_length(&self) -> usize {
        self.extracted_text.chars().count()
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn interest_level_serializes_lowercase() {
        let json = serde_json::to_string(&InterestLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let level: InterestLevel = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(level, InterestLevel::Low);
        assert_eq!(InterestLevel::default(), InterestLevel::Medium);
    }

    #[test]
    fn document_text_is_not_serialized() {
        let record = DocumentRecord {
            filename: "resume.md".to_string(),
            file_type: "md".to_string(),
            extracted_text: "secret body".to_string(),
            summary: "A resume.".to_string(),
            keywords: vec!["rust".to_string()],
            content_hash: "abc".to_string(),
            size_bytes: 11,
            processed_at: 0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("extracted_text").is_none());
        assert_eq!(record.content_length(), 11);
    }
}
