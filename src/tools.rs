//! The three functions the model may call.
//!
//! | Tool | Writes | Effect |
//! |------|--------|--------|
//! | `record_contact` | `contacts`, `analytics_events` | stores the visitor's details, notifies the owner |
//! | `record_unknown_question` | `unknown_questions`, `analytics_events` | logs a question the assistant could not answer |
//! | `search_documents` | nothing | keyword search over the profile documents |
//!
//! A model request is turned into a [`ToolCall`] by [`ToolCall::parse`]:
//! the name is looked up, the raw JSON arguments are checked against the
//! tool's JSON Schema with [`validate_params`], then deserialised into the
//! typed variant. Anything that fails here never executes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

use crate::documents::DocumentStore;
use crate::error::Result;
use crate::llm::ToolSchema;
use crate::models::{InterestLevel, NewContact};
use crate::notify::Notifier;
use crate::search;
use crate::store::Store;

pub const RECORD_CONTACT: &str = "record_contact";
pub const RECORD_UNKNOWN_QUESTION: &str = "record_unknown_question";
pub const SEARCH_DOCUMENTS: &str = "search_documents";

/// OpenAI function schemas for every tool, in a stable order.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: RECORD_CONTACT,
            description: "Record contact details of a visitor who wants to get in touch. \
                          Use when the visitor shares their name and email address.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Visitor's full name" },
                    "email": { "type": "string", "description": "Visitor's email address" },
                    "company": { "type": "string", "description": "Company or organisation" },
                    "position": { "type": "string", "description": "Job title or role" },
                    "notes": { "type": "string", "description": "Context about why they want to connect" },
                    "interest_level": {
                        "type": "string",
                        "enum": InterestLevel::ALL.iter().map(|l| l.as_str()).collect::<Vec<_>>(),
                        "description": "How interested the visitor seems"
                    }
                },
                "required": ["name", "email"]
            }),
        },
        ToolSchema {
            name: RECORD_UNKNOWN_QUESTION,
            description: "Record a question you could not answer from the available \
                          information, so it can be followed up.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "question_text": { "type": "string", "description": "The question, as asked" }
                },
                "required": ["question_text"]
            }),
        },
        ToolSchema {
            name: SEARCH_DOCUMENTS,
            description: "Search the profile documents (resume, projects, notes) for \
                          information relevant to the visitor's question.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Words or phrase to look for" }
                },
                "required": ["query"]
            }),
        },
    ]
}

fn schema_for(name: &str) -> Option<ToolSchema> {
    tool_schemas().into_iter().find(|s| s.name == name)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordContactArgs {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub interest_level: InterestLevel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordUnknownQuestionArgs {
    pub question_text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchDocumentsArgs {
    pub query: String,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    RecordContact(RecordContactArgs),
    RecordUnknownQuestion(RecordUnknownQuestionArgs),
    SearchDocuments(SearchDocumentsArgs),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Dependencies a tool may touch while executing.
pub struct ToolContext<'a> {
    pub store: &'a Store,
    pub documents: &'a DocumentStore,
    pub notifier: &'a Notifier,
    pub session_id: Option<&'a str>,
    pub search_limit: usize,
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Result fed back to the model as the tool message content.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub payload: Value,
}

impl ToolOutcome {
    pub fn ok(payload: Value) -> Self {
        Self {
            status: ToolStatus::Ok,
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: json!({ "message": message.into() }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// `{"status": "ok"|"error", ...payload}` as a JSON string.
    pub fn to_content(&self) -> String {
        let mut body = serde_json::Map::new();
        body.insert("status".to_string(), json!(self.status));
        match &self.payload {
            Value::Object(fields) => body.extend(fields.clone()),
            other => {
                body.insert("result".to_string(), other.clone());
            }
        }
        Value::Object(body).to_string()
    }
}

impl ToolCall {
    pub fn parse(name: &str, raw_arguments: &str) -> std::result::Result<Self, ToolCallError> {
        let schema = schema_for(name).ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;
        let invalid = |message: String| ToolCallError::InvalidArguments {
            tool: name.to_string(),
            message,
        };

        let raw = if raw_arguments.trim().is_empty() {
            "{}"
        } else {
            raw_arguments
        };
        let args: Value = serde_json::from_str(raw)
            .map_err(|e| invalid(format!("arguments are not valid JSON: {}", e)))?;
        if !args.is_object() {
            return Err(invalid("arguments must be a JSON object".to_string()));
        }

        let args = validate_params(&schema.parameters, &args).map_err(invalid)?;
        serde_json::from_value(json!({ "name": name, "arguments": args }))
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::RecordContact(_) => RECORD_CONTACT,
            ToolCall::RecordUnknownQuestion(_) => RECORD_UNKNOWN_QUESTION,
            ToolCall::SearchDocuments(_) => SEARCH_DOCUMENTS,
        }
    }

    /// Run the tool. Input problems become an error outcome for the model;
    /// only storage failures are returned as `Err`.
    pub async fn execute(&self, ctx: &ToolContext<'_>) -> Result<ToolOutcome> {
        match self {
            ToolCall::RecordContact(args) => record_contact(args, ctx).await,
            ToolCall::RecordUnknownQuestion(args) => record_unknown_question(args, ctx).await,
            ToolCall::SearchDocuments(args) => Ok(search_documents(args, ctx)),
        }
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("Invalid email regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn record_contact(args: &RecordContactArgs, ctx: &ToolContext<'_>) -> Result<ToolOutcome> {
    let name = args.name.trim();
    let email = args.email.trim();
    if name.is_empty() {
        return Ok(ToolOutcome::error("name must not be empty"));
    }
    if !is_valid_email(email) {
        return Ok(ToolOutcome::error(format!(
            "invalid email address: {:?}; ask the visitor to double-check it",
            email
        )));
    }

    let contact = ctx
        .store
        .insert_contact(&NewContact {
            session_id: ctx.session_id.map(str::to_string),
            name: name.to_string(),
            email: email.to_string(),
            company: non_blank(&args.company),
            position: non_blank(&args.position),
            notes: non_blank(&args.notes),
            interest_level: args.interest_level,
        })
        .await?;

    ctx.store
        .log_event(
            "contact_recorded",
            json!({ "contact_id": contact.id, "interest_level": contact.interest_level }),
            ctx.session_id,
        )
        .await?;

    tracing::info!(contact_id = contact.id, interest = %contact.interest_level, "contact recorded");
    ctx.notifier.notify_contact(&contact);

    Ok(ToolOutcome::ok(json!({
        "recorded": true,
        "contact_id": contact.id,
        "message": format!("Contact details for {} saved.", contact.name),
    })))
}

async fn record_unknown_question(
    args: &RecordUnknownQuestionArgs,
    ctx: &ToolContext<'_>,
) -> Result<ToolOutcome> {
    let question = args.question_text.trim();
    if question.is_empty() {
        return Ok(ToolOutcome::error("question_text must not be empty"));
    }

    let row = ctx
        .store
        .insert_unknown_question(ctx.session_id, question)
        .await?;
    ctx.store
        .log_event(
            "unknown_question",
            json!({ "question_id": row.id }),
            ctx.session_id,
        )
        .await?;

    tracing::info!(question_id = row.id, "unknown question recorded");
    Ok(ToolOutcome::ok(json!({
        "recorded": true,
        "question_id": row.id,
    })))
}

fn search_documents(args: &SearchDocumentsArgs, ctx: &ToolContext<'_>) -> ToolOutcome {
    let hits = search::search_documents(
        ctx.documents.records(),
        &args.query,
        ctx.search_limit,
        ctx.snippet_chars,
    );
    tracing::debug!(query = %args.query, hits = hits.len(), "document search");
    ToolOutcome::ok(json!({ "query": args.query, "results": hits }))
}

// ============ Schema validation ============

/// Check `params` against a tool's JSON Schema (required fields, primitive
/// types, enums) and fill in declared defaults. Returns the validated
/// object or a human-readable reason.
pub fn validate_params(schema: &Value, params: &Value) -> std::result::Result<Value, String> {
    let params_obj = params.as_object().cloned().unwrap_or_default();

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        match params_obj.get(*field) {
            None | Some(Value::Null) => {
                return Err(format!("missing required parameter: {}", field))
            }
            _ => {}
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name) {
            // Optional fields sent as null are treated as absent
            Some(Value::Null) => {
                result.remove(prop_name);
            }
            Some(value) => {
                if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        return Err(format!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected,
                            json_type_name(value)
                        ));
                    }
                }

                if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !allowed.contains(value) {
                        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                        return Err(format!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        ));
                    }
                }
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
