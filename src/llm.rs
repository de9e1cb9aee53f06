//! Chat-completion model abstraction and the OpenAI implementation.
//!
//! The conversation engine and the document insights pass only talk to
//! [`ChatModel`]; tests substitute a scripted implementation.
//!
//! # Wire format
//!
//! Requests follow the OpenAI `POST /chat/completions` body: `model`,
//! `messages`, `temperature`, and (only when non-empty) `tools`, each tool
//! wrapped as `{"type": "function", "function": {...}}`. Assistant tool
//! calls carry a JSON-encoded `arguments` string, and tool results are
//! sent back as `role: "tool"` messages referencing the call's id.
//!
//! # Failure handling
//!
//! No retries. Transport failures and timeouts become
//! [`ModelError::Transport`], non-2xx responses [`ModelError::Status`], and
//! bodies without a usable first choice [`ModelError::MalformedResponse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelConfig;
use crate::models::Role;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Transport(err.to_string())
    }
}

/// A function tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl Serialize for ToolSchema {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
        .serialize(serializer)
    }
}

/// Tool call as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    /// JSON-encoded arguments object.
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// The assistant message that requested `call`.
    pub fn assistant_tool_call(call: &RequestedToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: call.id.clone(),
                kind: function_kind(),
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            }]),
            tool_call_id: None,
        }
    }

    /// A tool result answering the call with id `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
}

/// A tool invocation requested by the model. `arguments` is the raw JSON
/// string exactly as received; validation happens in [`crate::tools`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCall(RequestedToolCall),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier placed in requests (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ModelReply, ModelError>;
}

// ============ OpenAI ============

pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.name.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ModelReply, ModelError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            model = %request.model,
            tools = request.tools.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat completion received"
        );

        parse_completion(body)
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Reduce a chat-completions response body to the first choice's reply.
pub fn parse_completion(body: serde_json::Value) -> Result<ModelReply, ModelError> {
    let body: CompletionBody =
        serde_json::from_value(body).map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::MalformedResponse("no choices".to_string()))?;

    let mut calls = choice.message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        if calls.len() > 1 {
            tracing::warn!(
                requested = calls.len(),
                "model requested several tool calls; only the first is executed"
            );
        }
        let call = calls.swap_remove(0);
        return Ok(ModelReply::ToolCall(RequestedToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }));
    }

    Ok(ModelReply::Text(choice.message.content.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_reply_is_parsed() {
        let reply = parse_completion(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" } }]
        }))
        .unwrap();
        assert_eq!(reply, ModelReply::Text("Hello!".to_string()));
    }

    #[test]
    fn first_tool_call_wins() {
        let reply = parse_completion(json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    { "id": "call_1", "type": "function",
                      "function": { "name": "search_documents", "arguments": "{\"query\":\"rust\"}" } },
                    { "id": "call_2", "type": "function",
                      "function": { "name": "record_unknown_question", "arguments": "{}" } }
                ]
            } }]
        }))
        .unwrap();

        match reply {
            ModelReply::ToolCall(call) => {
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "search_documents");
                assert_eq!(call.arguments, "{\"query\":\"rust\"}");
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn missing_choices_is_malformed() {
        let err = parse_completion(json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse(_)));
        let err = parse_completion(json!({ "error": "nope", "choices": "x" })).unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse(_)));
    }

    #[test]
    fn request_omits_empty_tools() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::system("be nice"), ChatMessage::user("hi")],
            tools: Vec::new(),
            temperature: 0.7,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0], json!({ "role": "system", "content": "be nice" }));
    }

    #[test]
    fn tool_messages_serialize_for_the_wire() {
        let call = RequestedToolCall {
            id: "call_9".to_string(),
            name: "search_documents".to_string(),
            arguments: "{\"query\":\"sql\"}".to_string(),
        };
        let assistant = serde_json::to_value(ChatMessage::assistant_tool_call(&call)).unwrap();
        assert_eq!(
            assistant,
            json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": { "name": "search_documents", "arguments": "{\"query\":\"sql\"}" }
                }]
            })
        );

        let result = serde_json::to_value(ChatMessage::tool_result("call_9", "{}")).unwrap();
        assert_eq!(
            result,
            json!({ "role": "tool", "content": "{}", "tool_call_id": "call_9" })
        );
    }

    #[test]
    fn tool_schema_is_wrapped_as_function() {
        let schema = ToolSchema {
            name: "search_documents",
            description: "Search",
            parameters: json!({ "type": "object" }),
        };
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "search_documents");
    }
}
