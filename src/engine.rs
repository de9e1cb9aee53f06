//! The conversation engine: one visitor message in, one reply out.
//!
//! # Exchange lifecycle
//!
//! ```text
//! AwaitingUserInput ──► AwaitingModelReply ──text──────────────────────────► Done
//!                              │
//!                          tool call
//!                              ▼
//!                      AwaitingToolResult ──► AwaitingFinalReply ──text────► Done
//! ```
//!
//! At most one tool round happens per message. The final request is sent
//! without tools, so a second tool call (or an empty reply) ends in the
//! configured fallback message.
//!
//! Turns produced by an exchange (user, optional tool result, assistant)
//! are committed together once the reply is known. A model failure still
//! records the exchange, with the fallback as the assistant turn. A storage
//! failure records nothing and the visitor gets the generic error message.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ModelReply, RequestedToolCall, ToolSchema};
use crate::models::{ConversationTurn, Role};
use crate::notify::Notifier;
use crate::store::Store;
use crate::tools::{self, ToolCall, ToolCallError, ToolContext};

/// Reply to a message with no visible content.
pub const EMPTY_MESSAGE_REPLY: &str =
    "It looks like your message was empty. What would you like to know?";

const MAX_SESSION_ID_CHARS: usize = 128;

/// Everything the engine needs, passed in explicitly.
pub struct EngineParts {
    pub store: Store,
    pub documents: Arc<DocumentStore>,
    pub model: Arc<dyn ChatModel>,
    pub notifier: Notifier,
    pub config: Config,
}

pub struct ConversationEngine {
    store: Store,
    documents: Arc<DocumentStore>,
    model: Arc<dyn ChatModel>,
    notifier: Notifier,
    config: Config,
}

/// Where an exchange currently is.
#[derive(Debug)]
enum Stage {
    AwaitingUserInput,
    AwaitingModelReply {
        messages: Vec<ChatMessage>,
    },
    AwaitingToolResult {
        messages: Vec<ChatMessage>,
        call: RequestedToolCall,
    },
    AwaitingFinalReply {
        messages: Vec<ChatMessage>,
    },
    Done {
        reply: String,
    },
}

/// Turns and outcome accumulated while an exchange runs.
#[derive(Debug, Default)]
struct Exchange {
    tool_turn: Option<String>,
    tool_used: Option<String>,
    fallback: bool,
}

impl ConversationEngine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            store: parts.store,
            documents: parts.documents,
            model: parts.model,
            notifier: parts.notifier,
            config: parts.config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Wait for contact notifications still being delivered. Call before
    /// the runtime shuts down.
    pub async fn flush_notifications(&self, timeout: Duration) -> bool {
        self.notifier.flush(timeout).await
    }

    /// Stored transcript of a session, all roles, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        self.store.turns(session_id).await
    }

    /// Answer one visitor message. Never fails: model problems yield the
    /// fallback message and storage problems the generic error message.
    pub async fn handle_message(&self, session_id: &str, user_text: &str) -> String {
        if let Err(e) = validate_session_id(session_id) {
            tracing::warn!(error = %e, "rejected message");
            return self.config.conversation.error_message.clone();
        }

        if user_text.trim().is_empty() {
            return EMPTY_MESSAGE_REPLY.to_string();
        }
        // stored and sent as typed, only capped in length
        let text = truncate_chars(user_text, self.config.conversation.max_message_chars);

        let started = Instant::now();
        match self.run_exchange(session_id, &text).await {
            Ok(reply) => {
                tracing::info!(
                    session_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message handled"
                );
                reply
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "message handling failed");
                self.config.conversation.error_message.clone()
            }
        }
    }

    async fn run_exchange(&self, session_id: &str, text: &str) -> Result<String> {
        let mut exchange = Exchange::default();

        let reply = match self.drive(session_id, text, &mut exchange).await {
            Ok(reply) => reply,
            Err(Error::ExternalService(message)) => {
                tracing::error!(session_id, error = %message, "model request failed");
                self.store
                    .log_event("model_error", json!({ "error": message }), Some(session_id))
                    .await?;
                exchange.fallback = true;
                self.config.conversation.fallback_message.clone()
            }
            Err(other) => return Err(other),
        };

        let mut turns: Vec<(Role, &str)> = vec![(Role::User, text)];
        if let Some(tool_turn) = &exchange.tool_turn {
            turns.push((Role::Tool, tool_turn.as_str()));
        }
        turns.push((Role::Assistant, reply.as_str()));
        self.store.append_turns(session_id, &turns).await?;

        self.store
            .log_event(
                "message_exchange",
                json!({
                    "tool": exchange.tool_used,
                    "fallback": exchange.fallback,
                    "user_chars": text.chars().count(),
                    "reply_chars": reply.chars().count(),
                }),
                Some(session_id),
            )
            .await?;

        Ok(reply)
    }

    /// Run the stage machine to completion and return the reply text.
    async fn drive(&self, session_id: &str, text: &str, exchange: &mut Exchange) -> Result<String> {
        let mut stage = Stage::AwaitingUserInput;
        loop {
            stage = match stage {
                Stage::AwaitingUserInput => {
                    let history = self
                        .store
                        .history(session_id, self.config.conversation.history_policy())
                        .await?;

                    let mut messages = Vec::with_capacity(history.len() + 2);
                    messages.push(ChatMessage::system(self.system_prompt(text)));
                    messages.extend(
                        history
                            .into_iter()
                            .map(|turn| ChatMessage::new(turn.role, turn.content)),
                    );
                    messages.push(ChatMessage::user(text));
                    Stage::AwaitingModelReply { messages }
                }

                Stage::AwaitingModelReply { messages } => {
                    let request = self.request(messages.clone(), tools::tool_schemas());
                    match self.model.complete(&request).await? {
                        ModelReply::Text(reply) => Stage::Done {
                            reply: self.non_empty(reply, exchange),
                        },
                        ModelReply::ToolCall(call) => Stage::AwaitingToolResult { messages, call },
                    }
                }

                Stage::AwaitingToolResult { mut messages, call } => {
                    let result = self.run_tool(session_id, &call).await?;
                    messages.push(ChatMessage::assistant_tool_call(&call));
                    messages.push(ChatMessage::tool_result(call.id.as_str(), result.as_str()));
                    exchange.tool_used = Some(call.name);
                    exchange.tool_turn = Some(result);
                    Stage::AwaitingFinalReply { messages }
                }

                Stage::AwaitingFinalReply { messages } => {
                    let request = self.request(messages, Vec::new());
                    match self.model.complete(&request).await? {
                        ModelReply::Text(reply) => Stage::Done {
                            reply: self.non_empty(reply, exchange),
                        },
                        ModelReply::ToolCall(call) => {
                            tracing::warn!(
                                session_id,
                                tool = %call.name,
                                "model asked for a second tool round; using fallback"
                            );
                            exchange.fallback = true;
                            Stage::Done {
                                reply: self.config.conversation.fallback_message.clone(),
                            }
                        }
                    }
                }

                Stage::Done { reply } => return Ok(reply),
            };
        }
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: Vec<ToolSchema>) -> ChatRequest {
        ChatRequest {
            model: self.config.model.name.clone(),
            messages,
            tools,
            temperature: self.config.model.temperature,
        }
    }

    fn non_empty(&self, reply: String, exchange: &mut Exchange) -> String {
        if reply.trim().is_empty() {
            tracing::warn!("model returned an empty reply; using fallback");
            exchange.fallback = true;
            self.config.conversation.fallback_message.clone()
        } else {
            reply
        }
    }

    /// Validate and execute a requested tool, returning the tool message
    /// content. Rejected calls produce an error payload instead of running.
    async fn run_tool(&self, session_id: &str, call: &RequestedToolCall) -> Result<String> {
        let tool = match ToolCall::parse(&call.name, &call.arguments) {
            Ok(tool) => tool,
            Err(ToolCallError::UnknownTool(name)) => {
                tracing::warn!(session_id, tool = %name, "model requested an unknown tool");
                self.store
                    .insert_unknown_question(
                        Some(session_id),
                        &format!("[unknown tool] {} {}", name, call.arguments),
                    )
                    .await?;
                self.store
                    .log_event("tool_rejected", json!({ "tool": name }), Some(session_id))
                    .await?;
                return Ok(tools::ToolOutcome::error(format!("unknown tool: {}", name)).to_content());
            }
            Err(e @ ToolCallError::InvalidArguments { .. }) => {
                tracing::warn!(session_id, tool = %call.name, error = %e, "invalid tool arguments");
                return Ok(tools::ToolOutcome::error(e.to_string()).to_content());
            }
        };

        let ctx = ToolContext {
            store: &self.store,
            documents: &self.documents,
            notifier: &self.notifier,
            session_id: Some(session_id),
            search_limit: self.config.documents.search_limit,
            snippet_chars: self.config.documents.snippet_chars,
        };
        let outcome = tool.execute(&ctx).await?;
        tracing::info!(session_id, tool = tool.name(), ok = outcome.is_ok(), "tool executed");
        Ok(outcome.to_content())
    }

    /// Persona, instructions, and the document context for `user_text`.
    pub fn system_prompt(&self, user_text: &str) -> String {
        let persona = &self.config.persona;
        let mut prompt = format!(
            "You are acting as {name}, {title}. You represent {name} on their portfolio \
             website and help visitors learn about their background, skills, and experience. \
             Be professional, engaging, and helpful.\n",
            name = persona.name,
            title = persona.title,
        );

        if !persona.summary.trim().is_empty() {
            prompt.push_str(&format!("\n## Background\n{}\n", persona.summary.trim()));
        }
        if !persona.highlights.is_empty() {
            prompt.push_str("\n## Highlights\n");
            for highlight in &persona.highlights {
                prompt.push_str(&format!("- {}\n", highlight));
            }
        }

        let docs = self.documents.context_excerpt(
            user_text,
            self.config.documents.context_docs,
            self.config.documents.max_context_chars,
        );
        if !docs.is_empty() {
            prompt.push_str(&format!("\n## Documents\n{}\n", docs));
        }

        prompt.push_str(&format!(
            "\n## Instructions\n\
             1. Stay in character as {name} and answer in the first person.\n\
             2. For specific experience or skills, use `{search}` to check the documents.\n\
             3. When a visitor wants to collaborate, hire, or stay in touch, ask for their \
             name and email and save them with `{contact}`.\n\
             4. If the answer is not in the available information, say so and call `{unknown}`.\n\
             5. Never invent facts that are not in the documents or the background above.\n",
            name = persona.name,
            search = tools::SEARCH_DOCUMENTS,
            contact = tools::RECORD_CONTACT,
            unknown = tools::RECORD_UNKNOWN_QUESTION,
        ));
        prompt
    }
}

/// Session ids are opaque, non-blank, at most 128 chars, no control chars.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(Error::Validation("session id must not be empty".to_string()));
    }
    if session_id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(Error::Validation(format!(
            "session id longer than {} chars",
            MAX_SESSION_ID_CHARS
        )));
    }
    if session_id.chars().any(char::is_control) {
        return Err(Error::Validation(
            "session id contains control characters".to_string(),
        ));
    }
    Ok(())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
