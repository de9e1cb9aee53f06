//! Configuration: a TOML file for behaviour, the environment for secrets.
//!
//! ```toml
//! [db]
//! path = "./data/folio.sqlite"
//!
//! [persona]
//! name = "Ada Example"
//! title = "AI Engineer"
//!
//! [documents]
//! dir = "./data/documents"
//! ```
//!
//! Every section except `[db]` is optional. Secrets never live in the file:
//! `OPENAI_API_KEY` is required by commands that talk to the model, and
//! `PUSHOVER_TOKEN` / `PUSHOVER_USER` switch on contact notifications.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

/// Who the assistant speaks for.
#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_title")]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            title: default_persona_title(),
            summary: String::new(),
            highlights: Vec::new(),
        }
    }
}

fn default_persona_name() -> String {
    "the site owner".to_string()
}
fn default_persona_title() -> String {
    "Software Engineer".to_string()
}

/// How prior turns are fed back to the model once a session grows long.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicyKind {
    /// Keep the newest `max_turns` user/assistant turns.
    #[default]
    DropOldest,
    /// Replay the whole session.
    Unbounded,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default)]
    pub history_policy: HistoryPolicyKind,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_policy: HistoryPolicyKind::default(),
            max_message_chars: default_max_message_chars(),
            fallback_message: default_fallback_message(),
            error_message: default_error_message(),
        }
    }
}

fn default_max_turns() -> usize {
    20
}
fn default_max_message_chars() -> usize {
    4000
}
fn default_fallback_message() -> String {
    "Sorry, I'm having trouble reaching my language model right now. Please try again in a moment."
        .to_string()
}
fn default_error_message() -> String {
    "Sorry, something went wrong on my side. Please try again.".to_string()
}

impl ConversationConfig {
    pub fn history_policy(&self) -> HistoryPolicy {
        match self.history_policy {
            HistoryPolicyKind::DropOldest => HistoryPolicy::DropOldest {
                max_turns: self.max_turns,
            },
            HistoryPolicyKind::Unbounded => HistoryPolicy::Unbounded,
        }
    }
}

/// Resolved truncation policy handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    DropOldest { max_turns: usize },
    Unbounded,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_context_docs")]
    pub context_docs: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default)]
    pub ai_insights: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            search_limit: default_search_limit(),
            snippet_chars: default_snippet_chars(),
            context_docs: default_context_docs(),
            max_context_chars: default_max_context_chars(),
            ai_insights: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data/documents")
}
fn default_include_globs() -> Vec<String> {
    ["pdf", "docx", "txt", "md", "json"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}
fn default_search_limit() -> usize {
    3
}
fn default_snippet_chars() -> usize {
    240
}
fn default_context_docs() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_enabled")]
    pub enabled: bool,
    #[serde(default = "default_pushover_url")]
    pub pushover_url: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_notify_enabled(),
            pushover_url: default_pushover_url(),
        }
    }
}

fn default_notify_enabled() -> bool {
    true
}
fn default_pushover_url() -> String {
    "https://api.pushover.net/1/messages.json".to_string()
}

impl Config {
    /// A configuration with every default and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            model: ModelConfig::default(),
            persona: PersonaConfig::default(),
            conversation: ConversationConfig::default(),
            documents: DocumentsConfig::default(),
            server: ServerConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }
    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }
    if config.conversation.history_policy == HistoryPolicyKind::DropOldest
        && config.conversation.max_turns == 0
    {
        anyhow::bail!("conversation.max_turns must be > 0 with the drop_oldest policy");
    }
    if config.conversation.max_message_chars == 0 {
        anyhow::bail!("conversation.max_message_chars must be > 0");
    }
    if config.documents.search_limit == 0 {
        anyhow::bail!("documents.search_limit must be >= 1");
    }
    Ok(())
}

// ============ Secrets ============

/// Pushover application token and recipient key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushoverCredentials {
    pub token: String,
    pub user: String,
}

/// Secrets read from the process environment.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub openai_api_key: String,
    pub pushover: Option<PushoverCredentials>,
}

impl Secrets {
    /// Read secrets from the environment (after loading `.env`, if present).
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read secrets through `lookup`; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = present("OPENAI_API_KEY").ok_or_else(|| {
            Error::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let pushover = match (present("PUSHOVER_TOKEN"), present("PUSHOVER_USER")) {
            (Some(token), Some(user)) => Some(PushoverCredentials { token, user }),
            _ => None,
        };

        Ok(Self {
            openai_api_key,
            pushover,
        })
    }
}
