//! # Folio
//!
//! A portfolio chatbot: an OpenAI chat model with function-calling tools
//! that answers visitors' questions about one person from their profile
//! documents, captures contact details, and logs questions it could not
//! answer. Conversations, contacts, and analytics live in a local SQLite
//! file.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────────┐   ┌─────────────┐
//! │ Documents │──▶│ ConversationEngine │──▶│  ChatModel  │
//! │ (in mem)  │   │  two-round loop    │◀──│  (OpenAI)   │
//! └───────────┘   └─────────┬──────────┘   └─────────────┘
//!                           │ tool calls
//!                           ▼
//!                  ┌──────────────┐    ┌──────────┐
//!                  │    Tools     │───▶│  SQLite  │
//!                  └──────────────┘    └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │ (folio)  │        │  (axum)  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio init                          # create database
//! folio documents list                # check what the assistant knows
//! folio chat --message "What do you work on?"
//! folio serve                         # start HTTP API
//! folio analytics --days 30
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Persistence accessors |
//! | [`analytics`] | Aggregates over stored activity |
//! | [`extract`] | Text extraction from PDF/DOCX/TXT/MD/JSON |
//! | [`documents`] | Profile document store |
//! | [`search`] | Keyword search over documents |
//! | [`llm`] | Chat model abstraction and OpenAI client |
//! | [`tools`] | Tool schemas, validation, and execution |
//! | [`notify`] | Pushover contact notifications |
//! | [`engine`] | Conversation engine |
//! | [`server`] | HTTP API |

pub mod analytics;
pub mod config;
pub mod db;
pub mod documents;
pub mod engine;
pub mod error;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod search;
pub mod server;
pub mod store;
pub mod tools;
