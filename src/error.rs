//! Error taxonomy shared by the library.
//!
//! | Variant | Raised by | Recovery |
//! |---------|-----------|----------|
//! | [`Error::Configuration`] | missing `OPENAI_API_KEY`, bad config values | fatal at startup |
//! | [`Error::Validation`] | malformed tool arguments, bad session ids | tool returns an error string the model relays |
//! | [`Error::ExternalService`] | model API or webhook failures | fallback reply, webhook failures swallowed |
//! | [`Error::Persistence`] | SQLite failures | generic "something went wrong" reply |
//! | [`Error::Document`] | unreadable profile documents | document skipped |
//!
//! [`crate::engine::ConversationEngine::handle_message`] is the boundary:
//! nothing past it reaches the visitor as an error.

/// Library-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("document error: {0}")]
    Document(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::llm::ModelError> for Error {
    fn from(err: crate::llm::ModelError) -> Self {
        Error::ExternalService(err.to_string())
    }
}

impl From<crate::extract::ExtractError> for Error {
    fn from(err: crate::extract::ExtractError) -> Self {
        Error::Document(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}
