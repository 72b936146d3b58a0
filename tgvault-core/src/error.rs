//! Error types for tgvault-core

use thiserror::Error;

/// Main error type for the tgvault-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying session is missing or expired. Surfaced to the
    /// caller, never retried silently.
    #[error("not authorized: no valid session; sign in first")]
    NotAuthorized,

    /// The chat id could not be mapped to a live remote handle
    #[error("cannot resolve chat {chat_id}: {message}")]
    EntityResolution { chat_id: i64, message: String },

    /// Transient transport failure during pagination
    #[error("transport error: {0}")]
    Transport(String),

    /// Chat not present in the local catalogue
    #[error("chat not found in catalogue: {0}")]
    ChatNotFound(i64),

    /// Another run for the same (chat, artifact) is already in flight
    #[error("{artifact} run already in progress for chat {chat_id}")]
    RunInProgress { chat_id: i64, artifact: String },
}

/// Result type alias for tgvault-core
pub type Result<T> = std::result::Result<T, Error>;
