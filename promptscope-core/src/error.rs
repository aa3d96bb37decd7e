//! Error types for promptscope-core

use thiserror::Error;

/// Main error type for the promptscope-core library
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

    /// Entity absent, or present but not visible to the actor.
    /// The two cases are deliberately indistinguishable.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Write attempted by an identity without ownership
    #[error("write forbidden")]
    Forbidden,

    /// Uniqueness violation (duplicate session key, tag name, username...)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Payload failed a field-level check
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::NotFound`]
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Shorthand for a [`Error::Validation`]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Translate SQLite constraint violations into [`Error::Conflict`].
    ///
    /// Used at insert/update sites where a UNIQUE constraint carries
    /// domain meaning (session_key, project+tag name, username).
    pub(crate) fn from_sqlite(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(f, Some(msg))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Conflict(msg.clone())
            }
            _ => Error::Database(err),
        }
    }
}

/// Result type alias for promptscope-core
pub type Result<T> = std::result::Result<T, Error>;
