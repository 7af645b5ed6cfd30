//! Error types for the Rollcall core crate.

use thiserror::Error;

/// Top-level error type for all Rollcall core operations.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("roster error: {0}")]
    Roster(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("mail error: {0}")]
    Mail(String),
}

impl From<sqlx::Error> for RollcallError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RollcallError::Conflict(db.message().to_string())
            }
            _ => RollcallError::Database(err),
        }
    }
}

/// A convenience Result alias that defaults to [`RollcallError`].
pub type Result<T> = std::result::Result<T, RollcallError>;
