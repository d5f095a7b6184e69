//! Error type shared by the storage backends and the domain operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-bounds input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The relation or unique record is already present.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A referenced entity or relation does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("users cannot subscribe to themselves")]
    SelfReference,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// HTTP status the access layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::AlreadyExists(_) | Error::SelfReference => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// True for conditions caused by the request rather than the infrastructure.
    pub fn is_user_facing(&self) -> bool {
        self.status_code() < 500
    }
}
