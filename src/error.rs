use thiserror::Error;

/// Errors raised by the mapper and its datastores.
#[derive(Debug, Error)]
pub enum MapperError {
    /// Entity declaration or usage that can never succeed: bad column
    /// options, missing primary key, a row that does not fit the entity.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// CRUD call for a type that was never registered with the mapper.
    #[error("entity `{0}` is not registered")]
    NotRegistered(&'static str),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by a non-SQLite datastore implementation.
    #[error("datastore error: {0}")]
    Datastore(String),
}

impl MapperError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidEntity(message.into())
    }

    /// True for configuration errors, false for engine and encoding failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidEntity(_) | Self::NotRegistered(_))
    }
}

pub type Result<T, E = MapperError> = std::result::Result<T, E>;
