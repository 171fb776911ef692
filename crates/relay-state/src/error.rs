use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("record not found")]
    NotFound,
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
