//! Failures reported by the persistence layer, independent of the backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No `entity` row carries `id`.
    #[error("{entity} {id} does not exist")]
    NotFound { entity: String, id: String },

    /// A unique index rejected the write.
    #[error("duplicate {entity}")]
    AlreadyExists { entity: String },

    #[error("invalid input: {message}")]
    Validation { message: String },

    #[error("store failure: {0}")]
    Database(String),

    #[error("store did not answer within {0} ms")]
    Timeout(u64),

    #[error("crypto failure: {0}")]
    Crypto(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
