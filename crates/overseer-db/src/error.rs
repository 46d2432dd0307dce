//! SurrealDB failures and their mapping onto [`StoreError`].

use overseer_core::error::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Surreal(#[from] surrealdb::Error),

    #[error("migration {0}")]
    Migration(String),

    /// A statement inside a multi-statement response failed.
    #[error("statement rejected: {0}")]
    Query(String),

    /// A stored value no longer parses into its domain type.
    #[error("corrupt row: {0}")]
    InvalidRow(String),

    #[error("argon2: {0}")]
    Hash(String),

    #[error("no {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => Self::NotFound { entity, id },
            DbError::Hash(msg) => Self::Crypto(msg),
            // Unique index violations surface as "... already contains ...".
            DbError::Query(msg) if msg.contains("already contains") => Self::AlreadyExists {
                entity: "record".into(),
            },
            other => Self::Database(other.to_string()),
        }
    }
}
