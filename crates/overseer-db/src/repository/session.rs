//! SurrealDB implementation of [`SessionRepository`].

use chrono::{DateTime, Utc};
use overseer_core::error::StoreResult;
use overseer_core::models::session::{CreateSession, Session};
use overseer_core::repository::SessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SessionRow {
    operator_id: String,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    operator_id: String,
    token_hash: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

/// Projection returned by `DELETE ... RETURN BEFORE`; only used to
/// count removed rows.
#[derive(Debug, SurrealValue)]
struct DeletedRow {
    #[allow(dead_code)]
    operator_id: String,
}

fn row_to_session(row: SessionRow, id: Uuid) -> Result<Session, DbError> {
    let operator_id = Uuid::parse_str(&row.operator_id)
        .map_err(|e| DbError::InvalidRow(format!("invalid operator UUID: {e}")))?;
    Ok(Session {
        id,
        operator_id,
        token_hash: row.token_hash,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        expires_at: row.expires_at,
        created_at: row.created_at,
    })
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::InvalidRow(format!("invalid session UUID: {e}")))?;
        row_to_session(
            SessionRow {
                operator_id: self.operator_id,
                token_hash: self.token_hash,
                ip_address: self.ip_address,
                user_agent: self.user_agent,
                expires_at: self.expires_at,
                created_at: self.created_at,
            },
            id,
        )
    }
}

/// SurrealDB implementation of the Session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn delete_where(
        &self,
        condition: &str,
        binds: Vec<(&'static str, String)>,
    ) -> Result<u64, DbError> {
        let query = format!("DELETE master_session WHERE {condition} RETURN BEFORE");
        let mut builder = self.db.query(query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let result = builder.await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<DeletedRow> = result.take(0)?;
        Ok(rows.len() as u64)
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> StoreResult<Session> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('master_session', $id) SET \
                 operator_id = $operator_id, \
                 token_hash = $token_hash, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 created_at = $created_at, \
                 expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("operator_id", input.operator_id.to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("created_at", input.created_at))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        row_to_session(row, id).map_err(Into::into)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> StoreResult<Session> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM master_session \
                 WHERE token_hash = $token_hash",
            )
            .bind(("token_hash", token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        // Never echo the hash back into error messages.
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: "token".into(),
        })?;

        row.try_into_session().map_err(Into::into)
    }

    async fn delete_for_operator(&self, token_hash: &str, operator_id: Uuid) -> StoreResult<bool> {
        let removed = self
            .delete_where(
                "token_hash = $token_hash AND operator_id = $operator_id",
                vec![
                    ("token_hash", token_hash.to_string()),
                    ("operator_id", operator_id.to_string()),
                ],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn delete_operator_sessions(&self, operator_id: Uuid) -> StoreResult<u64> {
        let removed = self
            .delete_where(
                "operator_id = $operator_id",
                vec![("operator_id", operator_id.to_string())],
            )
            .await?;
        Ok(removed)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut result = self
            .db
            .query("DELETE master_session WHERE expires_at <= $now RETURN BEFORE")
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DeletedRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }
}
