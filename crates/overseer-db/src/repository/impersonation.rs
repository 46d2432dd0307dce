//! SurrealDB implementation of [`ImpersonationRepository`].
//!
//! Rows are never deleted. The only mutation is the conditional
//! `ended_at` stamp, which is a single `UPDATE ... WHERE ended_at =
//! NONE` so concurrent stops cannot overwrite an earlier end time.

use chrono::{DateTime, Utc};
use overseer_core::error::StoreResult;
use overseer_core::models::impersonation::{
    CreateImpersonation, Impersonation, ImpersonationFilter,
};
use overseer_core::repository::{ImpersonationRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ImpersonationRow {
    operator_id: String,
    tenant_id: String,
    target_user_id: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct ImpersonationRowWithId {
    record_id: String,
    operator_id: String,
    tenant_id: String,
    target_user_id: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::InvalidRow(format!("invalid {what} UUID: {e}")))
}

impl ImpersonationRow {
    fn into_impersonation(self, id: Uuid) -> Result<Impersonation, DbError> {
        Ok(Impersonation {
            id,
            operator_id: parse_uuid(&self.operator_id, "operator")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            target_user_id: self
                .target_user_id
                .as_deref()
                .map(|raw| parse_uuid(raw, "target user"))
                .transpose()?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        })
    }
}

impl ImpersonationRowWithId {
    fn try_into_impersonation(self) -> Result<Impersonation, DbError> {
        let id = parse_uuid(&self.record_id, "impersonation")?;
        ImpersonationRow {
            operator_id: self.operator_id,
            tenant_id: self.tenant_id,
            target_user_id: self.target_user_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
        .into_impersonation(id)
    }
}

/// SurrealDB implementation of the Impersonation repository.
#[derive(Clone)]
pub struct SurrealImpersonationRepository<C: Connection> {
    db: Surreal<C>,
}

const END_ATTEMPTS: u32 = 3;

fn is_write_conflict(err: &DbError) -> bool {
    let message = err.to_string();
    message.contains("conflict") || message.contains("can be retried")
}

impl<C: Connection> SurrealImpersonationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn end_once(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Impersonation>, DbError> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('impersonation', $id) \
                 SET ended_at = $ended_at WHERE ended_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("ended_at", ended_at))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<ImpersonationRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(|row| row.into_impersonation(id))
            .transpose()
    }
}

impl<C: Connection> ImpersonationRepository for SurrealImpersonationRepository<C> {
    async fn create(&self, input: CreateImpersonation) -> StoreResult<Impersonation> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('impersonation', $id) SET \
                 operator_id = $operator_id, \
                 tenant_id = $tenant_id, \
                 target_user_id = $target_user_id, \
                 started_at = $started_at, \
                 ended_at = NONE, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent",
            )
            .bind(("id", id_str.clone()))
            .bind(("operator_id", input.operator_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind((
                "target_user_id",
                input.target_user_id.map(|u| u.to_string()),
            ))
            .bind(("started_at", input.started_at))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<ImpersonationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "impersonation".into(),
            id: id_str,
        })?;

        Ok(row.into_impersonation(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Impersonation> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('impersonation', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ImpersonationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "impersonation".into(),
            id: id_str,
        })?;

        Ok(row.into_impersonation(id)?)
    }

    async fn end(&self, id: Uuid, ended_at: DateTime<Utc>) -> StoreResult<Option<Impersonation>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.end_once(id, ended_at).await {
                // A concurrent stop committed first; the retry sees its
                // `ended_at` and matches nothing.
                Err(e) if attempt < END_ATTEMPTS && is_write_conflict(&e) => continue,
                other => return Ok(other?),
            }
        }
    }

    async fn list(
        &self,
        filter: ImpersonationFilter,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<Impersonation>> {
        let mut conditions = Vec::new();
        if filter.operator_id.is_some() {
            conditions.push("operator_id = $operator_id");
        }
        if filter.tenant_id.is_some() {
            conditions.push("tenant_id = $tenant_id");
        }
        if filter.active_only {
            conditions.push("ended_at = NONE");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query =
            format!("SELECT count() AS total FROM impersonation {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM impersonation {where_clause} \
             ORDER BY started_at DESC LIMIT $limit START $offset"
        );

        let mut builder = self
            .db
            .query(count_query)
            .query(list_query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(operator_id) = filter.operator_id {
            builder = builder.bind(("operator_id", operator_id.to_string()));
        }
        if let Some(tenant_id) = filter.tenant_id {
            builder = builder.bind(("tenant_id", tenant_id.to_string()));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<ImpersonationRowWithId> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_impersonation())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
