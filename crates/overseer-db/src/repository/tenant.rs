//! Tenants as the control plane sees them: created by the customer side
//! (and by tests), read here, and only ever mutated through their status.

use chrono::{DateTime, Utc};
use overseer_core::error::StoreResult;
use overseer_core::models::tenant::{CreateTenant, Tenant, TenantStatus};
use overseer_core::repository::TenantRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TenantRow {
    name: String,
    slug: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    fn into_tenant(self, id: Uuid) -> Result<Tenant, DbError> {
        let status = self.status.parse().map_err(DbError::InvalidRow)?;
        Ok(Tenant {
            id,
            name: self.name,
            slug: self.slug,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run a statement addressing `tenant:$id` and decode the row it
    /// returns. An empty result means the record does not exist.
    async fn one(
        &self,
        sql: &'static str,
        id: Uuid,
        status: Option<TenantStatus>,
        input: Option<CreateTenant>,
    ) -> Result<Tenant, DbError> {
        let mut query = self.db.query(sql).bind(("id", id.to_string()));
        if let Some(status) = status {
            query = query.bind(("status", status.as_str().to_string()));
        }
        if let Some(input) = input {
            query = query
                .bind(("name", input.name))
                .bind(("slug", input.slug))
                .bind(("status", input.status.as_str().to_string()));
        }

        let mut response = query
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<TenantRow> = response.take(0)?;

        match rows.into_iter().next() {
            Some(row) => row.into_tenant(id),
            None => Err(DbError::NotFound {
                entity: "tenant".into(),
                id: id.to_string(),
            }),
        }
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> StoreResult<Tenant> {
        let tenant = self
            .one(
                "CREATE type::record('tenant', $id) \
                 SET name = $name, slug = $slug, status = $status",
                Uuid::new_v4(),
                None,
                Some(input),
            )
            .await?;
        Ok(tenant)
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Tenant> {
        let tenant = self
            .one("SELECT * FROM type::record('tenant', $id)", id, None, None)
            .await?;
        Ok(tenant)
    }

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> StoreResult<Tenant> {
        // UPDATE on a missing record id returns no rows in SurrealDB 3.
        let tenant = self
            .one(
                "UPDATE type::record('tenant', $id) \
                 SET status = $status, updated_at = time::now()",
                id,
                Some(status),
                None,
            )
            .await?;
        Ok(tenant)
    }
}
