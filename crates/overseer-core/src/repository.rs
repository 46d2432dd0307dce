//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Every mutation is expressed as
//! a single conditional statement against the store so that concurrent
//! request handlers never need to hold a lock across a call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    audit::{AuditAction, AuditRecord, CreateAuditRecord},
    impersonation::{CreateImpersonation, Impersonation, ImpersonationFilter},
    operator::{CreateOperator, Operator, UpdateOperator},
    session::{CreateSession, Session},
    tenant::{CreateTenant, Tenant, TenantStatus},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub const MAX_LIMIT: u64 = 500;

    /// Clamp the limit into `1..=MAX_LIMIT`.
    pub fn clamped(self) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Operators & sessions
// ---------------------------------------------------------------------------

pub trait OperatorRepository: Send + Sync {
    fn create(&self, input: CreateOperator) -> impl Future<Output = StoreResult<Operator>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = StoreResult<Operator>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = StoreResult<Operator>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOperator,
    ) -> impl Future<Output = StoreResult<Operator>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = StoreResult<PaginatedResult<Operator>>> + Send;
    fn count(&self) -> impl Future<Output = StoreResult<u64>> + Send;
}

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = StoreResult<Session>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = StoreResult<Session>> + Send;
    /// Delete the session with this token hash if it belongs to
    /// `operator_id`. Returns whether a row was removed.
    fn delete_for_operator(
        &self,
        token_hash: &str,
        operator_id: Uuid,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
    /// Delete every session of an operator (e.g., on deactivation).
    fn delete_operator_sessions(
        &self,
        operator_id: Uuid,
    ) -> impl Future<Output = StoreResult<u64>> + Send;
    /// Remove all sessions whose expiry is at or before `now`.
    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = StoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Impersonation (retained forever)
// ---------------------------------------------------------------------------

pub trait ImpersonationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateImpersonation,
    ) -> impl Future<Output = StoreResult<Impersonation>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = StoreResult<Impersonation>> + Send;
    /// Stamp `ended_at` only if the row is still active. Returns the
    /// updated row, or `None` when it had already ended.
    fn end(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Impersonation>>> + Send;
    fn list(
        &self,
        filter: ImpersonationFilter,
        pagination: Pagination,
    ) -> impl Future<Output = StoreResult<PaginatedResult<Impersonation>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenants (externally owned; read plus status flips)
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = StoreResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = StoreResult<Tenant>> + Send;
    fn set_status(
        &self,
        id: Uuid,
        status: TenantStatus,
    ) -> impl Future<Output = StoreResult<Tenant>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit records.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit record. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditRecord,
    ) -> impl Future<Output = StoreResult<AuditRecord>> + Send;
    /// Newest first: timestamp descending, ties broken by id descending.
    fn query(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = StoreResult<PaginatedResult<AuditRecord>>> + Send;
}
