//! Audit logger.
//!
//! Writes never fail the operation that triggered them. A failed append
//! is logged on the `overseer::audit` target and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use overseer_core::models::audit::{AuditAction, AuditRecord, CreateAuditRecord};
use overseer_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::store::bounded;

/// Request-side metadata copied onto audit records and sessions.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One security-relevant action, before it is stamped and persisted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(actor_id: Uuid, action: AuditAction, entity_type: &'static str) -> Self {
        Self {
            actor_id,
            tenant_id: None,
            action,
            entity_type,
            entity_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

pub struct AuditLogger<A: AuditLogRepository> {
    repo: Arc<A>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    failed: AtomicU64,
}

impl<A: AuditLogRepository + 'static> AuditLogger<A> {
    pub fn new(repo: Arc<A>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            repo,
            clock,
            timeout,
            failed: AtomicU64::new(0),
        }
    }

    /// Append one record.
    ///
    /// The write runs on its own task, so it still lands if the calling
    /// request is dropped mid-flight.
    pub async fn record(&self, event: AuditEvent, meta: &RequestMeta) {
        let action = event.action;
        let actor_id = event.actor_id;
        let input = CreateAuditRecord {
            actor_id: event.actor_id,
            tenant_id: event.tenant_id,
            action: event.action,
            entity_type: event.entity_type.to_string(),
            entity_id: event.entity_id,
            details: event.details,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            timestamp: self.clock.now(),
        };

        let repo = Arc::clone(&self.repo);
        let timeout = self.timeout;
        let write = tokio::spawn(async move { bounded(timeout, repo.append(input)).await });

        let failure = match write.await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join) => format!("audit task aborted: {join}"),
        };

        self.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            target: "overseer::audit",
            action = %action,
            actor_id = %actor_id,
            error = %failure,
            "audit write failed"
        );
    }

    /// Newest first, with a total count for the filter.
    pub async fn query(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResult<AuditRecord>, AuthError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AuthError::Malformed("`from` is after `to`".into()));
            }
        }
        Ok(bounded(self.timeout, self.repo.query(filter, pagination.clamped())).await?)
    }

    /// Number of audit writes that failed since start-up.
    pub fn failed_writes(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
