//! Impersonation domain model.
//!
//! An impersonation row is created when an operator escalates into a
//! tenant and is only ever mutated once, to stamp `ended_at`. Rows are
//! retained forever for forensic review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impersonation {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub tenant_id: Uuid,
    pub target_user_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Impersonation {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateImpersonation {
    pub operator_id: Uuid,
    pub tenant_id: Uuid,
    pub target_user_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Filters for impersonation history listings.
#[derive(Debug, Clone, Default)]
pub struct ImpersonationFilter {
    pub operator_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub active_only: bool,
}
