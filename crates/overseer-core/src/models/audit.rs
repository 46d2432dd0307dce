//! Audit log domain model.
//!
//! Records are append-only. Nothing in the control plane updates or
//! deletes them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
    #[serde(rename = "LOGIN")]
    Login,
    #[serde(rename = "LOGIN_FAILED")]
    LoginFailed,
    #[serde(rename = "LOGOUT")]
    Logout,
    #[serde(rename = "2FA_ENROLLMENT_STARTED")]
    TwoFactorEnrollmentStarted,
    #[serde(rename = "2FA_ENABLED")]
    TwoFactorEnabled,
    #[serde(rename = "2FA_DISABLED")]
    TwoFactorDisabled,
    #[serde(rename = "IMPERSONATE_STARTED")]
    ImpersonateStarted,
    #[serde(rename = "IMPERSONATE_ENDED")]
    ImpersonateEnded,
    #[serde(rename = "TENANT_SUSPENDED")]
    TenantSuspended,
    #[serde(rename = "TENANT_REACTIVATED")]
    TenantReactivated,
    #[serde(rename = "TENANT_STATUS_CHANGED")]
    TenantStatusChanged,
    #[serde(rename = "OPERATOR_CREATED")]
    OperatorCreated,
    #[serde(rename = "OPERATOR_DEACTIVATED")]
    OperatorDeactivated,
    #[serde(rename = "IP_ALLOWLIST_UPDATED")]
    IpAllowlistUpdated,
}

impl AuditAction {
    pub const ALL: &'static [AuditAction] = &[
        AuditAction::Login,
        AuditAction::LoginFailed,
        AuditAction::Logout,
        AuditAction::TwoFactorEnrollmentStarted,
        AuditAction::TwoFactorEnabled,
        AuditAction::TwoFactorDisabled,
        AuditAction::ImpersonateStarted,
        AuditAction::ImpersonateEnded,
        AuditAction::TenantSuspended,
        AuditAction::TenantReactivated,
        AuditAction::TenantStatusChanged,
        AuditAction::OperatorCreated,
        AuditAction::OperatorDeactivated,
        AuditAction::IpAllowlistUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::TwoFactorEnrollmentStarted => "2FA_ENROLLMENT_STARTED",
            AuditAction::TwoFactorEnabled => "2FA_ENABLED",
            AuditAction::TwoFactorDisabled => "2FA_DISABLED",
            AuditAction::ImpersonateStarted => "IMPERSONATE_STARTED",
            AuditAction::ImpersonateEnded => "IMPERSONATE_ENDED",
            AuditAction::TenantSuspended => "TENANT_SUSPENDED",
            AuditAction::TenantReactivated => "TENANT_REACTIVATED",
            AuditAction::TenantStatusChanged => "TENANT_STATUS_CHANGED",
            AuditAction::OperatorCreated => "OPERATOR_CREATED",
            AuditAction::OperatorDeactivated => "OPERATOR_DEACTIVATED",
            AuditAction::IpAllowlistUpdated => "IP_ALLOWLIST_UPDATED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditRecord {
    pub actor_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_strings_roundtrip_through_from_str() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), *action);
        }
        assert!("DROP_TABLE".parse::<AuditAction>().is_err());
    }

    #[test]
    fn serde_uses_wire_vocabulary() {
        let json = serde_json::to_string(&AuditAction::TwoFactorEnabled).unwrap();
        assert_eq!(json, "\"2FA_ENABLED\"");
        let back: AuditAction = serde_json::from_str("\"IMPERSONATE_ENDED\"").unwrap();
        assert_eq!(back, AuditAction::ImpersonateEnded);
    }
}
