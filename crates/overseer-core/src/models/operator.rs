//! Operator (master user) domain model.
//!
//! Operators are the privileged humans allowed into the master panel.
//! They are never hard-deleted; deactivation flips `active` off.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of operator roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperatorRole {
    Owner,
    Support,
}

impl OperatorRole {
    pub const ALL: &'static [OperatorRole] = &[OperatorRole::Owner, OperatorRole::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorRole::Owner => "Owner",
            OperatorRole::Support => "Support",
        }
    }

    /// Roles permitted to escalate into a tenant context.
    pub fn may_impersonate(&self) -> bool {
        match self {
            OperatorRole::Owner | OperatorRole::Support => true,
        }
    }
}

impl fmt::Display for OperatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owner" => Ok(OperatorRole::Owner),
            "Support" => Ok(OperatorRole::Support),
            other => Err(format!("unknown operator role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: OperatorRole,
    pub active: bool,
    /// TOTP secret; encrypted with AES-256-GCM when an MFA key is
    /// configured, otherwise the base32 secret.
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    /// Exact source addresses allowed to log in. Empty = any address.
    pub allowed_ips: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operator {
    /// The enrollment secret exists but has not been confirmed yet.
    pub fn totp_pending(&self) -> bool {
        self.totp_secret.is_some() && !self.totp_enabled
    }

    pub fn summary(&self) -> OperatorSummary {
        OperatorSummary {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
            totp_enabled: self.totp_enabled,
            last_login_at: self.last_login_at,
        }
    }
}

/// Caller-safe projection of an operator (no hash, no secret).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorSummary {
    pub id: Uuid,
    pub email: String,
    pub role: OperatorRole,
    pub totp_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOperator {
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: OperatorRole,
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOperator {
    pub active: Option<bool>,
    pub totp_enabled: Option<bool>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub totp_secret: Option<Option<String>>,
    pub allowed_ips: Option<Vec<String>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<Option<String>>,
}
