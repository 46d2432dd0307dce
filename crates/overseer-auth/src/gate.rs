//! Resolved principals and the route-level role gate.
//!
//! A route declares which authentication kinds and which operator roles
//! it accepts. Both axes must pass.

use overseer_core::models::operator::{Operator, OperatorRole};
use overseer_core::models::tenant::Tenant;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// How a principal authenticated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// Direct operator session.
    Master,
    /// Tenant-scoped impersonation token.
    Impersonate,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Master => "master",
            PrincipalKind::Impersonate => "impersonate",
        }
    }
}

/// Everything a resolved impersonation token binds together, re-read
/// from the store on resolution.
#[derive(Debug, Clone)]
pub struct ImpersonationContext {
    pub impersonation_id: Uuid,
    pub operator: Operator,
    pub tenant: Tenant,
    pub target_user_id: Option<Uuid>,
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub enum Principal {
    Master(Operator),
    Impersonate(ImpersonationContext),
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::Master(_) => PrincipalKind::Master,
            Principal::Impersonate(_) => PrincipalKind::Impersonate,
        }
    }

    /// The human behind the request, whichever way they authenticated.
    pub fn operator(&self) -> &Operator {
        match self {
            Principal::Master(operator) => operator,
            Principal::Impersonate(ctx) => &ctx.operator,
        }
    }

    pub fn role(&self) -> OperatorRole {
        self.operator().role
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            Principal::Master(_) => None,
            Principal::Impersonate(ctx) => Some(ctx.tenant.id),
        }
    }
}

/// What a route accepts.
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    pub kinds: &'static [PrincipalKind],
    pub roles: &'static [OperatorRole],
    /// The route acts inside a tenant and needs one bound.
    pub tenant_context: bool,
}

impl RoutePolicy {
    /// Direct operator sessions with one of `roles`.
    pub const fn master(roles: &'static [OperatorRole]) -> Self {
        Self {
            kinds: &[PrincipalKind::Master],
            roles,
            tenant_context: false,
        }
    }

    /// Impersonation tokens only; any role.
    pub const fn tenant_context() -> Self {
        Self {
            kinds: &[PrincipalKind::Impersonate],
            roles: OperatorRole::ALL,
            tenant_context: true,
        }
    }

    pub const ANY_MASTER: RoutePolicy = RoutePolicy::master(OperatorRole::ALL);
    pub const OWNER: RoutePolicy = RoutePolicy::master(&[OperatorRole::Owner]);
    pub const OWNER_OR_SUPPORT: RoutePolicy =
        RoutePolicy::master(&[OperatorRole::Owner, OperatorRole::Support]);
}

/// Authorize a (possibly absent) principal against a route policy.
///
/// Failure order: no principal, missing tenant context, wrong kind,
/// wrong role.
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    policy: &RoutePolicy,
) -> Result<&'a Principal, AuthError> {
    let principal = principal.ok_or(AuthError::Unauthenticated)?;

    if policy.tenant_context && principal.tenant_id().is_none() {
        return Err(AuthError::TenantContextRequired);
    }
    if !policy.kinds.contains(&principal.kind()) {
        tracing::debug!(
            kind = principal.kind().as_str(),
            operator_id = %principal.operator().id,
            "principal kind not accepted by route"
        );
        return Err(AuthError::Forbidden);
    }
    if !policy.roles.contains(&principal.role()) {
        return Err(AuthError::Forbidden);
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use overseer_core::models::tenant::TenantStatus;

    use super::*;

    fn operator(role: OperatorRole) -> Operator {
        let now = Utc::now();
        Operator {
            id: Uuid::new_v4(),
            email: "ops@overseer.dev".into(),
            password_hash: String::new(),
            role,
            active: true,
            totp_secret: None,
            totp_enabled: false,
            allowed_ips: vec![],
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn impersonating(role: OperatorRole) -> Principal {
        let now = Utc::now();
        Principal::Impersonate(ImpersonationContext {
            impersonation_id: Uuid::new_v4(),
            operator: operator(role),
            tenant: Tenant {
                id: Uuid::new_v4(),
                name: "Harbor Charters".into(),
                slug: "harbor-charters".into(),
                status: TenantStatus::Active,
                created_at: now,
                updated_at: now,
            },
            target_user_id: None,
        })
    }

    #[test]
    fn missing_principal_is_unauthenticated() {
        assert!(matches!(
            authorize(None, &RoutePolicy::ANY_MASTER),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn role_axis() {
        let owner = Principal::Master(operator(OperatorRole::Owner));
        let support = Principal::Master(operator(OperatorRole::Support));

        assert!(authorize(Some(&owner), &RoutePolicy::OWNER).is_ok());
        assert!(matches!(
            authorize(Some(&support), &RoutePolicy::OWNER),
            Err(AuthError::Forbidden)
        ));
        assert!(authorize(Some(&support), &RoutePolicy::OWNER_OR_SUPPORT).is_ok());
    }

    #[test]
    fn kind_axis() {
        let imp = impersonating(OperatorRole::Owner);
        assert!(matches!(
            authorize(Some(&imp), &RoutePolicy::OWNER),
            Err(AuthError::Forbidden)
        ));
        assert!(authorize(Some(&imp), &RoutePolicy::tenant_context()).is_ok());
    }

    #[test]
    fn tenant_routes_need_tenant_context() {
        let owner = Principal::Master(operator(OperatorRole::Owner));
        assert!(matches!(
            authorize(Some(&owner), &RoutePolicy::tenant_context()),
            Err(AuthError::TenantContextRequired)
        ));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PrincipalKind::Impersonate).unwrap(),
            "\"impersonate\""
        );
        assert_eq!(PrincipalKind::Master.as_str(), "master");
    }
}
