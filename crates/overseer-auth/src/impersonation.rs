//! Impersonation broker.
//!
//! A started impersonation yields a signed token bound to one tenant.
//! The token alone is never enough: every resolution re-reads the
//! impersonation row, the operator and the tenant, so ending the
//! impersonation, deactivating the operator or suspending the tenant
//! takes effect on the next request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use overseer_core::error::StoreError;
use overseer_core::models::impersonation::{
    CreateImpersonation, Impersonation, ImpersonationFilter,
};
use overseer_core::models::operator::Operator;
use overseer_core::models::tenant::{Tenant, TenantStatus};
use overseer_core::repository::{
    ImpersonationRepository, OperatorRepository, PaginatedResult, Pagination, TenantRepository,
};
use uuid::Uuid;

use crate::audit::RequestMeta;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::gate::ImpersonationContext;
use crate::store::bounded;
use crate::token::{self, ImpersonationBinding};

/// Result of starting an impersonation.
#[derive(Debug, Clone)]
pub struct StartedImpersonation {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub impersonation: Impersonation,
    pub tenant: Tenant,
}

/// Result of a stop request.
#[derive(Debug, Clone)]
pub struct StoppedImpersonation {
    pub impersonation: Impersonation,
    /// `false` when the impersonation had already ended before this call.
    pub ended_now: bool,
}

pub struct ImpersonationBroker<O, I, T>
where
    O: OperatorRepository,
    I: ImpersonationRepository,
    T: TenantRepository,
{
    operators: Arc<O>,
    impersonations: Arc<I>,
    tenants: Arc<T>,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
}

impl<O, I, T> ImpersonationBroker<O, I, T>
where
    O: OperatorRepository,
    I: ImpersonationRepository,
    T: TenantRepository,
{
    pub fn new(
        operators: Arc<O>,
        impersonations: Arc<I>,
        tenants: Arc<T>,
        clock: Arc<dyn Clock>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            operators,
            impersonations,
            tenants,
            clock,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        self.config.store_timeout
    }

    /// Escalate `operator` into `tenant_id`.
    pub async fn start(
        &self,
        operator: &Operator,
        tenant_id: Uuid,
        target_user_id: Option<Uuid>,
        meta: &RequestMeta,
    ) -> Result<StartedImpersonation, AuthError> {
        if !operator.active {
            return Err(AuthError::OperatorInactive);
        }
        if !operator.role.may_impersonate() {
            return Err(AuthError::Forbidden);
        }

        let tenant = match bounded(self.timeout(), self.tenants.get_by_id(tenant_id)).await {
            Ok(tenant) => tenant,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::TenantNotFound),
            Err(e) => return Err(e.into()),
        };
        if tenant.status == TenantStatus::Suspended {
            return Err(AuthError::TenantSuspended);
        }

        let now = self.clock.now();
        let impersonation = bounded(
            self.timeout(),
            self.impersonations.create(CreateImpersonation {
                operator_id: operator.id,
                tenant_id,
                target_user_id,
                started_at: now,
                ip_address: meta.ip_address.clone(),
                user_agent: meta.user_agent.clone(),
            }),
        )
        .await?;

        let binding = ImpersonationBinding {
            operator_id: operator.id,
            tenant_id,
            target_user_id,
            impersonation_id: impersonation.id,
        };
        let (token, expires_at) = match token::issue_impersonation_token(&binding, now, &self.config)
        {
            Ok(issued) => issued,
            Err(e) => {
                // No token went out; close the row so it is not left dangling.
                if let Err(end_err) =
                    bounded(self.timeout(), self.impersonations.end(impersonation.id, now)).await
                {
                    tracing::warn!(
                        impersonation_id = %impersonation.id,
                        error = %end_err,
                        "failed to close impersonation after signing error"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            operator_id = %operator.id,
            tenant_id = %tenant_id,
            impersonation_id = %impersonation.id,
            "impersonation started"
        );

        Ok(StartedImpersonation {
            token,
            expires_at,
            impersonation,
            tenant,
        })
    }

    /// Resolve an impersonation token into its live context.
    ///
    /// Token checks come first (signature, issuer, kind, expiry), then
    /// the row must still be open, the operator still active and the
    /// tenant not suspended.
    pub async fn resolve(&self, raw: &str) -> Result<ImpersonationContext, AuthError> {
        let binding = token::verify_impersonation_token(raw, self.clock.now(), &self.config)?;

        let impersonation = match bounded(
            self.timeout(),
            self.impersonations.get_by_id(binding.impersonation_id),
        )
        .await
        {
            Ok(imp) => imp,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::InvalidSession),
            Err(e) => return Err(e.into()),
        };
        if impersonation.operator_id != binding.operator_id
            || impersonation.tenant_id != binding.tenant_id
        {
            return Err(AuthError::InvalidSession);
        }
        if !impersonation.is_active() {
            return Err(AuthError::ImpersonationEnded);
        }

        let operator = match bounded(self.timeout(), self.operators.get_by_id(binding.operator_id))
            .await
        {
            Ok(op) => op,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::OperatorInactive),
            Err(e) => return Err(e.into()),
        };
        if !operator.active {
            return Err(AuthError::OperatorInactive);
        }

        let tenant = match bounded(self.timeout(), self.tenants.get_by_id(binding.tenant_id)).await
        {
            Ok(tenant) => tenant,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::InvalidSession),
            Err(e) => return Err(e.into()),
        };
        if tenant.status == TenantStatus::Suspended {
            return Err(AuthError::TenantSuspended);
        }

        Ok(ImpersonationContext {
            impersonation_id: impersonation.id,
            operator,
            tenant,
            target_user_id: impersonation.target_user_id,
        })
    }

    /// End the impersonation a presented token is bound to. Only the
    /// signature, issuer and expiry are checked, so a token for a
    /// suspended tenant can still be retired. `None` when the token does
    /// not verify or names no impersonation.
    pub async fn stop_by_token(
        &self,
        raw: &str,
    ) -> Result<Option<StoppedImpersonation>, AuthError> {
        let binding = match token::verify_impersonation_token(raw, self.clock.now(), &self.config)
        {
            Ok(binding) => binding,
            Err(AuthError::InvalidSession) => return Ok(None),
            Err(e) => return Err(e),
        };
        match self
            .stop(binding.impersonation_id, binding.operator_id)
            .await
        {
            Ok(stopped) => Ok(Some(stopped)),
            Err(AuthError::NotFound(_) | AuthError::NotOwner) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// End an impersonation. Only its issuer may do so; stopping an
    /// ended one succeeds without touching it.
    pub async fn stop(
        &self,
        impersonation_id: Uuid,
        operator_id: Uuid,
    ) -> Result<StoppedImpersonation, AuthError> {
        let current =
            match bounded(self.timeout(), self.impersonations.get_by_id(impersonation_id)).await {
                Ok(imp) => imp,
                Err(StoreError::NotFound { .. }) => {
                    return Err(AuthError::NotFound("impersonation".into()));
                }
                Err(e) => return Err(e.into()),
            };
        if current.operator_id != operator_id {
            return Err(AuthError::NotOwner);
        }
        if !current.is_active() {
            return Ok(StoppedImpersonation {
                impersonation: current,
                ended_now: false,
            });
        }

        let ended = bounded(
            self.timeout(),
            self.impersonations.end(impersonation_id, self.clock.now()),
        )
        .await?;

        match ended {
            Some(impersonation) => {
                tracing::info!(
                    operator_id = %operator_id,
                    impersonation_id = %impersonation_id,
                    "impersonation ended"
                );
                Ok(StoppedImpersonation {
                    impersonation,
                    ended_now: true,
                })
            }
            // A concurrent stop won the conditional update.
            None => {
                let impersonation =
                    bounded(self.timeout(), self.impersonations.get_by_id(impersonation_id))
                        .await?;
                Ok(StoppedImpersonation {
                    impersonation,
                    ended_now: false,
                })
            }
        }
    }

    pub async fn list(
        &self,
        filter: ImpersonationFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Impersonation>, AuthError> {
        Ok(bounded(
            self.timeout(),
            self.impersonations.list(filter, pagination.clamped()),
        )
        .await?)
    }
}
