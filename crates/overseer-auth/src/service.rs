//! Control plane service: orchestrates the verifiers, the session
//! manager, the impersonation broker and the audit logger.
//!
//! Each successful mutation appends exactly one audit record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use overseer_core::error::StoreError;
use overseer_core::models::audit::{AuditAction, AuditRecord};
use overseer_core::models::impersonation::{Impersonation, ImpersonationFilter};
use overseer_core::models::operator::{
    CreateOperator, Operator, OperatorRole, OperatorSummary, UpdateOperator,
};
use overseer_core::models::tenant::{Tenant, TenantStatus};
use overseer_core::repository::{
    AuditLogFilter, AuditLogRepository, ImpersonationRepository, OperatorRepository,
    PaginatedResult, Pagination, SessionRepository, TenantRepository,
};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLogger, RequestMeta};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::credentials::CredentialVerifier;
use crate::error::AuthError;
use crate::gate::Principal;
use crate::impersonation::{ImpersonationBroker, StartedImpersonation, StoppedImpersonation};
use crate::ip;
use crate::session::SessionManager;
use crate::store::bounded;
use crate::token;
use crate::totp::{self, Enrollment};

/// Input for the login flow.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub totp_code: Option<String>,
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// Raw session token; returned to the client, never stored.
    pub access_token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub operator: OperatorSummary,
}

/// Login either finishes or pauses for a second factor. The pause is
/// not an error and issues nothing.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    SecondFactorRequired,
    Authenticated(LoginSuccess),
}

const OPERATOR_ENTITY: &str = "master_user";
const TENANT_ENTITY: &str = "tenant";
const IMPERSONATION_ENTITY: &str = "impersonation";

pub struct ControlPlane<O, S, I, T, A>
where
    O: OperatorRepository + 'static,
    S: SessionRepository + 'static,
    I: ImpersonationRepository + 'static,
    T: TenantRepository + 'static,
    A: AuditLogRepository + 'static,
{
    operators: Arc<O>,
    tenants: Arc<T>,
    credentials: CredentialVerifier<O>,
    sessions: SessionManager<O, S>,
    broker: ImpersonationBroker<O, I, T>,
    audit: AuditLogger<A>,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
}

impl<O, S, I, T, A> ControlPlane<O, S, I, T, A>
where
    O: OperatorRepository + 'static,
    S: SessionRepository + 'static,
    I: ImpersonationRepository + 'static,
    T: TenantRepository + 'static,
    A: AuditLogRepository + 'static,
{
    pub fn new(
        operators: O,
        sessions: S,
        impersonations: I,
        tenants: T,
        audit: A,
        config: AuthConfig,
    ) -> Self {
        Self::with_clock(
            operators,
            sessions,
            impersonations,
            tenants,
            audit,
            config,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        operators: O,
        sessions: S,
        impersonations: I,
        tenants: T,
        audit: A,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let operators = Arc::new(operators);
        let tenants = Arc::new(tenants);
        let config = Arc::new(config);
        let timeout = config.store_timeout;

        Self {
            credentials: CredentialVerifier::new(
                Arc::clone(&operators),
                config.pepper.clone(),
                timeout,
            ),
            sessions: SessionManager::new(
                Arc::clone(&operators),
                Arc::new(sessions),
                Arc::clone(&clock),
                config.session_lifetime_secs,
                timeout,
            ),
            broker: ImpersonationBroker::new(
                Arc::clone(&operators),
                Arc::new(impersonations),
                Arc::clone(&tenants),
                Arc::clone(&clock),
                Arc::clone(&config),
            ),
            audit: AuditLogger::new(Arc::new(audit), Arc::clone(&clock), timeout),
            operators,
            tenants,
            clock,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager<O, S> {
        &self.sessions
    }

    pub fn broker(&self) -> &ImpersonationBroker<O, I, T> {
        &self.broker
    }

    pub fn audit(&self) -> &AuditLogger<A> {
        &self.audit
    }

    // -----------------------------------------------------------------
    // Login / logout
    // -----------------------------------------------------------------

    /// Credentials, then second factor, then source address, then a
    /// fresh session.
    pub async fn login(
        &self,
        req: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<LoginOutcome, AuthError> {
        let operator = match self.credentials.verify(&req.email, &req.password).await? {
            Ok(operator) => operator,
            Err(rejection) => {
                match rejection.operator() {
                    Some(op) => self.audit_login_failure(op, rejection.reason(), meta).await,
                    None => tracing::warn!(
                        reason = rejection.reason(),
                        ip = meta.ip_address.as_deref().unwrap_or("-"),
                        "login attempt for unknown account"
                    ),
                }
                return Err(AuthError::InvalidCredentials);
            }
        };

        if operator.totp_enabled {
            let Some(code) = req.totp_code.as_deref() else {
                return Ok(LoginOutcome::SecondFactorRequired);
            };
            if !self.check_totp(&operator, code)? {
                self.audit_login_failure(&operator, "invalid_second_factor", meta)
                    .await;
                return Err(AuthError::InvalidSecondFactor);
            }
        }

        if let Err(e) = ip::enforce(&operator.allowed_ips, meta.ip_address.as_deref()) {
            self.audit_login_failure(&operator, "ip_not_allowed", meta)
                .await;
            return Err(e);
        }

        let issued = self.sessions.create_session(operator.id, meta).await?;

        let stamp = UpdateOperator {
            last_login_at: Some(self.clock.now()),
            last_login_ip: Some(meta.ip_address.clone()),
            ..Default::default()
        };
        let operator = match bounded(
            self.config.store_timeout,
            self.operators.update(operator.id, stamp),
        )
        .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(operator_id = %operator.id, error = %e, "failed to stamp last login");
                operator
            }
        };

        self.audit
            .record(
                AuditEvent::new(operator.id, AuditAction::Login, OPERATOR_ENTITY)
                    .entity(operator.id)
                    .details(json!({ "session_id": issued.session_id })),
                meta,
            )
            .await;
        tracing::info!(operator_id = %operator.id, "operator logged in");

        Ok(LoginOutcome::Authenticated(LoginSuccess {
            access_token: issued.token,
            session_id: issued.session_id,
            expires_at: issued.expires_at,
            operator: operator.summary(),
        }))
    }

    async fn audit_login_failure(&self, operator: &Operator, reason: &str, meta: &RequestMeta) {
        tracing::warn!(operator_id = %operator.id, reason, "login failed");
        self.audit
            .record(
                AuditEvent::new(operator.id, AuditAction::LoginFailed, OPERATOR_ENTITY)
                    .entity(operator.id)
                    .details(json!({ "reason": reason })),
                meta,
            )
            .await;
    }

    /// Invalidate the presented token. A session token deletes its
    /// session; an impersonation token ends its impersonation. Tokens
    /// that resolve to nothing are accepted silently.
    pub async fn logout(&self, raw: &str, meta: &RequestMeta) -> Result<(), AuthError> {
        if token::looks_like_jwt(raw) {
            if let Some(stopped) = self.broker.stop_by_token(raw).await? {
                self.record_impersonation_end(&stopped, meta).await;
            }
            return Ok(());
        }
        let (operator, session) = match self.sessions.resolve_session(raw).await {
            Ok(resolved) => resolved,
            Err(AuthError::InvalidSession) => return Ok(()),
            Err(e) => return Err(e),
        };

        if self.sessions.revoke_session(raw, operator.id).await? {
            self.audit
                .record(
                    AuditEvent::new(operator.id, AuditAction::Logout, OPERATOR_ENTITY)
                        .entity(operator.id)
                        .details(json!({ "session_id": session.id })),
                    meta,
                )
                .await;
        }
        Ok(())
    }

    /// Resolve a bearer value: JWT-shaped tokens go to the impersonation
    /// broker, everything else is a session token.
    pub async fn resolve_bearer(&self, raw: &str) -> Result<Principal, AuthError> {
        if token::looks_like_jwt(raw) {
            Ok(Principal::Impersonate(self.broker.resolve(raw).await?))
        } else {
            let (operator, _) = self.sessions.resolve_session(raw).await?;
            Ok(Principal::Master(operator))
        }
    }

    // -----------------------------------------------------------------
    // Second factor
    // -----------------------------------------------------------------

    fn mfa_key(&self) -> Option<&[u8; 32]> {
        self.config.mfa_encryption_key.as_ref()
    }

    fn check_totp(&self, operator: &Operator, code: &str) -> Result<bool, AuthError> {
        let Some(stored) = operator.totp_secret.as_deref() else {
            return Ok(false);
        };
        let secret = totp::open_secret(self.mfa_key(), stored)?;
        let now = self.clock.now().timestamp().max(0) as u64;
        totp::verify_code(&secret, code, self.config.totp_skew_steps, now)
    }

    async fn fetch_operator(&self, id: Uuid) -> Result<Operator, AuthError> {
        match bounded(self.config.store_timeout, self.operators.get_by_id(id)).await {
            Ok(op) => Ok(op),
            Err(StoreError::NotFound { .. }) => Err(AuthError::NotFound("operator".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_operator(
        &self,
        id: Uuid,
        update: UpdateOperator,
    ) -> Result<Operator, AuthError> {
        Ok(bounded(self.config.store_timeout, self.operators.update(id, update)).await?)
    }

    /// Start (or restart) TOTP enrollment. The secret is stored pending
    /// until [`Self::confirm_totp`] sees a valid code.
    pub async fn begin_totp_enrollment(
        &self,
        actor: &Operator,
        meta: &RequestMeta,
    ) -> Result<Enrollment, AuthError> {
        let operator = self.fetch_operator(actor.id).await?;
        if !operator.active {
            return Err(AuthError::AccountInactive);
        }
        if operator.totp_enabled {
            return Err(AuthError::Malformed("two-factor already enabled".into()));
        }

        let enrollment = totp::generate_enrollment(&self.config.totp_issuer, &operator.email)?;
        let sealed = totp::seal_secret(self.mfa_key(), &enrollment.secret)?;
        self.update_operator(
            operator.id,
            UpdateOperator {
                totp_secret: Some(Some(sealed)),
                totp_enabled: Some(false),
                ..Default::default()
            },
        )
        .await?;

        self.audit
            .record(
                AuditEvent::new(
                    operator.id,
                    AuditAction::TwoFactorEnrollmentStarted,
                    OPERATOR_ENTITY,
                )
                .entity(operator.id)
                .details(json!({ "restarted": operator.totp_pending() })),
                meta,
            )
            .await;

        Ok(enrollment)
    }

    /// Confirm a pending enrollment with a current code.
    pub async fn confirm_totp(
        &self,
        actor: &Operator,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<OperatorSummary, AuthError> {
        let operator = self.fetch_operator(actor.id).await?;
        if !operator.active {
            return Err(AuthError::AccountInactive);
        }
        if operator.totp_enabled {
            return Err(AuthError::Malformed("two-factor already enabled".into()));
        }
        if !operator.totp_pending() {
            return Err(AuthError::Malformed("no pending two-factor enrollment".into()));
        }
        if !self.check_totp(&operator, code)? {
            return Err(AuthError::InvalidSecondFactor);
        }

        let updated = self
            .update_operator(
                operator.id,
                UpdateOperator {
                    totp_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        self.audit
            .record(
                AuditEvent::new(updated.id, AuditAction::TwoFactorEnabled, OPERATOR_ENTITY)
                    .entity(updated.id),
                meta,
            )
            .await;

        Ok(updated.summary())
    }

    /// Turn TOTP off. Requires a currently valid code.
    pub async fn disable_totp(
        &self,
        actor: &Operator,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<OperatorSummary, AuthError> {
        let operator = self.fetch_operator(actor.id).await?;
        if !operator.active {
            return Err(AuthError::AccountInactive);
        }
        if !operator.totp_enabled {
            return Err(AuthError::Malformed("two-factor not enabled".into()));
        }
        if !self.check_totp(&operator, code)? {
            return Err(AuthError::InvalidSecondFactor);
        }

        let updated = self
            .update_operator(
                operator.id,
                UpdateOperator {
                    totp_enabled: Some(false),
                    totp_secret: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        self.audit
            .record(
                AuditEvent::new(updated.id, AuditAction::TwoFactorDisabled, OPERATOR_ENTITY)
                    .entity(updated.id),
                meta,
            )
            .await;

        Ok(updated.summary())
    }

    // -----------------------------------------------------------------
    // Impersonation
    // -----------------------------------------------------------------

    pub async fn start_impersonation(
        &self,
        actor: &Operator,
        tenant_id: Uuid,
        target_user_id: Option<Uuid>,
        meta: &RequestMeta,
    ) -> Result<StartedImpersonation, AuthError> {
        let started = self
            .broker
            .start(actor, tenant_id, target_user_id, meta)
            .await?;

        self.audit
            .record(
                AuditEvent::new(actor.id, AuditAction::ImpersonateStarted, IMPERSONATION_ENTITY)
                    .entity(started.impersonation.id)
                    .tenant(tenant_id)
                    .details(json!({
                        "target_user_id": target_user_id,
                        "expires_at": started.expires_at,
                    })),
                meta,
            )
            .await;

        Ok(started)
    }

    /// Stop an impersonation. Repeat calls by the issuer succeed and
    /// write nothing.
    pub async fn stop_impersonation(
        &self,
        actor: &Operator,
        impersonation_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<StoppedImpersonation, AuthError> {
        let stopped = self.broker.stop(impersonation_id, actor.id).await?;
        self.record_impersonation_end(&stopped, meta).await;
        Ok(stopped)
    }

    async fn record_impersonation_end(&self, stopped: &StoppedImpersonation, meta: &RequestMeta) {
        if !stopped.ended_now {
            return;
        }
        let imp = &stopped.impersonation;
        self.audit
            .record(
                AuditEvent::new(imp.operator_id, AuditAction::ImpersonateEnded, IMPERSONATION_ENTITY)
                    .entity(imp.id)
                    .tenant(imp.tenant_id),
                meta,
            )
            .await;
    }

    pub async fn list_impersonations(
        &self,
        filter: ImpersonationFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Impersonation>, AuthError> {
        self.broker.list(filter, pagination).await
    }

    // -----------------------------------------------------------------
    // Tenants
    // -----------------------------------------------------------------

    /// Flip a tenant's status. Setting the status it already has is a
    /// no-op and is not audited.
    pub async fn set_tenant_status(
        &self,
        actor: &Operator,
        tenant_id: Uuid,
        status: TenantStatus,
        meta: &RequestMeta,
    ) -> Result<Tenant, AuthError> {
        let timeout = self.config.store_timeout;
        let current = match bounded(timeout, self.tenants.get_by_id(tenant_id)).await {
            Ok(tenant) => tenant,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::TenantNotFound),
            Err(e) => return Err(e.into()),
        };
        if current.status == status {
            return Ok(current);
        }

        let updated = bounded(timeout, self.tenants.set_status(tenant_id, status)).await?;

        let action = match (current.status, status) {
            (_, TenantStatus::Suspended) => AuditAction::TenantSuspended,
            (TenantStatus::Suspended, _) => AuditAction::TenantReactivated,
            _ => AuditAction::TenantStatusChanged,
        };
        self.audit
            .record(
                AuditEvent::new(actor.id, action, TENANT_ENTITY)
                    .entity(tenant_id)
                    .tenant(tenant_id)
                    .details(json!({
                        "from": current.status.as_str(),
                        "to": status.as_str(),
                    })),
                meta,
            )
            .await;
        tracing::info!(
            tenant_id = %tenant_id,
            from = %current.status,
            to = %status,
            "tenant status changed"
        );

        Ok(updated)
    }

    // -----------------------------------------------------------------
    // Operator provisioning (Owner only)
    // -----------------------------------------------------------------

    fn require_owner(actor: &Operator) -> Result<(), AuthError> {
        if actor.role == OperatorRole::Owner {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    pub async fn provision_operator(
        &self,
        actor: &Operator,
        input: CreateOperator,
        meta: &RequestMeta,
    ) -> Result<OperatorSummary, AuthError> {
        Self::require_owner(actor)?;

        let email = input.email.trim().to_string();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(AuthError::Malformed("invalid email address".into())),
        }
        if input.password.chars().count() < self.config.min_password_length {
            return Err(AuthError::Malformed(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        let allowed_ips = ip::normalize_allowlist(&input.allowed_ips)?;
        if allowed_ips.is_empty() {
            tracing::warn!(
                email = %email,
                "operator provisioned with an empty IP allowlist; logins accepted from any address"
            );
        }

        let role = input.role;
        let created = bounded(
            self.config.store_timeout,
            self.operators.create(CreateOperator {
                email,
                password: input.password,
                role,
                allowed_ips,
            }),
        )
        .await?;

        self.audit
            .record(
                AuditEvent::new(actor.id, AuditAction::OperatorCreated, OPERATOR_ENTITY)
                    .entity(created.id)
                    .details(json!({
                        "email": created.email,
                        "role": role.as_str(),
                        "allowed_ips": created.allowed_ips,
                    })),
                meta,
            )
            .await;

        Ok(created.summary())
    }

    /// Deactivate an operator and revoke all of their sessions.
    pub async fn deactivate_operator(
        &self,
        actor: &Operator,
        operator_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<OperatorSummary, AuthError> {
        Self::require_owner(actor)?;
        if actor.id == operator_id {
            return Err(AuthError::Forbidden);
        }

        let target = self.fetch_operator(operator_id).await?;
        if !target.active {
            return Ok(target.summary());
        }

        let updated = self
            .update_operator(
                operator_id,
                UpdateOperator {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        // Sessions of an inactive owner no longer resolve, so a failed
        // revoke leaves rows for the sweeper rather than live access.
        let revoked = match self.sessions.revoke_all(operator_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(
                    operator_id = %operator_id,
                    error = %e,
                    "failed to revoke sessions of deactivated operator"
                );
                None
            }
        };

        self.audit
            .record(
                AuditEvent::new(actor.id, AuditAction::OperatorDeactivated, OPERATOR_ENTITY)
                    .entity(operator_id)
                    .details(json!({ "revoked_sessions": revoked })),
                meta,
            )
            .await;

        Ok(updated.summary())
    }

    /// Replace an operator's source-address allowlist. An empty list
    /// admits every address.
    pub async fn set_ip_allowlist(
        &self,
        actor: &Operator,
        operator_id: Uuid,
        entries: Vec<String>,
        meta: &RequestMeta,
    ) -> Result<OperatorSummary, AuthError> {
        Self::require_owner(actor)?;
        let allowed_ips = ip::normalize_allowlist(&entries)?;
        let target = self.fetch_operator(operator_id).await?;

        if allowed_ips.is_empty() {
            tracing::warn!(
                operator_id = %operator_id,
                "IP allowlist cleared; logins accepted from any address"
            );
        }

        let updated = self
            .update_operator(
                target.id,
                UpdateOperator {
                    allowed_ips: Some(allowed_ips.clone()),
                    ..Default::default()
                },
            )
            .await?;

        self.audit
            .record(
                AuditEvent::new(actor.id, AuditAction::IpAllowlistUpdated, OPERATOR_ENTITY)
                    .entity(operator_id)
                    .details(json!({
                        "previous": target.allowed_ips,
                        "allowed_ips": allowed_ips,
                    })),
                meta,
            )
            .await;

        Ok(updated.summary())
    }

    // -----------------------------------------------------------------
    // Audit & housekeeping
    // -----------------------------------------------------------------

    pub async fn query_audit(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> Result<PaginatedResult<AuditRecord>, AuthError> {
        self.audit.query(filter, pagination).await
    }

    pub async fn sweep_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions.sweep_expired().await
    }
}
