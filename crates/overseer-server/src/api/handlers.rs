//! Route handlers. Each one resolves the caller against its route
//! policy, then delegates to the control plane.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use overseer_auth::{AuthError, LoginOutcome, LoginRequest, Principal, RoutePolicy};
use overseer_core::models::audit::{AuditAction, AuditRecord};
use overseer_core::models::impersonation::{Impersonation, ImpersonationFilter};
use overseer_core::models::operator::{CreateOperator, Operator, OperatorRole, OperatorSummary};
use overseer_core::models::tenant::{TenantStatus, TenantSummary};
use overseer_core::repository::{AuditLogFilter, PaginatedResult, Pagination};
use serde::{Deserialize, Serialize};
use serde_json::json;
use surrealdb::Connection;
use uuid::Uuid;

use super::AppState;
use super::auth::{bearer_token, request_meta, require};
use super::error::ApiError;
use super::extract::{Body, Id, Params};

type Peer = Option<ConnectInfo<SocketAddr>>;

fn pagination(offset: Option<u64>, limit: Option<u64>) -> Pagination {
    let default = Pagination::default();
    Pagination {
        offset: offset.unwrap_or(default.offset),
        limit: limit.unwrap_or(default.limit),
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> From<PaginatedResult<T>> for Page<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        Self {
            items: result.items,
            total: result.total,
            offset: result.offset,
            limit: result.limit,
        }
    }
}

/// Routes that act as the operator themself need the direct session.
fn master(principal: Principal) -> Result<Operator, ApiError> {
    match principal {
        Principal::Master(operator) => Ok(operator),
        Principal::Impersonate(_) => Err(AuthError::Forbidden.into()),
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Login / logout / me
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub operator: OperatorSummary,
}

pub async fn login<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let outcome = state
        .plane
        .login(
            LoginRequest {
                email: body.email,
                password: body.password,
                totp_code: body.totp_code,
            },
            &meta,
        )
        .await?;

    let response = match outcome {
        LoginOutcome::SecondFactorRequired => {
            Json(json!({ "requires_two_factor": true })).into_response()
        }
        LoginOutcome::Authenticated(success) => Json(LoginResponse {
            access_token: success.access_token,
            token_type: "Bearer",
            session_id: success.session_id,
            expires_at: success.expires_at,
            operator: success.operator,
        })
        .into_response(),
    };
    Ok(response)
}

/// Always answers 204: a missing, unknown or expired token leaves
/// nothing to revoke.
pub async fn logout<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
        if let Err(err) = state.plane.logout(token, &meta).await {
            tracing::error!(error = %err, "logout failed");
        }
    }
    StatusCode::NO_CONTENT
}

pub async fn me<C: Connection>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Result<Json<OperatorSummary>, ApiError> {
    let principal = require(&state, &headers, &RoutePolicy::ANY_MASTER).await?;
    Ok(Json(principal.operator().summary()))
}

// ---------------------------------------------------------------------------
// Second factor
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeBody {
    pub code: String,
}

pub async fn totp_setup<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::ANY_MASTER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let enrollment = state.plane.begin_totp_enrollment(&operator, &meta).await?;
    Ok(Json(EnrollmentResponse {
        secret: enrollment.secret,
        provisioning_uri: enrollment.provisioning_uri,
    }))
}

pub async fn totp_verify<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<CodeBody>,
) -> Result<Json<OperatorSummary>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::ANY_MASTER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let summary = state
        .plane
        .confirm_totp(&operator, &body.code, &meta)
        .await?;
    Ok(Json(summary))
}

pub async fn totp_disable<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<CodeBody>,
) -> Result<Json<OperatorSummary>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::ANY_MASTER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let summary = state
        .plane
        .disable_totp(&operator, &body.code, &meta)
        .await?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Impersonation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartImpersonationBody {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub target_user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartImpersonationResponse {
    pub impersonation_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub impersonation_id: Uuid,
    pub tenant: TenantSummary,
}

#[derive(Debug, Serialize)]
pub struct StopImpersonationResponse {
    pub impersonation: Impersonation,
    pub ended_now: bool,
}

#[derive(Debug, Serialize)]
pub struct ImpersonationContextResponse {
    pub impersonation_id: Uuid,
    pub operator: OperatorSummary,
    pub tenant: TenantSummary,
    pub target_user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImpersonationQuery {
    pub operator_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub active_only: bool,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn start_impersonation<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<StartImpersonationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::OWNER_OR_SUPPORT).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let started = state
        .plane
        .start_impersonation(&operator, body.tenant_id, body.target_user_id, &meta)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartImpersonationResponse {
            impersonation_token: started.token,
            token_type: "Bearer",
            expires_at: started.expires_at,
            impersonation_id: started.impersonation.id,
            tenant: started.tenant.summary(),
        }),
    ))
}

pub async fn stop_impersonation<C: Connection>(
    State(state): State<AppState<C>>,
    Id(id): Id,
    peer: Peer,
    headers: HeaderMap,
) -> Result<Json<StopImpersonationResponse>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::ANY_MASTER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let stopped = state.plane.stop_impersonation(&operator, id, &meta).await?;
    Ok(Json(StopImpersonationResponse {
        impersonation: stopped.impersonation,
        ended_now: stopped.ended_now,
    }))
}

pub async fn list_impersonations<C: Connection>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Params(query): Params<ImpersonationQuery>,
) -> Result<Json<Page<Impersonation>>, ApiError> {
    require(&state, &headers, &RoutePolicy::OWNER).await?;
    let filter = ImpersonationFilter {
        operator_id: query.operator_id,
        tenant_id: query.tenant_id,
        active_only: query.active_only,
    };
    let page = state
        .plane
        .list_impersonations(filter, pagination(query.offset, query.limit))
        .await?;
    Ok(Json(page.into()))
}

pub async fn impersonation_context<C: Connection>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Result<Json<ImpersonationContextResponse>, ApiError> {
    let principal = require(&state, &headers, &RoutePolicy::tenant_context()).await?;
    let Principal::Impersonate(ctx) = principal else {
        return Err(AuthError::TenantContextRequired.into());
    };
    Ok(Json(ImpersonationContextResponse {
        impersonation_id: ctx.impersonation_id,
        operator: ctx.operator.summary(),
        tenant: ctx.tenant.summary(),
        target_user_id: ctx.target_user_id,
    }))
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn query_audit<C: Connection>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Params(query): Params<AuditQuery>,
) -> Result<Json<Page<AuditRecord>>, ApiError> {
    require(&state, &headers, &RoutePolicy::OWNER_OR_SUPPORT).await?;
    let pagination = pagination(query.offset, query.limit);
    let filter = AuditLogFilter {
        actor_id: query.actor_id,
        tenant_id: query.tenant_id,
        action: query.action,
        entity_type: query.entity_type,
        from: query.from,
        to: query.to,
    };
    let page = state.plane.query_audit(filter, pagination).await?;
    Ok(Json(page.into()))
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TenantStatusBody {
    pub status: TenantStatus,
}

pub async fn set_tenant_status<C: Connection>(
    State(state): State<AppState<C>>,
    Id(tenant_id): Id,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<TenantStatusBody>,
) -> Result<Json<TenantSummary>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::OWNER_OR_SUPPORT).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let tenant = state
        .plane
        .set_tenant_status(&operator, tenant_id, body.status, &meta)
        .await?;
    Ok(Json(tenant.summary()))
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub email: String,
    pub password: String,
    pub role: OperatorRole,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AllowlistBody {
    pub allowed_ips: Vec<String>,
}

pub async fn provision_operator<C: Connection>(
    State(state): State<AppState<C>>,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<ProvisionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::OWNER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let created = state
        .plane
        .provision_operator(
            &operator,
            CreateOperator {
                email: body.email,
                password: body.password,
                role: body.role,
                allowed_ips: body.allowed_ips,
            },
            &meta,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn deactivate_operator<C: Connection>(
    State(state): State<AppState<C>>,
    Id(operator_id): Id,
    peer: Peer,
    headers: HeaderMap,
) -> Result<Json<OperatorSummary>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::OWNER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let summary = state
        .plane
        .deactivate_operator(&operator, operator_id, &meta)
        .await?;
    Ok(Json(summary))
}

pub async fn set_allowlist<C: Connection>(
    State(state): State<AppState<C>>,
    Id(operator_id): Id,
    peer: Peer,
    headers: HeaderMap,
    Body(body): Body<AllowlistBody>,
) -> Result<Json<OperatorSummary>, ApiError> {
    let operator = master(require(&state, &headers, &RoutePolicy::OWNER).await?)?;
    let meta = request_meta(&headers, peer.as_ref(), state.trusted_proxy);
    let summary = state
        .plane
        .set_ip_allowlist(&operator, operator_id, body.allowed_ips, &meta)
        .await?;
    Ok(Json(summary))
}
