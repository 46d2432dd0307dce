//! Bearer extraction, principal resolution and request metadata.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, header};
use overseer_auth::{AuthError, Principal, RequestMeta, RoutePolicy, authorize};
use surrealdb::Connection;

use super::AppState;
use super::error::ApiError;

/// The raw token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the caller and check it against `policy`.
pub(crate) async fn require<C: Connection>(
    state: &AppState<C>,
    headers: &HeaderMap,
    policy: &RoutePolicy,
) -> Result<Principal, ApiError> {
    let Some(token) = bearer_token(headers) else {
        return Err(AuthError::Unauthenticated.into());
    };
    let principal = state.plane.resolve_bearer(token).await?;
    authorize(Some(&principal), policy)?;
    Ok(principal)
}

/// Client address and user agent for audit records and the allowlist.
pub(crate) fn request_meta(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    trusted_proxy: bool,
) -> RequestMeta {
    let forwarded = trusted_proxy
        .then(|| forwarded_for(headers))
        .flatten();
    let ip_address = forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()));

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    RequestMeta {
        ip_address,
        user_agent,
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
