//! HTTP surface of the master panel.

mod auth;
mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderValue, Request};
use axum::middleware;
use axum::routing::{get, post, put};
use overseer_auth::ControlPlane;
use overseer_db::repository::{
    SurrealAuditLogRepository, SurrealImpersonationRepository, SurrealOperatorRepository,
    SurrealSessionRepository, SurrealTenantRepository,
};
use surrealdb::Connection;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::set_header::SetRequestHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, info_span};
use ulid::Ulid;

use error::REQUEST_ID;

/// The control plane wired to SurrealDB repositories.
pub type Plane<C> = ControlPlane<
    SurrealOperatorRepository<C>,
    SurrealSessionRepository<C>,
    SurrealImpersonationRepository<C>,
    SurrealTenantRepository<C>,
    SurrealAuditLogRepository<C>,
>;

pub struct AppState<C: Connection> {
    pub plane: Arc<Plane<C>>,
    /// Trust the first `X-Forwarded-For` hop as the client address.
    pub trusted_proxy: bool,
}

impl<C: Connection> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            plane: Arc::clone(&self.plane),
            trusted_proxy: self.trusted_proxy,
        }
    }
}

pub fn router<C: Connection>(state: AppState<C>) -> Router {
    let api = Router::new()
        .route("/api/v1/auth/login", post(handlers::login::<C>))
        .route("/api/v1/auth/logout", post(handlers::logout::<C>))
        .route("/api/v1/auth/me", get(handlers::me::<C>))
        .route("/api/v1/auth/2fa/setup", post(handlers::totp_setup::<C>))
        .route("/api/v1/auth/2fa/verify", post(handlers::totp_verify::<C>))
        .route("/api/v1/auth/2fa/disable", post(handlers::totp_disable::<C>))
        .route(
            "/api/v1/impersonation",
            post(handlers::start_impersonation::<C>).get(handlers::list_impersonations::<C>),
        )
        .route(
            "/api/v1/impersonation/context",
            get(handlers::impersonation_context::<C>),
        )
        .route(
            "/api/v1/impersonation/:id/stop",
            post(handlers::stop_impersonation::<C>),
        )
        .route("/api/v1/audit", get(handlers::query_audit::<C>))
        .route(
            "/api/v1/tenants/:id/status",
            post(handlers::set_tenant_status::<C>),
        )
        .route("/api/v1/operators", post(handlers::provision_operator::<C>))
        .route(
            "/api/v1/operators/:id/deactivate",
            post(handlers::deactivate_operator::<C>),
        )
        .route(
            "/api/v1/operators/:id/allowlist",
            put(handlers::set_allowlist::<C>),
        )
        .with_state(state);

    with_middleware(api.route("/health", get(handlers::health)))
}

/// Panic guard and error correlation inside, request id and tracing
/// outside.
fn with_middleware(routes: Router) -> Router {
    routes
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(middleware::from_fn(error::correlate))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    REQUEST_ID,
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(REQUEST_ID))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

// Headers stay out of the span: they carry bearer tokens.
fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(request.uri().path(), MatchedPath::as_str);

    info_span!("http-request", method = %request.method(), route, request_id)
}
