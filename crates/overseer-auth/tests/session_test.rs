//! Session lifecycle: expiry boundary, logout, revocation, sweep,
//! bearer dispatch.

mod common;

use chrono::Duration;
use common::{Harness, meta};
use overseer_auth::{AuthError, Principal, PrincipalKind, RoutePolicy, authorize};
use overseer_core::models::audit::AuditAction;

#[tokio::test]
async fn session_resolves_until_the_expiry_instant() {
    let h = Harness::new().await;
    let success = h.login("owner@overseer.dev", "10.0.0.1").await;

    h.advance(Duration::hours(8) - Duration::seconds(1));
    assert!(
        h.plane
            .sessions()
            .resolve_session(&success.access_token)
            .await
            .is_ok()
    );

    h.advance(Duration::seconds(1));
    let err = h
        .plane
        .sessions()
        .resolve_session(&success.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));

    // Still dead even if the clock were rewound: the row is gone.
    h.clock.set(common::epoch());
    assert!(matches!(
        h.plane.sessions().resolve_session(&success.access_token).await,
        Err(AuthError::InvalidSession)
    ));
}

#[tokio::test]
async fn unknown_token_is_invalid_session() {
    let h = Harness::new().await;
    assert!(matches!(
        h.plane.sessions().resolve_session("not-a-real-token").await,
        Err(AuthError::InvalidSession)
    ));
}

#[tokio::test]
async fn each_login_mints_a_fresh_token() {
    let h = Harness::new().await;
    let first = h.login("owner@overseer.dev", "10.0.0.1").await;
    let second = h.login("owner@overseer.dev", "10.0.0.1").await;
    assert_ne!(first.access_token, second.access_token);
    assert_ne!(first.session_id, second.session_id);
}

#[tokio::test]
async fn logout_is_idempotent_and_audited_once() {
    let h = Harness::new().await;
    let success = h.login("owner@overseer.dev", "10.0.0.1").await;

    h.plane
        .logout(&success.access_token, &meta("10.0.0.1"))
        .await
        .unwrap();
    h.plane
        .logout(&success.access_token, &meta("10.0.0.1"))
        .await
        .unwrap();
    h.plane
        .logout("garbage", &meta("10.0.0.1"))
        .await
        .unwrap();

    assert!(matches!(
        h.plane.sessions().resolve_session(&success.access_token).await,
        Err(AuthError::InvalidSession)
    ));
    assert_eq!(h.audit_count(AuditAction::Logout).await, 1);
}

#[tokio::test]
async fn revoke_is_scoped_to_the_owning_operator() {
    let h = Harness::new().await;
    let success = h.login("owner@overseer.dev", "10.0.0.1").await;

    let removed = h
        .plane
        .sessions()
        .revoke_session(&success.access_token, h.support.id)
        .await
        .unwrap();
    assert!(!removed);
    assert!(
        h.plane
            .sessions()
            .resolve_session(&success.access_token)
            .await
            .is_ok()
    );

    assert!(
        h.plane
            .sessions()
            .revoke_session(&success.access_token, h.owner.id)
            .await
            .unwrap()
    );
    assert!(
        !h.plane
            .sessions()
            .revoke_session(&success.access_token, h.owner.id)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn deactivation_kills_existing_sessions() {
    let h = Harness::new().await;
    let support = h.login("support@overseer.dev", "10.0.0.1").await;
    let _second = h.login("support@overseer.dev", "10.0.0.1").await;

    let summary = h
        .plane
        .deactivate_operator(&h.owner, h.support.id, &meta("10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(summary.id, h.support.id);

    assert!(matches!(
        h.plane.sessions().resolve_session(&support.access_token).await,
        Err(AuthError::InvalidSession)
    ));

    let records = h
        .plane
        .query_audit(
            overseer_core::repository::AuditLogFilter {
                action: Some(AuditAction::OperatorDeactivated),
                ..Default::default()
            },
            overseer_core::repository::Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(records.total, 1);
    assert_eq!(records.items[0].details["revoked_sessions"], 2);
}

#[tokio::test]
async fn sweep_removes_only_expired_sessions() {
    let h = Harness::new().await;
    let old = h.login("owner@overseer.dev", "10.0.0.1").await;

    h.advance(Duration::hours(4));
    let fresh = h.login("support@overseer.dev", "10.0.0.1").await;

    h.advance(Duration::hours(4));
    assert_eq!(h.plane.sweep_expired_sessions().await.unwrap(), 1);
    assert_eq!(h.plane.sweep_expired_sessions().await.unwrap(), 0);

    assert!(matches!(
        h.plane.sessions().resolve_session(&old.access_token).await,
        Err(AuthError::InvalidSession)
    ));
    assert!(
        h.plane
            .sessions()
            .resolve_session(&fresh.access_token)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn bearer_dispatch_and_role_gate() {
    let h = Harness::new().await;
    let owner = h.login("owner@overseer.dev", "10.0.0.1").await;
    let support = h.login("support@overseer.dev", "10.0.0.1").await;

    let owner_principal = h.plane.resolve_bearer(&owner.access_token).await.unwrap();
    assert_eq!(owner_principal.kind(), PrincipalKind::Master);
    assert!(matches!(&owner_principal, Principal::Master(op) if op.id == h.owner.id));
    assert!(authorize(Some(&owner_principal), &RoutePolicy::OWNER).is_ok());
    assert!(matches!(
        authorize(Some(&owner_principal), &RoutePolicy::tenant_context()),
        Err(AuthError::TenantContextRequired)
    ));

    let support_principal = h.plane.resolve_bearer(&support.access_token).await.unwrap();
    assert!(matches!(
        authorize(Some(&support_principal), &RoutePolicy::OWNER),
        Err(AuthError::Forbidden)
    ));
    assert!(authorize(Some(&support_principal), &RoutePolicy::OWNER_OR_SUPPORT).is_ok());

    assert!(matches!(
        h.plane.resolve_bearer("x.y.z").await,
        Err(AuthError::InvalidSession)
    ));
}

#[tokio::test]
async fn logout_with_impersonation_token_ends_the_impersonation() {
    let h = Harness::new().await;
    let direct = h.login("support@overseer.dev", "10.0.0.1").await;
    let started = h
        .plane
        .start_impersonation(&h.support, h.tenant.id, None, &meta("10.0.0.1"))
        .await
        .unwrap();

    h.plane
        .logout(&started.token, &meta("10.0.0.1"))
        .await
        .unwrap();
    assert!(matches!(
        h.plane.resolve_bearer(&started.token).await,
        Err(AuthError::ImpersonationEnded)
    ));

    // A second logout with the spent token is a quiet no-op.
    h.plane
        .logout(&started.token, &meta("10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(h.audit_count(AuditAction::ImpersonateEnded).await, 1);
    assert_eq!(h.audit_count(AuditAction::Logout).await, 0);

    // The operator's own session is untouched.
    assert!(h.plane.resolve_bearer(&direct.access_token).await.is_ok());
}

#[tokio::test]
async fn resolution_racing_a_revoke_never_outlives_it() {
    let h = Harness::new().await;
    let success = h.login("owner@overseer.dev", "10.0.0.1").await;

    for _ in 0..5 {
        let fresh = h.login("owner@overseer.dev", "10.0.0.1").await;
        let (revoked, _) = tokio::join!(
            h.plane
                .sessions()
                .revoke_session(&fresh.access_token, h.owner.id),
            h.plane.sessions().resolve_session(&fresh.access_token),
        );
        assert!(revoked.unwrap());
        assert!(matches!(
            h.plane.sessions().resolve_session(&fresh.access_token).await,
            Err(AuthError::InvalidSession)
        ));
    }

    // Sessions not involved in the race are unaffected.
    assert!(
        h.plane
            .sessions()
            .resolve_session(&success.access_token)
            .await
            .is_ok()
    );
}
