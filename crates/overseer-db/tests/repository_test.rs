//! Integration tests for the operator, session and tenant repositories
//! using in-memory SurrealDB.

use chrono::{Duration, TimeZone, Utc};
use overseer_core::error::StoreError;
use overseer_core::models::operator::{CreateOperator, OperatorRole, UpdateOperator};
use overseer_core::models::session::CreateSession;
use overseer_core::models::tenant::{CreateTenant, TenantStatus};
use overseer_core::repository::{
    OperatorRepository, Pagination, SessionRepository, TenantRepository,
};
use overseer_db::repository::{
    SurrealOperatorRepository, SurrealSessionRepository, SurrealTenantRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    overseer_db::run_migrations(&db).await.unwrap();
    db
}

fn operator(email: &str, role: OperatorRole) -> CreateOperator {
    CreateOperator {
        email: email.into(),
        password: "a-long-enough-password".into(),
        role,
        allowed_ips: vec![],
    }
}

// -----------------------------------------------------------------------
// Operators
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_operator() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);

    let created = repo
        .create(operator("  Dana@Overseer.DEV", OperatorRole::Owner))
        .await
        .unwrap();
    assert_eq!(created.email, "dana@overseer.dev");
    assert!(created.active);
    assert!(!created.totp_enabled);
    assert!(created.totp_secret.is_none());
    assert!(created.password_hash.starts_with("$argon2id$"));

    let by_id = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(by_id.email, created.email);
    assert_eq!(by_id.role, OperatorRole::Owner);

    let by_email = repo.get_by_email("DANA@overseer.dev ").await.unwrap();
    assert_eq!(by_email.id, created.id);
}

#[tokio::test]
async fn duplicate_email_is_already_exists() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);

    repo.create(operator("dana@overseer.dev", OperatorRole::Owner))
        .await
        .unwrap();
    let err = repo
        .create(operator("DANA@overseer.dev", OperatorRole::Support))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn blank_email_or_password_is_rejected() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);

    assert!(matches!(
        repo.create(operator("   ", OperatorRole::Support)).await,
        Err(StoreError::Validation { .. })
    ));
    let mut no_password = operator("ops@overseer.dev", OperatorRole::Support);
    no_password.password.clear();
    assert!(matches!(
        repo.create(no_password).await,
        Err(StoreError::Validation { .. })
    ));
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_operator_is_not_found() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);

    assert!(matches!(
        repo.get_by_id(Uuid::new_v4()).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        repo.get_by_email("ghost@overseer.dev").await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn update_touches_only_given_fields() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);
    let created = repo
        .create(operator("lee@overseer.dev", OperatorRole::Support))
        .await
        .unwrap();

    let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let updated = repo
        .update(
            created.id,
            UpdateOperator {
                totp_secret: Some(Some("sealed-secret".into())),
                last_login_at: Some(at),
                last_login_ip: Some(Some("192.0.2.1".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.totp_secret.as_deref(), Some("sealed-secret"));
    assert!(!updated.totp_enabled);
    assert!(updated.active);
    assert_eq!(updated.last_login_at, Some(at));
    assert_eq!(updated.last_login_ip.as_deref(), Some("192.0.2.1"));

    let cleared = repo
        .update(
            created.id,
            UpdateOperator {
                totp_secret: Some(None),
                active: Some(false),
                allowed_ips: Some(vec!["10.0.0.1".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.totp_secret.is_none());
    assert!(!cleared.active);
    assert_eq!(cleared.allowed_ips, vec!["10.0.0.1".to_string()]);
    assert_eq!(cleared.last_login_at, Some(at));
}

#[tokio::test]
async fn list_and_count_operators() {
    let db = setup().await;
    let repo = SurrealOperatorRepository::new(db);
    assert_eq!(repo.count().await.unwrap(), 0);

    for email in ["a@overseer.dev", "b@overseer.dev", "c@overseer.dev"] {
        repo.create(operator(email, OperatorRole::Support))
            .await
            .unwrap();
    }

    assert_eq!(repo.count().await.unwrap(), 3);
    let page = repo
        .list(Pagination {
            offset: 0,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
}

#[tokio::test]
async fn peppered_hash_differs_from_plain() {
    let db = setup().await;
    let plain = SurrealOperatorRepository::new(db.clone());
    let peppered = SurrealOperatorRepository::with_pepper(db, "server-pepper".into());

    let a = plain
        .create(operator("a@overseer.dev", OperatorRole::Support))
        .await
        .unwrap();
    let b = peppered
        .create(operator("b@overseer.dev", OperatorRole::Support))
        .await
        .unwrap();
    assert_ne!(a.password_hash, b.password_hash);
}

// -----------------------------------------------------------------------
// Sessions
// -----------------------------------------------------------------------

fn session(operator_id: Uuid, hash: &str, expires_in: Duration) -> CreateSession {
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    CreateSession {
        operator_id,
        token_hash: hash.into(),
        ip_address: Some("192.0.2.1".into()),
        user_agent: None,
        created_at: now,
        expires_at: now + expires_in,
    }
}

#[tokio::test]
async fn session_lookup_by_hash() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let operator_id = Uuid::new_v4();

    let created = repo
        .create(session(operator_id, "hash-1", Duration::hours(8)))
        .await
        .unwrap();
    let found = repo.get_by_token_hash("hash-1").await.unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.operator_id, operator_id);
    assert_eq!(found.expires_at, created.expires_at);

    assert!(matches!(
        repo.get_by_token_hash("hash-2").await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_for_operator_checks_ownership() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let owner = Uuid::new_v4();

    repo.create(session(owner, "hash-1", Duration::hours(8)))
        .await
        .unwrap();

    assert!(
        !repo
            .delete_for_operator("hash-1", Uuid::new_v4())
            .await
            .unwrap()
    );
    assert!(repo.delete_for_operator("hash-1", owner).await.unwrap());
    assert!(!repo.delete_for_operator("hash-1", owner).await.unwrap());
}

#[tokio::test]
async fn delete_operator_sessions_leaves_others() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    for hash in ["a-1", "a-2"] {
        repo.create(session(a, hash, Duration::hours(8)))
            .await
            .unwrap();
    }
    repo.create(session(b, "b-1", Duration::hours(8)))
        .await
        .unwrap();

    assert_eq!(repo.delete_operator_sessions(a).await.unwrap(), 2);
    assert_eq!(repo.delete_operator_sessions(a).await.unwrap(), 0);
    assert!(repo.get_by_token_hash("b-1").await.is_ok());
}

#[tokio::test]
async fn delete_expired_includes_the_boundary() {
    let db = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let operator_id = Uuid::new_v4();

    let short = repo
        .create(session(operator_id, "short", Duration::hours(1)))
        .await
        .unwrap();
    repo.create(session(operator_id, "long", Duration::hours(8)))
        .await
        .unwrap();

    assert_eq!(repo.delete_expired(short.expires_at).await.unwrap(), 1);
    assert!(repo.get_by_token_hash("short").await.is_err());
    assert!(repo.get_by_token_hash("long").await.is_ok());
}

// -----------------------------------------------------------------------
// Tenants
// -----------------------------------------------------------------------

#[tokio::test]
async fn tenant_status_flip() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let tenant = repo
        .create(CreateTenant {
            name: "Harbor Charters".into(),
            slug: "harbor-charters".into(),
            status: TenantStatus::Trial,
        })
        .await
        .unwrap();
    assert_eq!(tenant.status, TenantStatus::Trial);

    let suspended = repo
        .set_status(tenant.id, TenantStatus::Suspended)
        .await
        .unwrap();
    assert_eq!(suspended.status, TenantStatus::Suspended);
    assert_eq!(suspended.slug, "harbor-charters");

    let fetched = repo.get_by_id(tenant.id).await.unwrap();
    assert_eq!(fetched.status, TenantStatus::Suspended);
}

#[tokio::test]
async fn tenant_status_on_missing_tenant_is_not_found() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    assert!(matches!(
        repo.set_status(Uuid::new_v4(), TenantStatus::Active).await,
        Err(StoreError::NotFound { .. })
    ));
}
