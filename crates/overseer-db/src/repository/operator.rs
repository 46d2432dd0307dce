//! SurrealDB implementation of [`OperatorRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) can be
//! provided at construction time.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use overseer_core::error::{StoreError, StoreResult};
use overseer_core::models::operator::{CreateOperator, Operator, OperatorRole, UpdateOperator};
use overseer_core::repository::{OperatorRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OperatorRow {
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    totp_secret: Option<String>,
    totp_enabled: bool,
    allowed_ips: Vec<String>,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OperatorRowWithId {
    record_id: String,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    totp_secret: Option<String>,
    totp_enabled: bool,
    allowed_ips: Vec<String>,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Result<OperatorRole, DbError> {
    s.parse().map_err(DbError::InvalidRow)
}

impl OperatorRow {
    fn into_operator(self, id: Uuid) -> Result<Operator, DbError> {
        Ok(Operator {
            id,
            email: self.email,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            active: self.active,
            totp_secret: self.totp_secret,
            totp_enabled: self.totp_enabled,
            allowed_ips: self.allowed_ips,
            last_login_at: self.last_login_at,
            last_login_ip: self.last_login_ip,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OperatorRowWithId {
    fn try_into_operator(self) -> Result<Operator, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::InvalidRow(format!("invalid operator UUID: {e}")))?;
        OperatorRow {
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            active: self.active,
            totp_secret: self.totp_secret,
            totp_enabled: self.totp_enabled,
            allowed_ips: self.allowed_ips,
            last_login_at: self.last_login_at,
            last_login_ip: self.last_login_ip,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_operator(id)
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Emails are matched case-insensitively.
fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing. The salt is randomly generated for each call.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Hash(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Hash(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// SurrealDB implementation of the Operator repository.
#[derive(Clone)]
pub struct SurrealOperatorRepository<C: Connection> {
    db: Surreal<C>,
    /// Optional server-side pepper for password hashing.
    pepper: Option<String>,
}

impl<C: Connection> SurrealOperatorRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }
}

impl<C: Connection> OperatorRepository for SurrealOperatorRepository<C> {
    async fn create(&self, input: CreateOperator) -> StoreResult<Operator> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.is_empty() {
            return Err(StoreError::Validation {
                message: "operator needs an email and a password".into(),
            });
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        let result = self
            .db
            .query(
                "CREATE type::record('master_user', $id) SET \
                 email = $email, \
                 password_hash = $password_hash, \
                 role = $role, \
                 active = true, \
                 totp_secret = NONE, \
                 totp_enabled = false, \
                 allowed_ips = $allowed_ips, \
                 last_login_at = NONE, \
                 last_login_ip = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", email))
            .bind(("password_hash", password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("allowed_ips", input.allowed_ips))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<OperatorRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "operator".into(),
            id: id_str,
        })?;

        Ok(row.into_operator(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Operator> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('master_user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OperatorRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "operator".into(),
            id: id_str,
        })?;

        Ok(row.into_operator(id)?)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Operator> {
        let email = normalize_email(email);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM master_user \
                 WHERE email = $email",
            )
            .bind(("email", email.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OperatorRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "operator".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_operator()?)
    }

    async fn update(&self, id: Uuid, input: UpdateOperator) -> StoreResult<Operator> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.active.is_some() {
            sets.push("active = $active");
        }
        if input.totp_enabled.is_some() {
            sets.push("totp_enabled = $totp_enabled");
        }
        if input.totp_secret.is_some() {
            sets.push("totp_secret = $totp_secret");
        }
        if input.allowed_ips.is_some() {
            sets.push("allowed_ips = $allowed_ips");
        }
        if input.last_login_at.is_some() {
            sets.push("last_login_at = $last_login_at");
        }
        if input.last_login_ip.is_some() {
            sets.push("last_login_ip = $last_login_ip");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('master_user', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(active) = input.active {
            builder = builder.bind(("active", active));
        }
        if let Some(totp_enabled) = input.totp_enabled {
            builder = builder.bind(("totp_enabled", totp_enabled));
        }
        if let Some(totp_secret) = input.totp_secret {
            builder = builder.bind(("totp_secret", totp_secret));
        }
        if let Some(allowed_ips) = input.allowed_ips {
            builder = builder.bind(("allowed_ips", allowed_ips));
        }
        if let Some(last_login_at) = input.last_login_at {
            builder = builder.bind(("last_login_at", last_login_at));
        }
        if let Some(last_login_ip) = input.last_login_ip {
            builder = builder.bind(("last_login_ip", last_login_ip));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<OperatorRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "operator".into(),
            id: id_str,
        })?;

        Ok(row.into_operator(id)?)
    }

    async fn list(&self, pagination: Pagination) -> StoreResult<PaginatedResult<Operator>> {
        let total = self.count().await?;

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM master_user \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OperatorRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_operator())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn count(&self) -> StoreResult<u64> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM master_user GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
