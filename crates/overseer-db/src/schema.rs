//! Versioned DDL for the control-plane tables.
//!
//! Every table is SCHEMAFULL. Ids and enum values are stored as strings;
//! enum fields carry an `ASSERT ... IN [...]` guard.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "control_plane_schema",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Operators (master panel users, never hard-deleted)
-- =======================================================================
DEFINE TABLE master_user SCHEMAFULL;
DEFINE FIELD email ON TABLE master_user TYPE string;
DEFINE FIELD password_hash ON TABLE master_user TYPE string;
DEFINE FIELD role ON TABLE master_user TYPE string \
    ASSERT $value IN ['Owner', 'Support'];
DEFINE FIELD active ON TABLE master_user TYPE bool DEFAULT true;
DEFINE FIELD totp_secret ON TABLE master_user TYPE option<string>;
DEFINE FIELD totp_enabled ON TABLE master_user TYPE bool DEFAULT false;
DEFINE FIELD allowed_ips ON TABLE master_user TYPE array<string> \
    DEFAULT [];
DEFINE FIELD last_login_at ON TABLE master_user TYPE option<datetime>;
DEFINE FIELD last_login_ip ON TABLE master_user TYPE option<string>;
DEFINE FIELD created_at ON TABLE master_user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE master_user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_master_user_email ON TABLE master_user \
    COLUMNS email UNIQUE;

-- =======================================================================
-- Operator sessions
-- =======================================================================
DEFINE TABLE master_session SCHEMAFULL;
DEFINE FIELD operator_id ON TABLE master_session TYPE string;
DEFINE FIELD token_hash ON TABLE master_session TYPE string;
DEFINE FIELD ip_address ON TABLE master_session TYPE option<string>;
DEFINE FIELD user_agent ON TABLE master_session TYPE option<string>;
DEFINE FIELD expires_at ON TABLE master_session TYPE datetime;
DEFINE FIELD created_at ON TABLE master_session TYPE datetime;
DEFINE INDEX idx_master_session_token ON TABLE master_session \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_master_session_operator ON TABLE master_session \
    COLUMNS operator_id;
DEFINE INDEX idx_master_session_expiry ON TABLE master_session \
    COLUMNS expires_at;

-- =======================================================================
-- Tenants (owned by the customer side; read + status flips here)
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['Active', 'Trial', 'Suspended'];
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;

-- =======================================================================
-- Impersonations (retained for audit, ended_at set at most once)
-- =======================================================================
DEFINE TABLE impersonation SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update FULL
        FOR delete NONE;
DEFINE FIELD operator_id ON TABLE impersonation TYPE string;
DEFINE FIELD tenant_id ON TABLE impersonation TYPE string;
DEFINE FIELD target_user_id ON TABLE impersonation \
    TYPE option<string>;
DEFINE FIELD started_at ON TABLE impersonation TYPE datetime;
DEFINE FIELD ended_at ON TABLE impersonation TYPE option<datetime>;
DEFINE FIELD ip_address ON TABLE impersonation TYPE option<string>;
DEFINE FIELD user_agent ON TABLE impersonation TYPE option<string>;
DEFINE INDEX idx_impersonation_operator ON TABLE impersonation \
    COLUMNS operator_id;
DEFINE INDEX idx_impersonation_tenant ON TABLE impersonation \
    COLUMNS tenant_id;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE string;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE string;
DEFINE FIELD entity_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD details ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD ip_address ON TABLE audit_log TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime;
DEFINE INDEX idx_audit_time ON TABLE audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_actor ON TABLE audit_log COLUMNS actor_id;
DEFINE INDEX idx_audit_tenant ON TABLE audit_log COLUMNS tenant_id;
";

/// Bring the store up to the newest schema version.
///
/// Safe to call on every start: the `_migration` ledger records which
/// versions were applied and those are skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("ledger setup: {e}")))?;

    let applied = latest_applied(db).await?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    for step in pending {
        apply(db, step).await?;
    }
    Ok(())
}

async fn latest_applied<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let rows: Vec<AppliedVersion> = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?
        .take(0)?;
    Ok(rows.into_iter().map(|r| r.version).max().unwrap_or_default())
}

async fn apply<C: Connection>(db: &Surreal<C>, step: &Migration) -> Result<(), DbError> {
    info!(version = step.version, name = step.name, "applying schema migration");

    db.query(step.sql)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("v{} ({}): {e}", step.version, step.name)))?;

    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", step.version))
        .bind(("name", step.name))
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("recording v{}: {e}", step.version)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "versions must ascend"
            );
        }
    }

    #[test]
    fn audit_table_rejects_mutation() {
        let audit = SCHEMA_V1
            .split("DEFINE TABLE audit_log")
            .nth(1)
            .expect("audit_log table defined");
        assert!(audit.contains("FOR update NONE"));
        assert!(audit.contains("FOR delete NONE"));
    }
}
