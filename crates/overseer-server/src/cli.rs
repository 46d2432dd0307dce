//! Command-line and environment configuration for the server binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use overseer_auth::AuthConfig;
use overseer_db::DbConfig;

/// Overseer master panel: operator login, sessions, impersonation and
/// audit.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "OVERSEER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// SurrealDB WebSocket endpoint
    #[arg(long, env = "OVERSEER_DB_URL", default_value = "127.0.0.1:8000")]
    pub db_url: String,

    #[arg(long, env = "OVERSEER_DB_NAMESPACE", default_value = "overseer")]
    pub db_namespace: String,

    #[arg(long, env = "OVERSEER_DB_DATABASE", default_value = "main")]
    pub db_database: String,

    #[arg(long, env = "OVERSEER_DB_USER", default_value = "root")]
    pub db_user: String,

    #[arg(
        long,
        env = "OVERSEER_DB_PASSWORD",
        default_value = "root",
        hide_env_values = true
    )]
    pub db_password: String,

    /// PEM file holding the Ed25519 key that signs impersonation tokens
    #[arg(long, env = "OVERSEER_JWT_PRIVATE_KEY_FILE")]
    pub jwt_private_key_file: PathBuf,

    /// PEM file holding the matching Ed25519 public key
    #[arg(long, env = "OVERSEER_JWT_PUBLIC_KEY_FILE")]
    pub jwt_public_key_file: PathBuf,

    #[arg(long, env = "OVERSEER_JWT_ISSUER", default_value = "overseer")]
    pub jwt_issuer: String,

    /// Base64 of a 32-byte AES-256-GCM key sealing TOTP secrets at rest
    #[arg(long, env = "OVERSEER_MFA_KEY", hide_env_values = true)]
    pub mfa_key: Option<String>,

    /// Server-side pepper mixed into password hashes
    #[arg(long, env = "OVERSEER_PASSWORD_PEPPER", hide_env_values = true)]
    pub pepper: Option<String>,

    /// Take the client address from the first X-Forwarded-For hop
    #[arg(long, env = "OVERSEER_TRUSTED_PROXY")]
    pub trusted_proxy: bool,

    /// Seconds between expired-session sweeps
    #[arg(long, env = "OVERSEER_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Owner account created when no operator exists yet
    #[arg(
        long,
        env = "OVERSEER_BOOTSTRAP_EMAIL",
        requires = "bootstrap_password"
    )]
    pub bootstrap_email: Option<String>,

    #[arg(long, env = "OVERSEER_BOOTSTRAP_PASSWORD", hide_env_values = true)]
    pub bootstrap_password: Option<String>,
}

impl Args {
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_user.clone(),
            password: self.db_password.clone(),
        }
    }

    /// Read key files and decode secrets into an [`AuthConfig`].
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let mfa_encryption_key = self.mfa_key.as_deref().map(decode_mfa_key).transpose()?;
        if mfa_encryption_key.is_none() {
            tracing::warn!("OVERSEER_MFA_KEY not set; TOTP secrets will be stored unencrypted");
        }

        Ok(AuthConfig {
            jwt_private_key_pem: read_pem(&self.jwt_private_key_file)?,
            jwt_public_key_pem: read_pem(&self.jwt_public_key_file)?,
            jwt_issuer: self.jwt_issuer.clone(),
            pepper: self.pepper.clone(),
            mfa_encryption_key,
            ..AuthConfig::default()
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn decode_mfa_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("OVERSEER_MFA_KEY is not valid base64")?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow!("OVERSEER_MFA_KEY must decode to 32 bytes, got {len}"))
}
