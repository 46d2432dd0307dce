//! Authentication configuration.

use std::time::Duration;

/// Configuration for the control plane's authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for impersonation token signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for impersonation token verification.
    pub jwt_public_key_pem: String,
    /// Token issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Operator session lifetime in seconds (default: 28_800 = 8 hours).
    pub session_lifetime_secs: u64,
    /// Impersonation token lifetime in seconds (default: 3_600 = 1 hour).
    pub impersonation_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id verification.
    pub pepper: Option<String>,
    /// Minimum accepted length for provisioned operator passwords.
    pub min_password_length: usize,
    /// 256-bit AES-GCM key for encrypting TOTP secrets at rest.
    /// `None` stores the base32 secret as-is.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Accepted TOTP steps before/after the current one (default: 2).
    pub totp_skew_steps: u8,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "overseer".into(),
            session_lifetime_secs: 28_800,
            impersonation_lifetime_secs: 3_600,
            pepper: None,
            min_password_length: 12,
            mfa_encryption_key: None,
            totp_issuer: "Overseer".into(),
            totp_skew_steps: 2,
            store_timeout: Duration::from_secs(5),
        }
    }
}
