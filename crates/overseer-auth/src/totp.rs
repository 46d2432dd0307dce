//! TOTP enrollment and verification, plus AES-256-GCM sealing of the
//! stored secret.
//!
//! Codes are RFC 6238 SHA-1, 6 digits, 30-second steps. Verification
//! accepts the current step and up to `skew` steps on either side.
//! Submitted codes are never stored or logged.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;

/// Encrypt a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Decrypt an AES-256-GCM encrypted TOTP secret.
pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() < 13 {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

/// Prepare a base32 secret for storage: encrypted when a key is
/// configured, verbatim otherwise.
pub fn seal_secret(key: Option<&[u8; 32]>, base32: &str) -> Result<String, AuthError> {
    match key {
        Some(key) => encrypt_secret(key, base32.as_bytes()),
        None => Ok(base32.to_string()),
    }
}

/// Recover the raw secret bytes from their stored form.
pub fn open_secret(key: Option<&[u8; 32]>, stored: &str) -> Result<Vec<u8>, AuthError> {
    let base32 = match key {
        Some(key) => String::from_utf8(decrypt_secret(key, stored)?)
            .map_err(|e| AuthError::Crypto(format!("secret utf-8: {e}")))?,
        None => stored.to_string(),
    };
    Secret::Encoded(base32)
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e:?}")))
}

fn build(
    secret_bytes: Vec<u8>,
    skew: u8,
    issuer: &str,
    account: &str,
) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1, // RFC 6238 default
        DIGITS,
        skew,
        STEP_SECS,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// A freshly generated, not yet confirmed TOTP secret.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI for QR provisioning.
    pub provisioning_uri: String,
}

/// Generate a TOTP enrollment: secret + otpauth URI.
pub fn generate_enrollment(issuer: &str, account: &str) -> Result<Enrollment, AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e:?}")))?;

    let totp = build(secret_bytes, 0, issuer, account)?;

    Ok(Enrollment {
        secret: secret.to_encoded().to_string(),
        provisioning_uri: totp.get_url(),
    })
}

/// Verify a 6-digit code against raw secret bytes at `unix_time`.
///
/// Anything that is not exactly six ASCII digits is rejected without
/// touching the secret.
pub fn verify_code(
    secret_bytes: &[u8],
    code: &str,
    skew: u8,
    unix_time: u64,
) -> Result<bool, AuthError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let totp = build(secret_bytes.to_vec(), skew, "Overseer", "operator")?;
    Ok(totp.check(code, unix_time))
}
