//! Authentication and authorization error types.
//!
//! Every variant except the internal ones is a recoverable,
//! caller-facing failure with a stable status class. A pending second
//! factor is not an error; see [`crate::service::LoginOutcome`].

use overseer_core::error::StoreError;
use thiserror::Error;

/// HTTP-equivalent status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
}

impl StatusClass {
    pub fn http_status(&self) -> u16 {
        match self {
            StatusClass::BadRequest => 400,
            StatusClass::Unauthorized => 401,
            StatusClass::Forbidden => 403,
            StatusClass::NotFound => 404,
            StatusClass::Internal => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    #[error("invalid second factor code")]
    InvalidSecondFactor,

    #[error("source address is not allowed")]
    IpNotAllowed,

    #[error("invalid session")]
    InvalidSession,

    #[error("impersonation has ended")]
    ImpersonationEnded,

    #[error("tenant is suspended")]
    TenantSuspended,

    #[error("operator is inactive")]
    OperatorInactive,

    #[error("only the issuing operator may do this")]
    NotOwner,

    #[error("forbidden")]
    Forbidden,

    #[error("authentication required")]
    Unauthenticated,

    #[error("tenant context required")]
    TenantContextRequired,

    #[error("tenant not found")]
    TenantNotFound,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountInactive
            | AuthError::InvalidSecondFactor
            | AuthError::IpNotAllowed
            | AuthError::InvalidSession
            | AuthError::ImpersonationEnded
            | AuthError::TenantSuspended
            | AuthError::OperatorInactive
            | AuthError::Unauthenticated => StatusClass::Unauthorized,
            AuthError::NotOwner | AuthError::Forbidden | AuthError::TenantContextRequired => {
                StatusClass::Forbidden
            }
            AuthError::TenantNotFound | AuthError::NotFound(_) => StatusClass::NotFound,
            AuthError::Malformed(_) => StatusClass::BadRequest,
            AuthError::Store(StoreError::Validation { .. }) => StatusClass::BadRequest,
            AuthError::Store(StoreError::AlreadyExists { .. }) => StatusClass::BadRequest,
            AuthError::Crypto(_) | AuthError::Store(_) => StatusClass::Internal,
        }
    }

    /// Stable machine-readable code for API bodies and audit details.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountInactive => "account_inactive",
            AuthError::InvalidSecondFactor => "invalid_second_factor",
            AuthError::IpNotAllowed => "ip_not_allowed",
            AuthError::InvalidSession => "invalid_session",
            AuthError::ImpersonationEnded => "impersonation_ended",
            AuthError::TenantSuspended => "tenant_suspended",
            AuthError::OperatorInactive => "operator_inactive",
            AuthError::NotOwner => "not_owner",
            AuthError::Forbidden => "forbidden",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::TenantContextRequired => "tenant_context_required",
            AuthError::TenantNotFound => "tenant_not_found",
            AuthError::NotFound(_) => "not_found",
            AuthError::Malformed(_) => "malformed_request",
            AuthError::Store(StoreError::AlreadyExists { .. }) => "already_exists",
            AuthError::Store(StoreError::Validation { .. }) => "validation_failed",
            AuthError::Crypto(_) | AuthError::Store(_) => "internal_error",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_class() == StatusClass::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_401() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::InvalidSecondFactor,
            AuthError::IpNotAllowed,
            AuthError::InvalidSession,
            AuthError::ImpersonationEnded,
            AuthError::TenantSuspended,
            AuthError::OperatorInactive,
            AuthError::Unauthenticated,
        ] {
            assert_eq!(err.status_class().http_status(), 401, "{err}");
        }
    }

    #[test]
    fn authorization_failures_are_403() {
        for err in [
            AuthError::NotOwner,
            AuthError::Forbidden,
            AuthError::TenantContextRequired,
        ] {
            assert_eq!(err.status_class(), StatusClass::Forbidden, "{err}");
        }
    }

    #[test]
    fn store_faults_are_internal_and_opaque() {
        let err = AuthError::from(StoreError::Database("connection reset".into()));
        assert!(err.is_internal());
        assert_eq!(err.code(), "internal_error");

        let err = AuthError::from(StoreError::Timeout(5000));
        assert!(err.is_internal());
    }

    #[test]
    fn malformed_input_is_400() {
        assert_eq!(
            AuthError::Malformed("bad ip".into()).status_class(),
            StatusClass::BadRequest
        );
    }
}
