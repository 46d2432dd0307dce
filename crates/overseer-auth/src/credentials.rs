//! Credential verifier: email + password against the operator store.

use std::sync::Arc;
use std::time::Duration;

use overseer_core::error::StoreError;
use overseer_core::models::operator::Operator;
use overseer_core::repository::OperatorRepository;

use crate::error::AuthError;
use crate::password;
use crate::store::bounded;

/// Why a credential check failed. Callers collapse every variant into
/// [`AuthError::InvalidCredentials`]; the distinction only feeds the
/// audit trail.
#[derive(Debug)]
pub enum Rejection {
    UnknownEmail,
    WrongPassword(Box<Operator>),
    Inactive(Box<Operator>),
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UnknownEmail => "unknown_email",
            Rejection::WrongPassword(_) => "invalid_password",
            Rejection::Inactive(_) => "account_inactive",
        }
    }

    /// The account the attempt targeted, if one exists.
    pub fn operator(&self) -> Option<&Operator> {
        match self {
            Rejection::UnknownEmail => None,
            Rejection::WrongPassword(op) | Rejection::Inactive(op) => Some(op),
        }
    }
}

pub struct CredentialVerifier<O: OperatorRepository> {
    operators: Arc<O>,
    pepper: Option<String>,
    timeout: Duration,
}

impl<O: OperatorRepository> CredentialVerifier<O> {
    pub fn new(operators: Arc<O>, pepper: Option<String>, timeout: Duration) -> Self {
        Self {
            operators,
            pepper,
            timeout,
        }
    }

    /// Check `password` for the operator registered under `email`.
    ///
    /// The outer `Result` carries store and hash faults only. An unknown
    /// email still pays for one Argon2 verification, and the password is
    /// checked before the active flag, so the response shape and cost
    /// never reveal whether an account exists.
    pub async fn verify(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Result<Operator, Rejection>, AuthError> {
        let pepper = self.pepper.as_deref();

        let operator = match bounded(self.timeout, self.operators.get_by_email(email)).await {
            Ok(op) => op,
            Err(StoreError::NotFound { .. }) => {
                password::verify_decoy(password, pepper);
                return Ok(Err(Rejection::UnknownEmail));
            }
            Err(e) => return Err(e.into()),
        };

        if !password::verify_password(password, &operator.password_hash, pepper)? {
            return Ok(Err(Rejection::WrongPassword(Box::new(operator))));
        }
        if !operator.active {
            return Ok(Err(Rejection::Inactive(Box::new(operator))));
        }
        Ok(Ok(operator))
    }
}
