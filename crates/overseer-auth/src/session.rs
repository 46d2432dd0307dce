//! Session manager: opaque bearer sessions with an absolute expiry.
//!
//! Only the SHA-256 of a token is stored. Sessions are never extended;
//! each login mints a fresh one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use overseer_core::error::StoreError;
use overseer_core::models::operator::Operator;
use overseer_core::models::session::{CreateSession, Session};
use overseer_core::repository::{OperatorRepository, SessionRepository};
use uuid::Uuid;

use crate::audit::RequestMeta;
use crate::clock::Clock;
use crate::error::AuthError;
use crate::store::bounded;
use crate::token;

/// A session as handed to the client. `token` is the only copy of the
/// raw bearer value.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionManager<O: OperatorRepository, S: SessionRepository> {
    operators: Arc<O>,
    sessions: Arc<S>,
    clock: Arc<dyn Clock>,
    lifetime: chrono::Duration,
    timeout: Duration,
}

impl<O: OperatorRepository, S: SessionRepository> SessionManager<O, S> {
    pub fn new(
        operators: Arc<O>,
        sessions: Arc<S>,
        clock: Arc<dyn Clock>,
        lifetime_secs: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            operators,
            sessions,
            clock,
            lifetime: chrono::Duration::seconds(lifetime_secs as i64),
            timeout,
        }
    }

    /// Mint a token and persist its session row in one write.
    pub async fn create_session(
        &self,
        operator_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<IssuedSession, AuthError> {
        let raw = token::generate_session_token();
        let now = self.clock.now();
        let expires_at = now + self.lifetime;

        let session = bounded(
            self.timeout,
            self.sessions.create(CreateSession {
                operator_id,
                token_hash: token::hash_session_token(&raw),
                ip_address: meta.ip_address.clone(),
                user_agent: meta.user_agent.clone(),
                created_at: now,
                expires_at,
            }),
        )
        .await?;

        Ok(IssuedSession {
            token: raw,
            session_id: session.id,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a bearer token to its still-active operator.
    ///
    /// Absent, expired and orphaned sessions all fail with
    /// [`AuthError::InvalidSession`]. An expired row is deleted on the
    /// way out.
    pub async fn resolve_session(&self, raw: &str) -> Result<(Operator, Session), AuthError> {
        let hash = token::hash_session_token(raw);
        let session = match bounded(self.timeout, self.sessions.get_by_token_hash(&hash)).await {
            Ok(session) => session,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::InvalidSession),
            Err(e) => return Err(e.into()),
        };

        if session.is_expired_at(self.clock.now()) {
            if let Err(e) = bounded(
                self.timeout,
                self.sessions.delete_for_operator(&hash, session.operator_id),
            )
            .await
            {
                tracing::warn!(session_id = %session.id, error = %e, "failed to drop expired session");
            }
            return Err(AuthError::InvalidSession);
        }

        let operator = match bounded(self.timeout, self.operators.get_by_id(session.operator_id)).await
        {
            Ok(op) => op,
            Err(StoreError::NotFound { .. }) => return Err(AuthError::InvalidSession),
            Err(e) => return Err(e.into()),
        };
        if !operator.active {
            return Err(AuthError::InvalidSession);
        }

        Ok((operator, session))
    }

    /// Delete the session behind `raw` if `operator_id` owns it. Returns
    /// whether a row went away; a second call is a harmless `false`.
    pub async fn revoke_session(&self, raw: &str, operator_id: Uuid) -> Result<bool, AuthError> {
        let hash = token::hash_session_token(raw);
        Ok(bounded(
            self.timeout,
            self.sessions.delete_for_operator(&hash, operator_id),
        )
        .await?)
    }

    /// Drop every session an operator holds.
    pub async fn revoke_all(&self, operator_id: Uuid) -> Result<u64, AuthError> {
        Ok(bounded(
            self.timeout,
            self.sessions.delete_operator_sessions(operator_id),
        )
        .await?)
    }

    /// Delete sessions whose expiry has passed. Returns how many went.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let removed = bounded(self.timeout, self.sessions.delete_expired(self.clock.now())).await?;
        if removed > 0 {
            tracing::info!(removed, "expired sessions swept");
        }
        Ok(removed)
    }
}
