//! SurrealDB repository implementations.

mod audit;
mod impersonation;
mod operator;
mod session;
mod tenant;

pub use audit::SurrealAuditLogRepository;
pub use impersonation::SurrealImpersonationRepository;
pub use operator::{SurrealOperatorRepository, hash_password};
pub use session::SurrealSessionRepository;
pub use tenant::SurrealTenantRepository;
