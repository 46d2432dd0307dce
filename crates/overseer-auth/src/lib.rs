//! Operator authentication, sessions, impersonation,
//! role gate and audit trail for the master panel.

pub mod audit;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod impersonation;
pub mod ip;
pub mod password;
pub mod service;
pub mod session;
mod store;
pub mod token;
pub mod totp;

pub use audit::{AuditEvent, AuditLogger, RequestMeta};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{AuthError, StatusClass};
pub use gate::{ImpersonationContext, Principal, PrincipalKind, RoutePolicy, authorize};
pub use impersonation::{ImpersonationBroker, StartedImpersonation, StoppedImpersonation};
pub use service::{ControlPlane, LoginOutcome, LoginRequest, LoginSuccess};
pub use session::{IssuedSession, SessionManager};
pub use totp::Enrollment;
