//! Domain models for the Overseer control plane.

pub mod audit;
pub mod impersonation;
pub mod operator;
pub mod session;
pub mod tenant;
