//! Domain models, store errors, and the repository
//! traits that abstract the control plane's authoritative store.

pub mod error;
pub mod models;
pub mod repository;
