//! SurrealDB backing store for the control plane.
//!
//! [`DbManager::open`] connects and migrates; the `repository` module
//! implements the `overseer-core` repository traits on top of the
//! returned client.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::hash_password;
pub use schema::run_migrations;
