//! PostgreSQL confirmation store.
//!
//! Records live in one `confirmations` table: the columns used for lookups
//! (`key`, `type`, `status`, `creator_id`, `user_id`, `email`, `clinic_id`,
//! `team_id`, `created`) plus the full record as a JSONB document.
//!
//! ```ignore
//! use confirm_db_postgres::{PostgresConfig, PostgresStore};
//!
//! let store = PostgresStore::new(&PostgresConfig::new("postgres://localhost/confirm")).await?;
//! ```

mod config;
mod error;
mod pool;
mod store;

pub mod migrations;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use pool::create_pool;
pub use store::PostgresStore;
