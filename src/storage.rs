//! Storage subsystem
//!
//! This module provides the durable, versioned store of connection records.
//!
//! Components:
//! - `storage_trait`: the ConnectionStore trait defining a uniform API.
//! - `types`: record, filter and statistics types.
//! - `migrations`: the additive migration chain and its manager.
//! - `database_storage`: sqlx-based SQLite implementation.

pub mod database_storage;
pub mod migrations;
pub mod storage_trait;
pub mod types;

pub use database_storage::DatabaseStorage;
pub use migrations::{Migration, MigrationManager, MigrationStep, BUILTIN_MIGRATIONS};
pub use storage_trait::ConnectionStore;
pub use types::{ConnectionRecord, RecordFilter, StoreStats};
