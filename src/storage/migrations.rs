//! Schema migrations and the migration manager.
//!
//! The schema evolves through a strictly additive, forward-only chain of
//! versioned migrations. The applied version lives in SQLite's
//! `PRAGMA user_version` (store-level metadata, not a row), so a fresh store
//! reports version 0 without any bootstrap step. Each migration runs inside
//! its own transaction together with the version bump: a failing script
//! leaves the store at its last successfully applied version and a later
//! retry resumes at the failed version.

use log::info;
use sqlx::{Pool, Sqlite};

use crate::error_handling::types::StorageError;

/// One step of a migration script.
///
/// `AddColumn` exists because SQLite's `ALTER TABLE ... ADD COLUMN` has no
/// `IF NOT EXISTS` form; the manager checks `pragma_table_info` first so
/// re-running an already applied chain stays a no-op.
#[derive(Debug, Clone, Copy)]
pub enum MigrationStep {
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub steps: &'static [MigrationStep],
}

/// The fixed migration chain of this core.
pub const BUILTIN_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "base connection table",
        steps: &[MigrationStep::Sql(
            "CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                local_address TEXT NOT NULL,
                remote_address TEXT NOT NULL,
                remote_port INTEGER NOT NULL,
                observed_process TEXT,
                is_vpn_related INTEGER NOT NULL DEFAULT 0,
                vpn_type TEXT NOT NULL DEFAULT 'none',
                should_display INTEGER NOT NULL DEFAULT 1,
                dst_country TEXT,
                dst_lat REAL,
                dst_lon REAL
            );",
        )],
    },
    Migration {
        version: 2,
        name: "threat and organization columns",
        steps: &[
            MigrationStep::AddColumn {
                table: "connections",
                column: "threat_score",
                definition: "REAL NOT NULL DEFAULT 0.0",
            },
            MigrationStep::AddColumn {
                table: "connections",
                column: "dst_org",
                definition: "TEXT",
            },
            MigrationStep::AddColumn {
                table: "connections",
                column: "dst_hostname",
                definition: "TEXT",
            },
        ],
    },
    Migration {
        version: 3,
        name: "device and protocol columns, lookup indexes",
        steps: &[
            MigrationStep::AddColumn {
                table: "connections",
                column: "src_mac",
                definition: "TEXT",
            },
            MigrationStep::AddColumn {
                table: "connections",
                column: "device_vendor",
                definition: "TEXT",
            },
            MigrationStep::AddColumn {
                table: "connections",
                column: "protocol",
                definition: "TEXT NOT NULL DEFAULT 'tcp'",
            },
            MigrationStep::Sql(
                "CREATE INDEX IF NOT EXISTS idx_connections_timestamp
                 ON connections(timestamp DESC);",
            ),
            MigrationStep::Sql(
                "CREATE INDEX IF NOT EXISTS idx_connections_src_mac
                 ON connections(src_mac);",
            ),
        ],
    },
];

/// Applies pending migrations against a store's pool, strictly in ascending
/// version order.
pub struct MigrationManager<'a> {
    pool: &'a Pool<Sqlite>,
}

impl<'a> MigrationManager<'a> {
    pub fn new(pool: &'a Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn current_version(&self) -> Result<i64, StorageError> {
        sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)
    }

    /// Applies every migration with `version > current_version()`.
    ///
    /// Idempotent: a second call with no new migrations is a no-op. On the
    /// first failing script the store keeps its last good version and the
    /// error names the version that failed.
    pub async fn apply_pending(&self, migrations: &[Migration]) -> Result<i64, StorageError> {
        let mut version = self.current_version().await?;

        for migration in migrations {
            if migration.version <= version {
                continue;
            }
            self.apply_one(migration)
                .await
                .map_err(|_| StorageError::MigrationFailed(migration.version))?;
            version = migration.version;
            info!(
                "applied schema migration v{}: {}",
                migration.version, migration.name
            );
        }

        Ok(version)
    }

    async fn apply_one(&self, migration: &Migration) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for step in migration.steps.iter().copied() {
            match step {
                MigrationStep::Sql(sql) => {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                MigrationStep::AddColumn {
                    table,
                    column,
                    definition,
                } => {
                    let exists: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?1",
                        table
                    ))
                    .bind(column)
                    .fetch_one(&mut *tx)
                    .await?;
                    if exists == 0 {
                        sqlx::query(&format!(
                            "ALTER TABLE {} ADD COLUMN {} {}",
                            table, column, definition
                        ))
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
        }

        // The version bump commits or rolls back with the script itself
        sqlx::query(&format!("PRAGMA user_version = {}", migration.version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
