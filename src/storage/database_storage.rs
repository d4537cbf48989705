use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::capture::types::Transport;
use crate::classifier::types::VpnType;
use crate::error_handling::types::StorageError;
use crate::storage::migrations::{Migration, MigrationManager, BUILTIN_MIGRATIONS};
use crate::storage::storage_trait::ConnectionStore;
use crate::storage::types::{ConnectionRecord, RecordFilter, StoreStats};

// Internal row mapping for connections to avoid manual try_get
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    timestamp: String,
    local_address: String,
    remote_address: String,
    remote_port: i64,
    observed_process: Option<String>,
    is_vpn_related: i64,
    vpn_type: String,
    should_display: i64,
    threat_score: f64,
    dst_country: Option<String>,
    dst_lat: Option<f64>,
    dst_lon: Option<f64>,
    dst_org: Option<String>,
    dst_hostname: Option<String>,
    src_mac: Option<String>,
    device_vendor: Option<String>,
    protocol: String,
}

impl RecordRow {
    fn into_record(self) -> Result<ConnectionRecord, StorageError> {
        Ok(ConnectionRecord {
            id: Some(self.id),
            timestamp: parse_timestamp(&self.timestamp)?,
            local_address: parse_address(&self.local_address)?,
            remote_address: parse_address(&self.remote_address)?,
            remote_port: self.remote_port as u16,
            transport: Transport::parse(&self.protocol).ok_or(StorageError::ReadFailed)?,
            observed_process: self.observed_process,
            is_vpn_related: self.is_vpn_related != 0,
            vpn_type: VpnType::parse(&self.vpn_type).ok_or(StorageError::ReadFailed)?,
            should_display: self.should_display != 0,
            threat_score: self.threat_score,
            dst_country: self.dst_country,
            dst_lat: self.dst_lat,
            dst_lon: self.dst_lon,
            dst_org: self.dst_org,
            dst_hostname: self.dst_hostname,
            src_mac: self.src_mac,
            device_vendor: self.device_vendor,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_records: i64,
    unique_destinations: i64,
    distinct_countries: i64,
    first_timestamp: Option<String>,
    last_timestamp: Option<String>,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StorageError::ReadFailed)
}

fn parse_address(s: &str) -> Result<IpAddr, StorageError> {
    s.parse().map_err(|_| StorageError::ReadFailed)
}

const RECORD_COLUMNS: &str = "id, timestamp, local_address, remote_address, remote_port, \
     observed_process, is_vpn_related, vpn_type, should_display, threat_score, \
     dst_country, dst_lat, dst_lon, dst_org, dst_hostname, src_mac, device_vendor, protocol";

/// SQLite-backed connection store.
///
/// Exposes the synchronous [`ConnectionStore`] surface over an internal
/// current-thread runtime; callers inside an async context go through
/// `spawn_blocking`.
pub struct DatabaseStorage {
    rt: tokio::runtime::Runtime,
    pool: Pool<Sqlite>,
}

impl DatabaseStorage {
    /// Default database filename used in the application's working directory
    const DEFAULT_DB_FILE: &'static str = "vigie.sqlite3";

    /// Create or open the database in the current working directory with the
    /// default filename, applying pending builtin migrations.
    pub fn new() -> Result<Self, StorageError> {
        let cwd = env::current_dir().map_err(|_| StorageError::ConnectionFailed)?;
        let path = cwd.join(Self::DEFAULT_DB_FILE);
        Self::new_file(path)
    }

    /// Open at `path` and bring the schema up to date. Migration failures
    /// are fatal here: the store refuses to hand out a handle that would
    /// write into a half-migrated schema.
    pub fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let storage = Self::open(path)?;
        storage.apply_pending_migrations(BUILTIN_MIGRATIONS)?;
        Ok(storage)
    }

    /// Open at `path` without touching the schema. Used by tests and by
    /// tooling that drives migrations explicitly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|_| StorageError::ConnectionFailed)?;
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|_| StorageError::WriteFailed)?;
        }
        let pool = rt.block_on(async {
            let opts = SqliteConnectOptions::new()
                .filename(path_ref)
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(opts)
                .await
                .map_err(|_| StorageError::ConnectionFailed)
        })?;
        Ok(Self { rt, pool })
    }

    /// Applies each migration with a version above the current one, in
    /// ascending order. Safe to call on every startup.
    pub fn apply_pending_migrations(
        &self,
        migrations: &[Migration],
    ) -> Result<i64, StorageError> {
        self.rt
            .block_on(MigrationManager::new(&self.pool).apply_pending(migrations))
    }
}

impl ConnectionStore for DatabaseStorage {
    fn insert(&self, record: &ConnectionRecord) -> Result<i64, StorageError> {
        self.rt.block_on(async {
            let result = sqlx::query(
                "INSERT INTO connections (timestamp, local_address, remote_address, remote_port, \
                 observed_process, is_vpn_related, vpn_type, should_display, threat_score, \
                 dst_country, dst_lat, dst_lon, dst_org, dst_hostname, src_mac, device_vendor, \
                 protocol) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )
            .bind(record.timestamp.to_rfc3339())
            .bind(record.local_address.to_string())
            .bind(record.remote_address.to_string())
            .bind(record.remote_port as i64)
            .bind(record.observed_process.clone())
            .bind(record.is_vpn_related as i64)
            .bind(record.vpn_type.as_str())
            .bind(record.should_display as i64)
            .bind(record.threat_score)
            .bind(record.dst_country.clone())
            .bind(record.dst_lat)
            .bind(record.dst_lon)
            .bind(record.dst_org.clone())
            .bind(record.dst_hostname.clone())
            .bind(record.src_mac.clone())
            .bind(record.device_vendor.clone())
            .bind(record.transport.as_str())
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(result.last_insert_rowid())
        })
    }

    fn query(
        &self,
        filter: Option<RecordFilter>,
        limit: u32,
    ) -> Result<Vec<ConnectionRecord>, StorageError> {
        self.rt.block_on(async {
            let mut sql = format!("SELECT {} FROM connections", RECORD_COLUMNS);
            let mut clauses: Vec<String> = Vec::new();
            let mut binds: Vec<String> = Vec::new();
            if let Some(f) = &filter {
                if let Some(addr) = f.remote_address {
                    clauses.push("remote_address = ?".into());
                    binds.push(addr.to_string());
                }
                if let Some(vpn_type) = f.vpn_type {
                    clauses.push("vpn_type = ?".into());
                    binds.push(vpn_type.as_str().into());
                }
                if let Some(since) = f.since {
                    clauses.push("timestamp >= ?".into());
                    binds.push(since.to_rfc3339());
                }
                if let Some(until) = f.until {
                    clauses.push("timestamp <= ?".into());
                    binds.push(until.to_rfc3339());
                }
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");

            let mut q = sqlx::query_as::<_, RecordRow>(&sql);
            for b in &binds {
                q = q.bind(b);
            }
            q = q.bind(limit as i64);
            let rows: Vec<RecordRow> = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(row.into_record()?);
            }
            Ok(out)
        })
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        self.rt.block_on(async {
            let row: StatsRow = sqlx::query_as(
                "SELECT COUNT(*) AS total_records, \
                 COUNT(DISTINCT remote_address || ':' || remote_port) AS unique_destinations, \
                 COUNT(DISTINCT dst_country) AS distinct_countries, \
                 MIN(timestamp) AS first_timestamp, \
                 MAX(timestamp) AS last_timestamp \
                 FROM connections",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)?;
            Ok(StoreStats {
                total_records: row.total_records,
                unique_destinations: row.unique_destinations,
                distinct_countries: row.distinct_countries,
                first_timestamp: row.first_timestamp.as_deref().map(parse_timestamp).transpose()?,
                last_timestamp: row.last_timestamp.as_deref().map(parse_timestamp).transpose()?,
            })
        })
    }

    fn schema_version(&self) -> Result<i64, StorageError> {
        self.rt
            .block_on(MigrationManager::new(&self.pool).current_version())
    }
}
