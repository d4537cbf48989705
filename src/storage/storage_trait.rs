use crate::error_handling::types::StorageError;
use crate::storage::types::{ConnectionRecord, RecordFilter, StoreStats};

/// Durable, versioned storage of connection records.
///
/// A single pipeline thread is the only writer; concurrent readers see
/// either a full row or none of it. Ids are assigned by the store,
/// monotonically increasing and never reused.
pub trait ConnectionStore: Send + Sync {
    /// Appends a record and returns the assigned id.
    fn insert(&self, record: &ConnectionRecord) -> Result<i64, StorageError>;

    /// Read-only projection, most recent first.
    fn query(
        &self,
        filter: Option<RecordFilter>,
        limit: u32,
    ) -> Result<Vec<ConnectionRecord>, StorageError>;

    /// The `limit` most recent records.
    fn recent(&self, limit: u32) -> Result<Vec<ConnectionRecord>, StorageError> {
        self.query(None, limit)
    }

    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Currently applied schema version; 0 on a fresh store.
    fn schema_version(&self) -> Result<i64, StorageError>;
}
