//! The capture pipeline.
//!
//! A single sequential loop drives poll -> dedup -> classify -> store at a
//! fixed interval; it is the only writer to classifier state and the only
//! inserter into the store. Each poll runs on the blocking pool under a
//! bounded timeout so a stuck OS query can never stall the pipeline - the
//! cycle is skipped and the next tick proceeds. Shutdown lets the in-flight
//! cycle complete before the loop exits; no new poll starts after the
//! signal.

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::capture::deduplicator::ConnectionDeduplicator;
use crate::capture::snapshot::SnapshotSource;
use crate::capture::types::{ConnectionEvent, SocketEntry};
use crate::classifier::traffic_classifier::TrafficClassifier;
use crate::configuration::config::Config;
use crate::error_handling::types::PipelineError;
use crate::storage::storage_trait::ConnectionStore;
use crate::storage::types::ConnectionRecord;

use super::emitter::EventEmitter;

pub struct CapturePipeline {
    source: Arc<dyn SnapshotSource>,
    deduplicator: ConnectionDeduplicator,
    classifier: TrafficClassifier,
    store: Arc<dyn ConnectionStore>,
    emitter: EventEmitter,
    poll_interval: Duration,
    poll_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl CapturePipeline {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn ConnectionStore>,
        config: &Config,
        emitter: EventEmitter,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            deduplicator: ConnectionDeduplicator::new(
                config.heartbeat_cycles,
                config.dashboard_port,
            ),
            classifier: TrafficClassifier::new(),
            store,
            emitter,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            shutdown_rx,
        }
    }

    /// Runs the pipeline until the shutdown signal fires.
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        info!(
            "capture pipeline started (poll every {:?})",
            self.poll_interval
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("capture pipeline shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// One poll cycle: snapshot, dedup, classify, persist, emit.
    pub async fn run_cycle(&mut self) {
        let entries = self.poll_snapshot().await;
        let events = self.deduplicator.process_snapshot(&entries, Utc::now());

        for event in events {
            match event {
                ConnectionEvent::New(connection) => {
                    let classified = self.classifier.classify(&connection);
                    self.emitter.emit_connection(&classified);

                    let record = ConnectionRecord::from_classified(&classified);
                    let store = Arc::clone(&self.store);
                    match tokio::task::spawn_blocking(move || store.insert(&record)).await {
                        Ok(Ok(id)) => debug!(
                            "stored connection {} -> {}:{} as record {}",
                            connection.local_address,
                            connection.remote_address,
                            connection.remote_port,
                            id
                        ),
                        Ok(Err(e)) => error!("failed to store connection record: {}", e),
                        Err(e) => error!("store task failed: {}", e),
                    }
                }
                ConnectionEvent::Heartbeat {
                    scan_count,
                    active_endpoints,
                } => {
                    self.emitter.emit_heartbeat(scan_count, active_endpoints);
                }
            }
        }
    }

    /// Polls the snapshot source with a bounded timeout. Any failure yields
    /// an empty snapshot: the cycle is skipped and the pipeline keeps going.
    async fn poll_snapshot(&self) -> Vec<SocketEntry> {
        let source = Arc::clone(&self.source);
        let poll = tokio::task::spawn_blocking(move || source.poll());

        match tokio::time::timeout(self.poll_timeout, poll).await {
            Ok(Ok(Ok(entries))) => entries,
            Ok(Ok(Err(e))) => {
                warn!("snapshot poll failed: {}", e);
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("snapshot task failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("snapshot poll timed out after {:?}", self.poll_timeout);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::Transport;
    use crate::classifier::types::VpnType;
    use crate::error_handling::types::{SnapshotError, StorageError};
    use crate::storage::types::{RecordFilter, StoreStats};
    use std::sync::Mutex;

    struct FixedSource {
        entries: Mutex<Vec<Vec<SocketEntry>>>,
    }

    impl FixedSource {
        fn new(snapshots: Vec<Vec<SocketEntry>>) -> Self {
            Self {
                entries: Mutex::new(snapshots),
            }
        }
    }

    impl SnapshotSource for FixedSource {
        fn poll(&self) -> Result<Vec<SocketEntry>, SnapshotError> {
            let mut snapshots = self.entries.lock().unwrap();
            if snapshots.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(snapshots.remove(0))
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<ConnectionRecord>>,
    }

    impl ConnectionStore for MemoryStore {
        fn insert(&self, record: &ConnectionRecord) -> Result<i64, StorageError> {
            let mut records = self.records.lock().unwrap();
            let mut stored = record.clone();
            let id = records.len() as i64 + 1;
            stored.id = Some(id);
            records.push(stored);
            Ok(id)
        }

        fn query(
            &self,
            _filter: Option<RecordFilter>,
            limit: u32,
        ) -> Result<Vec<ConnectionRecord>, StorageError> {
            let records = self.records.lock().unwrap();
            Ok(records.iter().rev().take(limit as usize).cloned().collect())
        }

        fn stats(&self) -> Result<StoreStats, StorageError> {
            let records = self.records.lock().unwrap();
            Ok(StoreStats {
                total_records: records.len() as i64,
                unique_destinations: 0,
                distinct_countries: 0,
                first_timestamp: None,
                last_timestamp: None,
            })
        }

        fn schema_version(&self) -> Result<i64, StorageError> {
            Ok(3)
        }
    }

    fn entry(local: &str, remote: &str, port: u16) -> SocketEntry {
        SocketEntry {
            local_address: local.parse().unwrap(),
            local_port: 40000,
            remote_address: remote.parse().unwrap(),
            remote_port: port,
            transport: Transport::Tcp,
            observed_process: None,
        }
    }

    fn pipeline(
        snapshots: Vec<Vec<SocketEntry>>,
        store: Arc<MemoryStore>,
    ) -> (CapturePipeline, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let pipeline = CapturePipeline::new(
            Arc::new(FixedSource::new(snapshots)),
            store,
            &Config::default(),
            EventEmitter::new(Box::new(std::io::sink())),
            rx,
        );
        (pipeline, tx)
    }

    #[tokio::test]
    async fn test_cycle_persists_new_connections_once() {
        let store = Arc::new(MemoryStore::default());
        let snapshot = vec![entry("10.0.2.15", "8.8.8.8", 443)];
        let (mut pipeline, _tx) =
            pipeline(vec![snapshot.clone(), snapshot.clone()], Arc::clone(&store));

        pipeline.run_cycle().await;
        pipeline.run_cycle().await;

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(1));
        assert_eq!(records[0].vpn_type, VpnType::None);
    }

    #[tokio::test]
    async fn test_classifier_state_carries_across_cycles() {
        let store = Arc::new(MemoryStore::default());
        let snapshots = vec![
            vec![entry("10.0.0.1", "10.0.0.1", 53)],
            vec![entry("10.0.2.15", "9.9.9.9", 8443)],
        ];
        let (mut pipeline, _tx) = pipeline(snapshots, Arc::clone(&store));

        pipeline.run_cycle().await;
        pipeline.run_cycle().await;

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].vpn_type, VpnType::DnsLeakPrevention);
        assert!(!records[0].should_display);
        assert_eq!(records[1].vpn_type, VpnType::ViaVpn);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::default());
        let (mut pipeline, tx) = pipeline(Vec::new(), store);

        let task = tokio::spawn(async move { pipeline.run().await });
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("pipeline did not stop after shutdown signal");
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_failing_source_skips_cycle() {
        struct FailingSource;
        impl SnapshotSource for FailingSource {
            fn poll(&self) -> Result<Vec<SocketEntry>, SnapshotError> {
                Err(SnapshotError::NoTablesReadable)
            }
        }

        let store = Arc::new(MemoryStore::default());
        let (_tx, rx) = watch::channel(false);
        let mut pipeline = CapturePipeline::new(
            Arc::new(FailingSource),
            Arc::clone(&store) as Arc<dyn ConnectionStore>,
            &Config::default(),
            EventEmitter::new(Box::new(std::io::sink())),
            rx,
        );

        pipeline.run_cycle().await;
        assert_eq!(store.records.lock().unwrap().len(), 0);
    }
}
