use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::capture::types::Transport;
use crate::classifier::types::{ClassifiedConnection, VpnType};

/// The persisted connection row.
///
/// The store exclusively owns row identity (`id`) and physical layout; the
/// enrichment columns (`dst_*`, `src_mac`, `device_vendor`) are populated by
/// external collaborators and stay `None` on the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub local_address: IpAddr,
    pub remote_address: IpAddr,
    pub remote_port: u16,
    pub transport: Transport,
    pub observed_process: Option<String>,
    pub is_vpn_related: bool,
    pub vpn_type: VpnType,
    pub should_display: bool,
    pub threat_score: f64,
    pub dst_country: Option<String>,
    pub dst_lat: Option<f64>,
    pub dst_lon: Option<f64>,
    pub dst_org: Option<String>,
    pub dst_hostname: Option<String>,
    pub src_mac: Option<String>,
    pub device_vendor: Option<String>,
}

impl ConnectionRecord {
    /// Builds an unenriched record from classifier output; `id` is assigned
    /// by the store on insert.
    pub fn from_classified(classified: &ClassifiedConnection) -> Self {
        Self {
            id: None,
            timestamp: classified.connection.timestamp,
            local_address: classified.connection.local_address,
            remote_address: classified.connection.remote_address,
            remote_port: classified.connection.remote_port,
            transport: classified.connection.transport,
            observed_process: classified.connection.observed_process.clone(),
            is_vpn_related: classified.is_vpn_related,
            vpn_type: classified.vpn_type,
            should_display: classified.should_display,
            threat_score: classified.threat_score,
            dst_country: None,
            dst_lat: None,
            dst_lon: None,
            dst_org: None,
            dst_hostname: None,
            src_mac: None,
            device_vendor: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub remote_address: Option<IpAddr>,
    pub vpn_type: Option<VpnType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Aggregate statistics exposed on the read-only query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub unique_destinations: i64,
    pub distinct_countries: i64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}
