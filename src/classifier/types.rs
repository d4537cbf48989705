use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

use crate::capture::types::NewConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpnType {
    None,
    DnsLeakPrevention,
    PotentialVpnTunnel,
    ViaVpn,
}

impl VpnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpnType::None => "none",
            VpnType::DnsLeakPrevention => "dns_leak_prevention",
            VpnType::PotentialVpnTunnel => "potential_vpn_tunnel",
            VpnType::ViaVpn => "via_vpn",
        }
    }

    pub fn parse(s: &str) -> Option<VpnType> {
        match s {
            "none" => Some(VpnType::None),
            "dns_leak_prevention" => Some(VpnType::DnsLeakPrevention),
            "potential_vpn_tunnel" => Some(VpnType::PotentialVpnTunnel),
            "via_vpn" => Some(VpnType::ViaVpn),
            _ => None,
        }
    }
}

/// Cross-event state owned exclusively by the classifier.
///
/// Created at session start, mutated only on the single classification path,
/// discarded at session end. `vpn_detected` is a one-way transition within a
/// session and is never persisted.
#[derive(Debug, Default)]
pub struct ClassificationState {
    pub known_vpn_dns_servers: HashSet<IpAddr>,
    pub vpn_detected: bool,
}

/// A connection event augmented with its VPN classification.
///
/// `should_display` is a UI suppression hint only; classified connections
/// are persisted regardless of it. `threat_score` is carried for a separate
/// scoring collaborator and defaults to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedConnection {
    pub connection: NewConnection,
    pub is_vpn_related: bool,
    pub vpn_type: VpnType,
    pub should_display: bool,
    pub threat_score: f64,
}
