//! Traffic classifier.
//!
//! Attaches a best-effort VPN/tunnel classification to each NEW connection
//! event, using only information available up to that event. Rules are
//! evaluated in a fixed priority order and the first match wins.
//! Classification never errors: anything it cannot interpret falls through
//! to the non-private default rather than aborting the event.

use log::{debug, info};
use std::net::IpAddr;

use crate::capture::types::NewConnection;

use super::rate::{NeverTriggers, TunnelRateHeuristic};
use super::types::{ClassificationState, ClassifiedConnection, VpnType};

/// Well-known VPN/tunnel remote ports: OpenVPN (1194-1197), WireGuard
/// (51820), IKE/IPsec NAT-T (500, 4500) and the TLS/HTTP fallbacks many
/// providers hide behind (443, 80).
pub const TUNNEL_PORTS: &[u16] = &[1194, 1195, 1196, 1197, 51820, 500, 4500, 443, 80];

pub struct TrafficClassifier {
    state: ClassificationState,
    rate_heuristic: Box<dyn TunnelRateHeuristic>,
}

impl TrafficClassifier {
    pub fn new() -> Self {
        Self::with_rate_heuristic(Box::new(NeverTriggers))
    }

    pub fn with_rate_heuristic(rate_heuristic: Box<dyn TunnelRateHeuristic>) -> Self {
        Self {
            state: ClassificationState::default(),
            rate_heuristic,
        }
    }

    /// Classifies one NEW connection, updating session state along the way.
    ///
    /// Exactly one `ClassifiedConnection` is produced per input event;
    /// `threat_score` stays at its default until an external scorer assigns
    /// it.
    pub fn classify(&mut self, connection: &NewConnection) -> ClassifiedConnection {
        let (vpn_type, should_display) = self.evaluate(connection);
        ClassifiedConnection {
            connection: connection.clone(),
            is_vpn_related: vpn_type != VpnType::None,
            vpn_type,
            should_display,
            threat_score: 0.0,
        }
    }

    pub fn vpn_detected(&self) -> bool {
        self.state.vpn_detected
    }

    pub fn known_vpn_dns_servers(&self) -> &std::collections::HashSet<IpAddr> {
        &self.state.known_vpn_dns_servers
    }

    fn evaluate(&mut self, connection: &NewConnection) -> (VpnType, bool) {
        // Rule 1: DNS leak prevention - a resolver answering on the host's
        // own private address marks VPN onset for the rest of the session.
        if connection.local_address == connection.remote_address
            && connection.remote_port == 53
            && is_private_address(connection.remote_address)
        {
            self.state
                .known_vpn_dns_servers
                .insert(connection.remote_address);
            if !self.state.vpn_detected {
                info!(
                    "VPN DNS leak prevention detected via {}",
                    connection.remote_address
                );
                self.state.vpn_detected = true;
            }
            return (VpnType::DnsLeakPrevention, false);
        }

        // Rule 2: potential tunnel endpoint on a well-known port
        if TUNNEL_PORTS.contains(&connection.remote_port)
            && self
                .rate_heuristic
                .exceeds_threshold(connection.remote_address)
        {
            debug!(
                "potential tunnel endpoint {}:{}",
                connection.remote_address, connection.remote_port
            );
            return (VpnType::PotentialVpnTunnel, true);
        }

        // Rule 3: external traffic after VPN onset is VPN-masked
        if self.state.vpn_detected && !is_private_address(connection.remote_address) {
            return (VpnType::ViaVpn, true);
        }

        (VpnType::None, true)
    }
}

impl Default for TrafficClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Private-range check: 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16 and
/// loopback. Anything else, including all non-loopback IPv6, is treated as
/// not private.
fn is_private_address(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}
