//! Classification subsystem
//!
//! Stateful, heuristic VPN/tunnel classification of connection events.
//!
//! Components:
//! - `types`: classification output and the per-session state.
//! - `traffic_classifier`: the ordered rule evaluation.
//! - `rate`: the pluggable connection-rate predicate for tunnel detection.

pub mod rate;
pub mod traffic_classifier;
pub mod types;

pub use rate::{NeverTriggers, TunnelRateHeuristic};
pub use traffic_classifier::{TrafficClassifier, TUNNEL_PORTS};
pub use types::{ClassificationState, ClassifiedConnection, VpnType};
