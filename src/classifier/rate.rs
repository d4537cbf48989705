use std::net::IpAddr;

/// Connection-rate predicate backing the tunnel-endpoint rule.
///
/// The rule fires only when the remote port matches a well-known tunnel port
/// AND this predicate reports that the connection rate toward the remote
/// address exceeded its threshold. No rate-tracking window is mandated by
/// the core; implementors supply one here if they want the rule live.
pub trait TunnelRateHeuristic: Send + Sync {
    fn exceeds_threshold(&mut self, remote_address: IpAddr) -> bool;
}

/// Default heuristic: no historical rate state, never triggers.
pub struct NeverTriggers;

impl TunnelRateHeuristic for NeverTriggers {
    fn exceeds_threshold(&mut self, _remote_address: IpAddr) -> bool {
        false
    }
}
