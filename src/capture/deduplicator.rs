//! Connection deduplicator.
//!
//! Turns the repeating snapshot of OS connection state into a stream of
//! discrete NEW events: one per remote endpoint the first time it appears,
//! repeats suppressed while the endpoint stays present. Every Nth cycle a
//! heartbeat carrying the active endpoint count is appended so consumers can
//! detect liveness during quiet periods.

use chrono::{DateTime, Utc};
use log::trace;
use std::collections::HashSet;

use super::types::{ConnectionEvent, EndpointKey, NewConnection, SocketEntry};

pub struct ConnectionDeduplicator {
    /// Endpoints seen in the previous cycle; replaced (not merged) each
    /// cycle so an endpoint that disappears and reappears is NEW again.
    previous_endpoints: HashSet<EndpointKey>,
    cycle: u64,
    heartbeat_cycles: u64,
    /// The dashboard's own listening port; its traffic is never captured.
    dashboard_port: u16,
}

impl ConnectionDeduplicator {
    pub fn new(heartbeat_cycles: u64, dashboard_port: u16) -> Self {
        Self {
            previous_endpoints: HashSet::new(),
            cycle: 0,
            heartbeat_cycles,
            dashboard_port,
        }
    }

    /// Processes one poll cycle and returns the events it produced.
    ///
    /// NEW events come first in snapshot order; if this is a heartbeat
    /// cycle, the heartbeat is appended last.
    pub fn process_snapshot(
        &mut self,
        entries: &[SocketEntry],
        now: DateTime<Utc>,
    ) -> Vec<ConnectionEvent> {
        self.cycle += 1;

        let mut current_endpoints = HashSet::new();
        let mut events = Vec::new();

        for entry in entries {
            if self.is_excluded(entry) {
                continue;
            }
            let key = entry.endpoint_key();
            let seen_last_cycle = self.previous_endpoints.contains(&key);
            let first_in_cycle = current_endpoints.insert(key);
            if seen_last_cycle || !first_in_cycle {
                continue;
            }
            trace!("new endpoint {}", key);
            events.push(ConnectionEvent::New(NewConnection {
                local_address: entry.local_address,
                remote_address: entry.remote_address,
                remote_port: entry.remote_port,
                transport: entry.transport,
                observed_process: entry.observed_process.clone(),
                timestamp: now,
            }));
        }

        if self.cycle % self.heartbeat_cycles == 0 {
            events.push(ConnectionEvent::Heartbeat {
                scan_count: self.cycle,
                active_endpoints: current_endpoints.len(),
            });
        }

        self.previous_endpoints = current_endpoints;
        events
    }

    fn is_excluded(&self, entry: &SocketEntry) -> bool {
        entry.remote_address.is_loopback()
            || entry.remote_port == self.dashboard_port
            || entry.local_port == self.dashboard_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::Transport;
    use std::net::IpAddr;

    fn entry(remote: &str, port: u16) -> SocketEntry {
        SocketEntry {
            local_address: "10.0.2.15".parse().unwrap(),
            local_port: 40000,
            remote_address: remote.parse::<IpAddr>().unwrap(),
            remote_port: port,
            transport: Transport::Tcp,
            observed_process: None,
        }
    }

    fn new_count(events: &[ConnectionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::New(_)))
            .count()
    }

    #[test]
    fn test_new_emitted_once_while_present() {
        let mut dedup = ConnectionDeduplicator::new(10, 8080);
        let snapshot = vec![entry("1.2.3.4", 443)];

        let first = dedup.process_snapshot(&snapshot, Utc::now());
        assert_eq!(new_count(&first), 1);

        for _ in 0..5 {
            let repeat = dedup.process_snapshot(&snapshot, Utc::now());
            assert_eq!(new_count(&repeat), 0);
        }
    }

    #[test]
    fn test_reappearing_endpoint_is_new_again() {
        let mut dedup = ConnectionDeduplicator::new(100, 8080);
        let snapshot = vec![entry("1.2.3.4", 443)];

        assert_eq!(new_count(&dedup.process_snapshot(&snapshot, Utc::now())), 1);
        // Gone for one cycle
        assert_eq!(new_count(&dedup.process_snapshot(&[], Utc::now())), 0);
        // Back: NEW again
        assert_eq!(new_count(&dedup.process_snapshot(&snapshot, Utc::now())), 1);
    }

    #[test]
    fn test_duplicate_keys_within_one_cycle() {
        let mut dedup = ConnectionDeduplicator::new(100, 8080);
        let snapshot = vec![entry("1.2.3.4", 443), entry("1.2.3.4", 443)];
        assert_eq!(new_count(&dedup.process_snapshot(&snapshot, Utc::now())), 1);
    }

    #[test]
    fn test_loopback_and_dashboard_port_excluded() {
        let mut dedup = ConnectionDeduplicator::new(1, 8080);
        let mut own_dashboard = entry("192.168.1.20", 55555);
        own_dashboard.local_port = 8080;
        let snapshot = vec![
            entry("127.0.0.1", 443),
            entry("::1", 443),
            entry("1.2.3.4", 8080),
            own_dashboard,
        ];

        let events = dedup.process_snapshot(&snapshot, Utc::now());
        assert_eq!(new_count(&events), 0);
        // The heartbeat never counts excluded endpoints either
        match events.last() {
            Some(ConnectionEvent::Heartbeat {
                active_endpoints, ..
            }) => assert_eq!(*active_endpoints, 0),
            other => panic!("expected heartbeat, got {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_every_tenth_cycle() {
        let mut dedup = ConnectionDeduplicator::new(10, 8080);
        for cycle in 1..=30u64 {
            let events = dedup.process_snapshot(&[entry("1.2.3.4", 443)], Utc::now());
            let heartbeats: Vec<_> = events
                .iter()
                .filter(|e| matches!(e, ConnectionEvent::Heartbeat { .. }))
                .collect();
            if cycle % 10 == 0 {
                assert_eq!(heartbeats.len(), 1, "cycle {}", cycle);
                if let ConnectionEvent::Heartbeat { scan_count, .. } = heartbeats[0] {
                    assert_eq!(*scan_count, cycle);
                }
            } else {
                assert!(heartbeats.is_empty(), "cycle {}", cycle);
            }
        }
    }

    #[test]
    fn test_heartbeat_active_count() {
        let mut dedup = ConnectionDeduplicator::new(1, 8080);
        let snapshot = vec![entry("1.2.3.4", 443), entry("5.6.7.8", 80)];
        // Second cycle: both endpoints suppressed but still counted as active
        dedup.process_snapshot(&snapshot, Utc::now());
        let events = dedup.process_snapshot(&snapshot, Utc::now());
        match events.last() {
            Some(ConnectionEvent::Heartbeat {
                active_endpoints, ..
            }) => assert_eq!(*active_endpoints, 2),
            other => panic!("expected heartbeat, got {:?}", other),
        }
    }
}
