use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }

    pub fn parse(s: &str) -> Option<Transport> {
        match s {
            "tcp" => Some(Transport::Tcp),
            "udp" => Some(Transport::Udp),
            _ => None,
        }
    }
}

/// Dedup and classification identity of a remote endpoint.
///
/// Loopback remotes and the dashboard's own port never become valid keys;
/// they are excluded before key construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub address: IpAddr,
    pub port: u16,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One row of an OS socket-table snapshot, already filtered to the
/// ESTABLISHED state by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub local_address: IpAddr,
    pub local_port: u16,
    pub remote_address: IpAddr,
    pub remote_port: u16,
    pub transport: Transport,
    pub observed_process: Option<String>,
}

impl SocketEntry {
    pub fn endpoint_key(&self) -> EndpointKey {
        EndpointKey {
            address: self.remote_address,
            port: self.remote_port,
        }
    }
}

/// A connection that appeared for the first time in the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConnection {
    pub local_address: IpAddr,
    pub remote_address: IpAddr,
    pub remote_port: u16,
    pub transport: Transport,
    pub observed_process: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The unit flowing through the pipeline.
///
/// NEW uniqueness is scoped to the running capture session: an endpoint that
/// disappears from the socket table and later reappears is NEW again.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    New(NewConnection),
    Heartbeat {
        scan_count: u64,
        active_endpoints: usize,
    },
}
