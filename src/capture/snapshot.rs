//! Endpoint snapshot source.
//!
//! Reads the kernel's socket tables under `/proc/net` and returns the set of
//! currently ESTABLISHED TCP/UDP connections as immutable [`SocketEntry`]
//! values. Reading is a pure snapshot: no state is kept between polls, and a
//! malformed row never aborts the poll - it is skipped silently.

use log::debug;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error_handling::types::SnapshotError;

use super::types::{SocketEntry, Transport};

/// TCP_ESTABLISHED in the kernel's socket state encoding; connected UDP
/// sockets report the same value.
const STATE_ESTABLISHED: &str = "01";

/// A source of socket-table snapshots.
///
/// `poll` must be a pure read of the current connection set; the pipeline
/// owns the timing and wraps each call in a bounded timeout.
pub trait SnapshotSource: Send + Sync {
    fn poll(&self) -> Result<Vec<SocketEntry>, SnapshotError>;
}

/// Snapshot source backed by the procfs socket tables.
pub struct ProcfsSource {
    tables: Vec<(String, Transport)>,
}

impl ProcfsSource {
    pub fn new() -> Self {
        Self {
            tables: vec![
                ("/proc/net/tcp".to_string(), Transport::Tcp),
                ("/proc/net/tcp6".to_string(), Transport::Tcp),
                ("/proc/net/udp".to_string(), Transport::Udp),
                ("/proc/net/udp6".to_string(), Transport::Udp),
            ],
        }
    }
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for ProcfsSource {
    fn poll(&self) -> Result<Vec<SocketEntry>, SnapshotError> {
        let mut entries = Vec::new();
        let mut any_readable = false;

        for (path, transport) in &self.tables {
            match fs::read_to_string(path) {
                Ok(text) => {
                    any_readable = true;
                    entries.extend(parse_socket_table(&text, *transport));
                }
                Err(e) => {
                    // A single missing table (e.g. no IPv6) is not an error
                    debug!("skipping socket table {}: {}", path, e);
                }
            }
        }

        if !any_readable {
            return Err(SnapshotError::NoTablesReadable);
        }
        Ok(entries)
    }
}

/// Parses one procfs socket table, keeping only ESTABLISHED rows.
///
/// Rows that fail to decode (short lines, missing port separator, bad hex)
/// are dropped without error.
fn parse_socket_table(text: &str, transport: Transport) -> Vec<SocketEntry> {
    text.lines()
        .skip(1) // header
        .filter_map(|line| parse_socket_line(line, transport))
        .collect()
}

fn parse_socket_line(line: &str, transport: Transport) -> Option<SocketEntry> {
    let mut fields = line.split_whitespace();
    let _slot = fields.next()?;
    let local = fields.next()?;
    let remote = fields.next()?;
    let state = fields.next()?;

    if state != STATE_ESTABLISHED {
        return None;
    }

    let (local_address, local_port) = parse_hex_endpoint(local)?;
    let (remote_address, remote_port) = parse_hex_endpoint(remote)?;

    Some(SocketEntry {
        local_address,
        local_port,
        remote_address,
        remote_port,
        transport,
        observed_process: None,
    })
}

/// Decodes a procfs `ADDR:PORT` hex pair, IPv4 or IPv6.
fn parse_hex_endpoint(s: &str) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let address = match addr_hex.len() {
        8 => IpAddr::V4(parse_hex_v4(addr_hex)?),
        32 => IpAddr::V6(parse_hex_v6(addr_hex)?),
        _ => return None,
    };
    Some((address, port))
}

/// Kernel prints the IPv4 address as one little-endian u32 in hex.
fn parse_hex_v4(hex: &str) -> Option<Ipv4Addr> {
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.swap_bytes()))
}

/// IPv6 addresses are printed as four little-endian u32 words.
fn parse_hex_v6(hex: &str) -> Option<Ipv6Addr> {
    let mut bytes = [0u8; 16];
    for i in 0..4 {
        let word = u32::from_str_radix(&hex[i * 8..(i + 1) * 8], 16).ok()?;
        bytes[i * 4..(i + 1) * 4].copy_from_slice(&word.to_le_bytes());
    }
    Some(Ipv6Addr::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_SAMPLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1
   1: 0F02000A:A24E 5DB8D822:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 23456 1
   2: 0F02000A:B3C2 08080808:0035 01 00000000:00000000 00:00000000 00000000  1000        0 34567 1
";

    #[test]
    fn test_parse_established_only() {
        let entries = parse_socket_table(TCP_SAMPLE, Transport::Tcp);
        // The listener in state 0A is ignored
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].remote_port, 443);
        assert_eq!(
            entries[0].remote_address,
            "34.216.184.93".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            entries[1].remote_address,
            "8.8.8.8".parse::<IpAddr>().unwrap()
        );
        assert_eq!(entries[1].remote_port, 53);
    }

    #[test]
    fn test_parse_local_endpoint() {
        let entries = parse_socket_table(TCP_SAMPLE, Transport::Tcp);
        assert_eq!(
            entries[0].local_address,
            "10.0.2.15".parse::<IpAddr>().unwrap()
        );
        assert_eq!(entries[0].local_port, 0xA24E);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let text = "\
  sl  local_address rem_address   st
   0: garbage
   1: 0100007F1F90 00000000:0000 01
   2: ZZZZZZZZ:0050 08080808:0035 01
   3: 0F02000A:B3C2 08080808:0035 01 0 0
";
        let entries = parse_socket_table(text, Transport::Tcp);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remote_port, 53);
    }

    #[test]
    fn test_parse_hex_v6_loopback() {
        // ::1 as printed by the kernel on a little-endian host
        let addr = parse_hex_v6("00000000000000000000000001000000").unwrap();
        assert_eq!(addr, Ipv6Addr::LOCALHOST);
    }

    #[test]
    fn test_parse_hex_v4_loopback() {
        assert_eq!(parse_hex_v4("0100007F").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_empty_table() {
        let entries = parse_socket_table("  sl  local_address rem_address   st\n", Transport::Udp);
        assert!(entries.is_empty());
    }
}
