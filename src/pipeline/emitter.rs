//! JSON-lines event emitter.
//!
//! External consumers (dashboard ingesters, pipes) receive one JSON object
//! per line. Delivery is best-effort: a failed write is logged and dropped,
//! never retried or buffered. Consumers treat unknown `type` values as
//! ignorable, so the shapes here can grow without breaking them.

use log::warn;
use serde::Serialize;
use std::io::Write;

use crate::classifier::types::ClassifiedConnection;

#[derive(Serialize)]
struct ConnectionWire<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    event: &'static str,
    src_ip: String,
    dst_ip: String,
    dst_port: u16,
    metadata: MetadataWire<'a>,
}

#[derive(Serialize)]
struct MetadataWire<'a> {
    protocol: &'static str,
    state: &'static str,
    process: Option<&'a str>,
}

#[derive(Serialize)]
struct HeartbeatWire {
    #[serde(rename = "type")]
    kind: &'static str,
    scan_count: u64,
    active_endpoints: usize,
}

pub struct EventEmitter {
    out: Box<dyn Write + Send + Sync>,
}

impl EventEmitter {
    pub fn new(out: Box<dyn Write + Send + Sync>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn emit_connection(&mut self, classified: &ClassifiedConnection) {
        let conn = &classified.connection;
        let wire = ConnectionWire {
            kind: "connection",
            event: "new",
            src_ip: conn.local_address.to_string(),
            dst_ip: conn.remote_address.to_string(),
            dst_port: conn.remote_port,
            metadata: MetadataWire {
                protocol: conn.transport.as_str(),
                state: "ESTAB",
                process: conn.observed_process.as_deref(),
            },
        };
        self.emit(&wire);
    }

    pub fn emit_heartbeat(&mut self, scan_count: u64, active_endpoints: usize) {
        self.emit(&HeartbeatWire {
            kind: "heartbeat",
            scan_count,
            active_endpoints,
        });
    }

    fn emit<T: Serialize>(&mut self, value: &T) {
        let line = match serde_json::to_string(value) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{}", line) {
            warn!("event stream write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::{NewConnection, Transport};
    use crate::classifier::types::VpnType;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured() -> (EventEmitter, SharedBuffer) {
        let buffer = SharedBuffer(Arc::new(Mutex::new(Vec::new())));
        (EventEmitter::new(Box::new(buffer.clone())), buffer)
    }

    fn classified(process: Option<&str>) -> ClassifiedConnection {
        ClassifiedConnection {
            connection: NewConnection {
                local_address: "10.0.2.15".parse().unwrap(),
                remote_address: "8.8.8.8".parse().unwrap(),
                remote_port: 443,
                transport: Transport::Tcp,
                observed_process: process.map(String::from),
                timestamp: Utc::now(),
            },
            is_vpn_related: false,
            vpn_type: VpnType::None,
            should_display: true,
            threat_score: 0.0,
        }
    }

    #[test]
    fn test_connection_wire_shape() {
        let (mut emitter, buffer) = captured();
        emitter.emit_connection(&classified(Some("curl")));

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["event"], "new");
        assert_eq!(value["src_ip"], "10.0.2.15");
        assert_eq!(value["dst_ip"], "8.8.8.8");
        assert_eq!(value["dst_port"], 443);
        assert_eq!(value["metadata"]["protocol"], "tcp");
        assert_eq!(value["metadata"]["state"], "ESTAB");
        assert_eq!(value["metadata"]["process"], "curl");
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let (mut emitter, buffer) = captured();
        emitter.emit_heartbeat(20, 7);

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["scan_count"], 20);
        assert_eq!(value["active_endpoints"], 7);
    }

    #[test]
    fn test_one_object_per_line() {
        let (mut emitter, buffer) = captured();
        emitter.emit_connection(&classified(None));
        emitter.emit_heartbeat(10, 1);

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = text.trim_end().lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
