//! Raw-packet header decoding.
//!
//! A stateless byte-parsing utility for link-layer captures: Ethernet II ->
//! IPv4 -> TCP/UDP. Returns `None` on anything malformed, truncated or
//! unsupported instead of erroring - callers feed it untrusted bytes.

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

/// Structured view of one decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub src_mac: String,
    pub dst_mac: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
}

/// Decodes an Ethernet frame carrying IPv4 TCP or UDP.
pub fn decode_packet(bytes: &[u8]) -> Option<DecodedPacket> {
    let ethernet = bytes.get(..ETHERNET_HEADER_LEN)?;
    let ethertype = u16::from_be_bytes([ethernet[12], ethernet[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = bytes.get(ETHERNET_HEADER_LEN..)?;
    let version = ip.first()? >> 4;
    if version != 4 {
        return None;
    }
    let header_len = usize::from(ip[0] & 0x0F) * 4;
    if header_len < 20 {
        return None;
    }

    let protocol = match *ip.get(9)? {
        PROTO_TCP => "tcp",
        PROTO_UDP => "udp",
        _ => return None,
    };

    let src_ip = ip.get(12..16)?;
    let dst_ip = ip.get(16..20)?;
    let transport = ip.get(header_len..)?;
    let src_port = u16::from_be_bytes([*transport.first()?, *transport.get(1)?]);
    let dst_port = u16::from_be_bytes([*transport.get(2)?, *transport.get(3)?]);

    Some(DecodedPacket {
        dst_mac: format_mac(&ethernet[0..6]),
        src_mac: format_mac(&ethernet[6..12]),
        src_ip: format_ipv4(src_ip),
        dst_ip: format_ipv4(dst_ip),
        src_port,
        dst_port,
        protocol: protocol.to_string(),
    })
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn format_ipv4(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}
