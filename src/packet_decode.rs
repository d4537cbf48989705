pub mod decoder;

pub use decoder::{decode_packet, DecodedPacket};
