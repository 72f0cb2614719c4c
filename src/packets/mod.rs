//! PAR2 packet types recognised by this crate.
//!
//! Per spec.md §4.1 we only care about three packet kinds: the main packet,
//! file descriptions, and Unicode filename overrides. Every other packet
//! type (recovery slices, creator packets, ...) is skipped by the outer
//! parser without being decoded here.

pub mod file_description_packet;
pub mod main_packet;
pub mod unicode_packet;

pub use file_description_packet::FileDescriptionPacket;
pub use main_packet::MainPacket;
pub use unicode_packet::UnicodePacket;

/// 8-byte magic that opens every PAR2 packet header.
pub const MAGIC_BYTES: &[u8; 8] = b"PAR2\0PKT";

/// Fixed packet header size in bytes (magic, length, md5, set_id, type).
pub const HEADER_SIZE: usize = 64;

/// Maximum packet body length this parser will ever read into memory.
pub const MAX_BODY_LEN: u64 = 10 * 1024 * 1024;

pub const TYPE_MAIN: &[u8; 16] = b"PAR 2.0\0Main\0\0\0\0";
pub const TYPE_FILE_DESC: &[u8; 16] = b"PAR 2.0\0FileDesc";
pub const TYPE_UNICODE: &[u8; 16] = b"PAR 2.0\0UniFileN";

/// A parsed packet header, still unvalidated beyond magic + arithmetic checks.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub length: u64,
    pub hash: [u8; 16],
    pub set_id: [u8; 16],
    pub packet_type: [u8; 16],
}

impl Header {
    /// Parse the fixed 64-byte header. Returns `None` if the magic doesn't match.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Option<Header> {
        if &buf[0..8] != MAGIC_BYTES {
            return None;
        }
        let length = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&buf[16..32]);
        let mut set_id = [0u8; 16];
        set_id.copy_from_slice(&buf[32..48]);
        let mut packet_type = [0u8; 16];
        packet_type.copy_from_slice(&buf[48..64]);
        Some(Header {
            length,
            hash,
            set_id,
            packet_type,
        })
    }

    /// Body length per §4.1: `length - 64`, checked against `[0, 10 MiB]`.
    pub fn body_len(&self) -> Option<u64> {
        if self.length < HEADER_SIZE as u64 || self.length % 4 != 0 {
            return None;
        }
        let body_len = self.length - HEADER_SIZE as u64;
        if body_len > MAX_BODY_LEN {
            return None;
        }
        Some(body_len)
    }
}

/// One fully decoded packet of the kinds this crate understands.
#[derive(Debug, Clone)]
pub enum Packet {
    Main(MainPacket),
    FileDescription(FileDescriptionPacket),
    Unicode(UnicodePacket),
}

impl Packet {
    pub fn set_id(&self) -> crate::domain::SetId {
        match self {
            Packet::Main(p) => p.set_id,
            Packet::FileDescription(p) => p.set_id,
            Packet::Unicode(p) => p.set_id,
        }
    }
}
