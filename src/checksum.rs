//! Centralized hashing utilities.
//!
//! PAR2 packet integrity uses MD5 (mandated by the wire format); archive
//! identity tracking in the manifest uses SHA-256 over the whole file. All
//! hashing goes through these functions to keep the two uses from getting
//! mixed up.

use md5::{Digest, Md5};
use sha2::Sha256;
use std::io::{self, Read};
use std::path::Path;

/// Compute the MD5 of a packet's hashed region: `setID || packetType || body`,
/// per spec.md §4.1 ("an MD5 computed over the 32 bytes of header from setID
/// onward, concatenated with the body").
pub fn packet_md5(set_id: &[u8; 16], packet_type: &[u8; 16], body: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(set_id);
    hasher.update(packet_type);
    hasher.update(body);
    hasher.finalize().into()
}

/// SHA-256 of an entire file, used by the manifest store to detect that the
/// archive bytes changed since the last recorded verification.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    const CHUNK: usize = 1024 * 1024;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
