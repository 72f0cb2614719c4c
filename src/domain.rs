//! Core domain types for PAR2 identifiers.
//!
//! `Hash` wraps the 16-byte opaque identifier PAR2 packets carry (set IDs,
//! file IDs, packet MD5 hashes), rather than passing `[u8; 16]` around
//! everywhere. `SetId` and `FileId` are aliases of the same type: nothing in
//! this crate ever compares a file ID against a set ID, so a stronger
//! distinct-newtype-per-kind split wouldn't be load-bearing here.

use std::fmt;

/// A 16-byte opaque identifier: a PAR2 set ID, file ID, or packet hash.
///
/// Serialised to lowercase hex in the manifest; compared by value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 16]);

impl Hash {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Hash(bytes))
    }
}

impl From<[u8; 16]> for Hash {
    fn from(bytes: [u8; 16]) -> Self {
        Hash(bytes)
    }
}

impl AsRef<[u8; 16]> for Hash {
    fn as_ref(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Set ID: identifies one logical PAR2 archive (the MD5 of the main packet body).
pub type SetId = Hash;

/// File ID: identifies one protected or auxiliary file within a set.
pub type FileId = Hash;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let h = Hash::new([0xab; 16]);
        let hex = h.to_hex();
        assert_eq!(Hash::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn distinct_values_compare_unequal() {
        assert_ne!(Hash::new([1; 16]), Hash::new([2; 16]));
    }

    #[test]
    fn ordering_is_byte_lexicographic() {
        assert!(Hash::new([1; 16]) < Hash::new([2; 16]));
    }
}
