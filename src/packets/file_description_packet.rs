//! File description packet: one file's identity, hashes and name.

use binrw::BinRead;

use crate::domain::{FileId, Hash, SetId};

/// Body layout per spec.md §4.1: fileID, hashFull, hash16k, u64 length, then
/// the (null-padded) filename filling the rest of the body.
#[derive(Debug, BinRead)]
#[br(import(body_len: u64))]
pub struct FileDescBody {
    pub file_id: [u8; 16],
    pub hash_full: [u8; 16],
    pub hash_16k: [u8; 16],
    pub file_length: u64,
    #[br(count = body_len.saturating_sub(56))]
    pub name_bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FileDescBodyError {
    #[error("file description body is malformed: {0}")]
    Malformed(String),
    #[error("file name is empty")]
    EmptyName,
    #[error("file length exceeds the representable maximum")]
    LengthOverflow,
}

/// A parsed, validated file description packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptionPacket {
    pub set_id: SetId,
    pub file_id: FileId,
    pub name: String,
    pub size: i64,
    pub hash_full: Hash,
    pub hash16k: Hash,
    /// Set once a matching Unicode packet has overwritten `name`.
    pub from_unicode: bool,
}

impl FileDescriptionPacket {
    pub fn decode(set_id: SetId, body: &[u8]) -> Result<FileDescriptionPacket, FileDescBodyError> {
        if body.len() < 56 {
            return Err(FileDescBodyError::Malformed("body too short".into()));
        }
        let body_len = body.len() as u64;
        let mut cursor = binrw::io::Cursor::new(body);
        let parsed: FileDescBody = FileDescBody::read_le_args(&mut cursor, (body_len,))
            .map_err(|e| FileDescBodyError::Malformed(e.to_string()))?;

        if parsed.file_length > i64::MAX as u64 {
            return Err(FileDescBodyError::LengthOverflow);
        }

        let raw = &parsed.name_bytes;
        let trimmed = match raw.iter().position(|&b| b == 0) {
            Some(pos) => &raw[..pos],
            None => &raw[..],
        };
        if trimmed.is_empty() {
            return Err(FileDescBodyError::EmptyName);
        }
        let name = String::from_utf8_lossy(trimmed).into_owned();

        Ok(FileDescriptionPacket {
            set_id,
            file_id: FileId::from(parsed.file_id),
            name,
            size: parsed.file_length as i64,
            hash_full: Hash::from(parsed.hash_full),
            hash16k: Hash::from(parsed.hash_16k),
            from_unicode: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(name: &str, length: u64) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&[1u8; 16]); // file_id
        b.extend_from_slice(&[2u8; 16]); // hash_full
        b.extend_from_slice(&[3u8; 16]); // hash_16k
        b.extend_from_slice(&length.to_le_bytes());
        let mut name_bytes = name.as_bytes().to_vec();
        while name_bytes.len() % 4 != 0 {
            name_bytes.push(0);
        }
        b.extend_from_slice(&name_bytes);
        b
    }

    #[test]
    fn decodes_name_trimmed_at_first_nul() {
        let b = body("test.txt", 100);
        let fd = FileDescriptionPacket::decode(SetId::new([0; 16]), &b).unwrap();
        assert_eq!(fd.name, "test.txt");
        assert_eq!(fd.size, 100);
        assert!(!fd.from_unicode);
    }

    #[test]
    fn rejects_empty_name() {
        let mut b = Vec::new();
        b.extend_from_slice(&[1u8; 16]);
        b.extend_from_slice(&[2u8; 16]);
        b.extend_from_slice(&[3u8; 16]);
        b.extend_from_slice(&0u64.to_le_bytes());
        // no name bytes at all
        assert!(matches!(
            FileDescriptionPacket::decode(SetId::new([0; 16]), &b),
            Err(FileDescBodyError::EmptyName)
        ));
    }

    #[test]
    fn name_without_nul_uses_entire_remainder() {
        // "abcd" is already a multiple of 4 and has no trailing nul.
        let b = body("abcd", 4);
        let fd = FileDescriptionPacket::decode(SetId::new([0; 16]), &b).unwrap();
        assert_eq!(fd.name, "abcd");
    }
}
