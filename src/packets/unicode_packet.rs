//! Unicode filename packet: overrides a file description's name with a
//! UTF-16LE encoded one.

use crate::domain::{FileId, SetId};

/// A parsed Unicode filename override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePacket {
    pub set_id: SetId,
    pub file_id: FileId,
    pub name: String,
}

/// Per spec.md §4.1: an odd byte count, or an empty name after trimming
/// trailing zero code units, means this packet is skipped rather than
/// treated as a hard parse failure.
pub struct Skip;

impl UnicodePacket {
    pub fn decode(set_id: SetId, body: &[u8]) -> Result<UnicodePacket, Skip> {
        if body.len() < 16 {
            return Err(Skip);
        }
        let mut file_id = [0u8; 16];
        file_id.copy_from_slice(&body[0..16]);
        let name_bytes = &body[16..];

        if name_bytes.len() % 2 != 0 {
            return Err(Skip);
        }

        let mut units: Vec<u16> = name_bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }
        if units.is_empty() {
            return Err(Skip);
        }

        let name = String::from_utf16_lossy(&units);
        Ok(UnicodePacket {
            set_id,
            file_id: FileId::from(file_id),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str, pad_to: usize) -> Vec<u8> {
        let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        while bytes.len() < pad_to {
            bytes.push(0);
        }
        bytes
    }

    #[test]
    fn decodes_and_trims_padding() {
        let mut body = vec![7u8; 16];
        body.extend(utf16le("日本語.txt", 20));
        let p = UnicodePacket::decode(SetId::new([0; 16]), &body).unwrap();
        assert_eq!(p.name, "日本語.txt");
    }

    #[test]
    fn odd_byte_count_is_skipped() {
        let mut body = vec![0u8; 16];
        body.push(1); // one stray trailing byte: odd total
        assert!(UnicodePacket::decode(SetId::new([0; 16]), &body).is_err());
    }

    #[test]
    fn all_zero_name_is_skipped() {
        let mut body = vec![0u8; 16];
        body.extend_from_slice(&[0u8; 4]);
        assert!(UnicodePacket::decode(SetId::new([0; 16]), &body).is_err());
    }
}
