//! Main packet: lists the recovery and non-recovery file IDs of one set.

use binrw::BinRead;

use crate::domain::{FileId, SetId};

/// Body layout (after the 64-byte header), per spec.md §4.1:
/// `u64 sliceSize`, `u32 numRecoveryFiles`, then that many 16-byte recovery
/// IDs, then the remaining bytes (must be a multiple of 16) as non-recovery
/// IDs.
#[derive(Debug, BinRead)]
#[br(import(body_len: u64))]
pub struct MainBody {
    pub slice_size: u64,
    pub num_recovery_files: u32,
    #[br(count = num_recovery_files)]
    pub recovery_ids: Vec<[u8; 16]>,
    #[br(count = non_recovery_count(body_len, num_recovery_files))]
    pub non_recovery_ids: Vec<[u8; 16]>,
}

fn non_recovery_count(body_len: u64, num_recovery_files: u32) -> u64 {
    let consumed = 8 + 4 + (num_recovery_files as u64) * 16;
    body_len.saturating_sub(consumed) / 16
}

/// Errors decoding a main packet body that the header's length claimed was
/// well-formed binrw input but whose field arithmetic doesn't check out.
#[derive(Debug, thiserror::Error)]
pub enum MainBodyError {
    #[error("slice size {0} is not a multiple of 4")]
    SliceSizeNotAligned(u64),
    #[error("main packet body is malformed: {0}")]
    Malformed(String),
}

/// A parsed, validated main packet.
#[derive(Debug, Clone)]
pub struct MainPacket {
    pub set_id: SetId,
    pub slice_size: u64,
    pub recovery_ids: Vec<FileId>,
    pub non_recovery_ids: Vec<FileId>,
}

impl PartialEq for MainPacket {
    fn eq(&self, other: &Self) -> bool {
        self.set_id == other.set_id
            && self.slice_size == other.slice_size
            && self.recovery_ids == other.recovery_ids
            && self.non_recovery_ids == other.non_recovery_ids
    }
}
impl Eq for MainPacket {}

impl MainPacket {
    /// Decode and validate a main packet from its raw body bytes.
    ///
    /// The caller has already checked `body_len` against the header's
    /// declared length; the remainder check (non-recovery ID count must
    /// land on a 16-byte boundary) catches a main packet whose
    /// `numRecoveryFiles` field was itself corrupted.
    pub fn decode(set_id: SetId, body: &[u8]) -> Result<MainPacket, MainBodyError> {
        let body_len = body.len() as u64;
        if body_len < 12 {
            return Err(MainBodyError::Malformed("body too short".into()));
        }
        let consumed_before_non_recovery = {
            let num_recovery_files =
                u32::from_le_bytes(body[8..12].try_into().unwrap()) as u64;
            8 + 4 + num_recovery_files * 16
        };
        if consumed_before_non_recovery > body_len {
            return Err(MainBodyError::Malformed(
                "numRecoveryFiles overruns body".into(),
            ));
        }
        if (body_len - consumed_before_non_recovery) % 16 != 0 {
            return Err(MainBodyError::Malformed(
                "non-recovery ID section is not a multiple of 16 bytes".into(),
            ));
        }

        let mut cursor = binrw::io::Cursor::new(body);
        let parsed: MainBody = MainBody::read_le_args(&mut cursor, (body_len,))
            .map_err(|e| MainBodyError::Malformed(e.to_string()))?;

        if parsed.slice_size % 4 != 0 {
            return Err(MainBodyError::SliceSizeNotAligned(parsed.slice_size));
        }

        Ok(MainPacket {
            set_id,
            slice_size: parsed.slice_size,
            recovery_ids: parsed.recovery_ids.into_iter().map(FileId::from).collect(),
            non_recovery_ids: parsed
                .non_recovery_ids
                .into_iter()
                .map(FileId::from)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(slice_size: u64, recovery: &[[u8; 16]], non_recovery: &[[u8; 16]]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&slice_size.to_le_bytes());
        b.extend_from_slice(&(recovery.len() as u32).to_le_bytes());
        for id in recovery {
            b.extend_from_slice(id);
        }
        for id in non_recovery {
            b.extend_from_slice(id);
        }
        b
    }

    #[test]
    fn decodes_simple_main_packet() {
        let body = body(4096, &[[1; 16]], &[[2; 16]]);
        let main = MainPacket::decode(SetId::new([9; 16]), &body).unwrap();
        assert_eq!(main.slice_size, 4096);
        assert_eq!(main.recovery_ids, vec![FileId::new([1; 16])]);
        assert_eq!(main.non_recovery_ids, vec![FileId::new([2; 16])]);
    }

    #[test]
    fn rejects_unaligned_slice_size() {
        let body = body(4097, &[], &[]);
        assert!(matches!(
            MainPacket::decode(SetId::new([0; 16]), &body),
            Err(MainBodyError::SliceSizeNotAligned(4097))
        ));
    }

    #[test]
    fn rejects_overrunning_recovery_count() {
        // Claims 1000 recovery IDs but the body is far too short for that.
        let mut b = Vec::new();
        b.extend_from_slice(&4096u64.to_le_bytes());
        b.extend_from_slice(&1000u32.to_le_bytes());
        assert!(MainPacket::decode(SetId::new([0; 16]), &b).is_err());
    }

    #[test]
    fn equal_iff_all_fields_equal() {
        let a = MainPacket::decode(SetId::new([1; 16]), &body(4, &[[1; 16]], &[])).unwrap();
        let b = MainPacket::decode(SetId::new([1; 16]), &body(4, &[[1; 16]], &[])).unwrap();
        let c = MainPacket::decode(SetId::new([1; 16]), &body(8, &[[1; 16]], &[])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
