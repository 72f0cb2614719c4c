//! The materialized output of grouping PAR2 packets by set ID (spec.md §3).

use crate::domain::{FileId, Hash, SetId};
use crate::packets::MainPacket;

/// One file packet's data as it appears in a materialized set's output
/// lists. Deliberately independent of `FileDescriptionPacket` so the
/// merger (C2) can build one without going back through decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: FileId,
    pub name: String,
    pub size: i64,
    pub hash_full: Hash,
    pub hash16k: Hash,
    pub from_unicode: bool,
}

impl FileRecord {
    /// Ordering key used everywhere these lists must be deterministic:
    /// by name then file ID (spec.md §3).
    fn sort_key(&self) -> (&str, &FileId) {
        (&self.name, &self.file_id)
    }
}

pub fn sort_records(records: &mut [FileRecord]) {
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

pub fn sort_ids(ids: &mut [FileId]) {
    ids.sort();
}

/// One logical PAR2 archive: a set ID, its main packet (if any), and the
/// bucketed/missing file lists described in spec.md §3.
#[derive(Debug, Clone)]
pub struct Set {
    pub set_id: SetId,
    pub main: Option<MainPacket>,
    pub recovery_set: Vec<FileRecord>,
    pub non_recovery_set: Vec<FileRecord>,
    pub stray_packets: Vec<FileRecord>,
    pub missing_recovery: Vec<FileId>,
    pub missing_non_recovery: Vec<FileId>,
}

/// One parsed PAR2 file (index or volume): its sets, in first-appearance order.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub sets: Vec<Set>,
}

/// The five output lists every `Set` carries, sorted per spec.md §3.
pub struct Bucketed {
    pub recovery_set: Vec<FileRecord>,
    pub non_recovery_set: Vec<FileRecord>,
    pub stray_packets: Vec<FileRecord>,
    pub missing_recovery: Vec<FileId>,
    pub missing_non_recovery: Vec<FileId>,
}

/// Classify file records against a main packet's recovery/non-recovery ID
/// lists: present-and-listed goes to the matching set, present-but-unlisted
/// is a stray, listed-but-absent is missing. Shared by the single-file
/// grouper and the cross-file merger so both apply identical rules.
pub fn bucket(
    records: impl IntoIterator<Item = FileRecord>,
    recovery_ids: &[FileId],
    non_recovery_ids: &[FileId],
) -> Bucketed {
    let recovery_ids_set: std::collections::HashSet<FileId> =
        recovery_ids.iter().copied().collect();
    let non_recovery_ids_set: std::collections::HashSet<FileId> =
        non_recovery_ids.iter().copied().collect();

    let mut recovery_set = Vec::new();
    let mut non_recovery_set = Vec::new();
    let mut stray_packets = Vec::new();

    for record in records {
        if recovery_ids_set.contains(&record.file_id) {
            recovery_set.push(record);
        } else if non_recovery_ids_set.contains(&record.file_id) {
            non_recovery_set.push(record);
        } else {
            stray_packets.push(record);
        }
    }

    let seen: std::collections::HashSet<FileId> = recovery_set
        .iter()
        .chain(non_recovery_set.iter())
        .map(|r| r.file_id)
        .collect();
    let mut missing_recovery: Vec<FileId> = recovery_ids
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    let mut missing_non_recovery: Vec<FileId> = non_recovery_ids
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();

    sort_records(&mut recovery_set);
    sort_records(&mut non_recovery_set);
    sort_records(&mut stray_packets);
    sort_ids(&mut missing_recovery);
    sort_ids(&mut missing_non_recovery);

    Bucketed {
        recovery_set,
        non_recovery_set,
        stray_packets,
        missing_recovery,
        missing_non_recovery,
    }
}
