//! Accumulates recognised packets into per-set state and materializes the
//! final `Set` records, per spec.md §4.1's "set grouper" caps and
//! conflict rules.

use rustc_hash::FxHashMap;

use crate::domain::{FileId, SetId};
use crate::packets::{FileDescriptionPacket, MainPacket, Packet, UnicodePacket};
use crate::set::{bucket, FileRecord, ParsedFile, Set};

/// Caps from spec.md §4.1. Exceeding any of these is a hard (fatal) failure,
/// not a per-packet skip: a stream this malformed cannot be trusted at all.
const MAX_SETS_PER_FILE: usize = 10;
const MAX_IDS_PER_SET: usize = 100_000;
const MAX_FILE_PACKETS_PER_SET: usize = 100_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("more than {MAX_SETS_PER_FILE} distinct sets in one file")]
    TooManySets,
    #[error("set exceeds {MAX_IDS_PER_SET} recovery+non-recovery IDs")]
    TooManyIds,
    #[error("set exceeds {MAX_FILE_PACKETS_PER_SET} file/unicode packets")]
    TooManyFilePackets,
    #[error("conflicting main packets for the same set ID")]
    ConflictingMainPacket,
}

#[derive(Default)]
struct SetBuilder {
    main: Option<MainPacket>,
    files: FxHashMap<FileId, FileDescriptionPacket>,
    unicode_overrides: FxHashMap<FileId, UnicodePacket>,
    file_packet_count: usize,
}

/// Accumulates packets for one parsed file and produces its `Set`s in
/// first-appearance order once parsing finishes.
#[derive(Default)]
pub struct SetGrouper {
    order: Vec<SetId>,
    sets: FxHashMap<SetId, SetBuilder>,
}

impl SetGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, packet: Packet) -> Result<(), GroupError> {
        let set_id = packet.set_id();
        if !self.sets.contains_key(&set_id) {
            if self.order.len() >= MAX_SETS_PER_FILE {
                return Err(GroupError::TooManySets);
            }
            self.order.push(set_id);
        }
        let builder = self.sets.entry(set_id).or_default();

        match packet {
            Packet::Main(main) => {
                if main.recovery_ids.len() + main.non_recovery_ids.len() > MAX_IDS_PER_SET {
                    return Err(GroupError::TooManyIds);
                }
                match &builder.main {
                    None => builder.main = Some(main),
                    Some(existing) if *existing == main => {}
                    Some(_) => return Err(GroupError::ConflictingMainPacket),
                }
            }
            Packet::FileDescription(fd) => {
                builder.file_packet_count += 1;
                if builder.file_packet_count > MAX_FILE_PACKETS_PER_SET {
                    return Err(GroupError::TooManyFilePackets);
                }
                builder.files.insert(fd.file_id, fd);
            }
            Packet::Unicode(u) => {
                builder.file_packet_count += 1;
                if builder.file_packet_count > MAX_FILE_PACKETS_PER_SET {
                    return Err(GroupError::TooManyFilePackets);
                }
                builder.unicode_overrides.entry(u.file_id).or_insert(u);
            }
        }
        Ok(())
    }

    /// Consume the grouper, producing the sets it accumulated in
    /// first-appearance order.
    pub fn finalize(mut self) -> ParsedFile {
        let mut sets = Vec::with_capacity(self.order.len());
        for set_id in self.order.drain(..) {
            let builder = self.sets.remove(&set_id).expect("tracked in order");
            sets.push(materialize(set_id, builder));
        }
        ParsedFile { sets }
    }
}

fn materialize(set_id: SetId, builder: SetBuilder) -> Set {
    let SetBuilder {
        main,
        mut files,
        unicode_overrides,
        ..
    } = builder;

    for (file_id, unicode) in unicode_overrides {
        if let Some(fd) = files.get_mut(&file_id) {
            if !fd.from_unicode {
                fd.name = unicode.name;
                fd.from_unicode = true;
            }
        }
    }

    let (recovery_ids, non_recovery_ids) = match &main {
        Some(m) => (m.recovery_ids.clone(), m.non_recovery_ids.clone()),
        None => (Vec::new(), Vec::new()),
    };

    let records = files.into_iter().map(|(file_id, fd)| FileRecord {
        file_id,
        name: fd.name,
        size: fd.size,
        hash_full: fd.hash_full,
        hash16k: fd.hash16k,
        from_unicode: fd.from_unicode,
    });
    let bucketed = bucket(records, &recovery_ids, &non_recovery_ids);

    Set {
        set_id,
        main,
        recovery_set: bucketed.recovery_set,
        non_recovery_set: bucketed.non_recovery_set,
        stray_packets: bucketed.stray_packets,
        missing_recovery: bucketed.missing_recovery,
        missing_non_recovery: bucketed.missing_non_recovery,
    }
}
