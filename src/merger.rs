//! Cross-file set merging (spec.md §4.2): a PAR2 archive is usually split
//! across an index file and one or more volume files, each independently
//! parsed into its own `Set`s by [`crate::parser`]. This module combines
//! same-set-ID `Set`s from multiple parsed files into the final merged view.

use rustc_hash::FxHashMap;

use crate::domain::{FileId, SetId};
use crate::packets::MainPacket;
use crate::set::{bucket, FileRecord, ParsedFile, Set};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("conflicting main packets for set {0}")]
    ConflictingMainPacket(SetId),
}

/// Merge the `Set`s produced by parsing several files of one PAR2 archive.
///
/// Files are merged in the order given; when the same file ID appears under
/// a set in more than one file, the record from the later file wins. Every
/// record is then re-bucketed against the merged main packet's recovery and
/// non-recovery ID lists, so a file description that a single file's
/// grouper could only classify as stray (for lack of a local main packet)
/// ends up in the right list once the archive's full main packet is known.
pub fn merge(files: impl IntoIterator<Item = ParsedFile>) -> Result<Vec<Set>, MergeError> {
    let mut order: Vec<SetId> = Vec::new();
    let mut mains: FxHashMap<SetId, Option<MainPacket>> = FxHashMap::default();
    let mut records: FxHashMap<SetId, FxHashMap<FileId, FileRecord>> = FxHashMap::default();

    for file in files {
        for set in file.sets {
            if !mains.contains_key(&set.set_id) {
                order.push(set.set_id);
                mains.insert(set.set_id, None);
                records.insert(set.set_id, FxHashMap::default());
            }

            let existing_main = mains.remove(&set.set_id).flatten();
            let merged_main = merge_main(existing_main, set.main, set.set_id)?;
            mains.insert(set.set_id, merged_main);

            let rec_map = records.get_mut(&set.set_id).expect("inserted above");
            for record in set
                .recovery_set
                .into_iter()
                .chain(set.non_recovery_set)
                .chain(set.stray_packets)
            {
                rec_map.insert(record.file_id, record);
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for set_id in order {
        let main = mains.remove(&set_id).flatten();
        let rec_map = records.remove(&set_id).expect("tracked above");
        let (recovery_ids, non_recovery_ids) = match &main {
            Some(m) => (m.recovery_ids.clone(), m.non_recovery_ids.clone()),
            None => (Vec::new(), Vec::new()),
        };
        let bucketed = bucket(rec_map.into_values(), &recovery_ids, &non_recovery_ids);
        out.push(Set {
            set_id,
            main,
            recovery_set: bucketed.recovery_set,
            non_recovery_set: bucketed.non_recovery_set,
            stray_packets: bucketed.stray_packets,
            missing_recovery: bucketed.missing_recovery,
            missing_non_recovery: bucketed.missing_non_recovery,
        });
    }
    Ok(out)
}

fn merge_main(
    a: Option<MainPacket>,
    b: Option<MainPacket>,
    set_id: SetId,
) -> Result<Option<MainPacket>, MergeError> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(x), None) | (None, Some(x)) => Ok(Some(x)),
        (Some(x), Some(y)) if x == y => Ok(Some(x)),
        _ => Err(MergeError::ConflictingMainPacket(set_id)),
    }
}
