//! The scheduling unit: one PAR2 archive discovered on disk, together with
//! whatever history the manifest store has recorded for it (spec.md §3).

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Creation history recorded the one time (if ever) this archive's PAR2 set
/// was produced. `par2cron` never creates archives itself; this record is
/// only ever read, never written, by this crate (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct CreationRecord {
    pub time: SystemTime,
    pub args: Vec<String>,
    pub files: Vec<String>,
    pub files_count: usize,
    pub duration: Duration,
}

/// History of verification runs against this archive (spec.md §3, §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRecord {
    pub count: u64,
    pub count_corrupted: u64,
    pub time: SystemTime,
    pub args: Vec<String>,
    pub exit_code: i32,
    pub repair_needed: bool,
    pub repair_possible: bool,
    pub duration: Duration,
}

/// History of repair runs against this archive. `par2cron` never repairs
/// (spec.md §1 Non-goals); this record only round-trips whatever another
/// tool already wrote here.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairRecord {
    pub count: u64,
    pub time: SystemTime,
    pub args: Vec<String>,
    pub exit_code: i32,
    pub duration: Duration,
}

/// The sidecar manifest for one archive, as described by spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub program_version: String,
    pub manifest_version: String,
    pub name: String,
    pub sha256: String,
    pub creation: Option<CreationRecord>,
    pub verification: Option<VerificationRecord>,
    pub repair: Option<RepairRecord>,
}

impl Manifest {
    /// Priority class used by the scheduler's sort (spec.md §4.5): lower
    /// runs first. A manifest with no `verification` record ranks just
    /// above a job with no manifest at all; one flagged as needing repair
    /// ranks above everything that's merely been verified clean.
    pub fn priority_class(&self) -> u8 {
        match &self.verification {
            None => 1,
            Some(v) if v.repair_needed => 2,
            Some(_) => 3,
        }
    }
}

/// One PAR2 archive the enumerator found, ready to be scheduled.
///
/// Not persisted: constructed fresh each invocation from a discovered PAR2
/// path and whatever manifest the manifest store could recover for it
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct Job {
    /// Directory containing the archive's `.par2` files; also the working
    /// directory the external tool is invoked in (spec.md §4.5).
    pub dir: PathBuf,
    /// Full path to the archive's main (index) `.par2` file.
    pub par2_path: PathBuf,
    /// `par2_path`'s file name, for display and for the manifest's `name` field.
    pub par2_basename: String,
    /// Full path to the sidecar manifest (`<par2_path>.json`).
    pub manifest_path: PathBuf,
    /// `manifest_path`'s file name.
    pub manifest_basename: String,
    /// Full path to the advisory lock file (`<par2_path>.lock`).
    pub lock_path: PathBuf,
    /// Pass-through arguments forwarded to the external tool, inserted
    /// between `verify` and the trailing `-- <path>` (spec.md §6).
    pub args: Vec<String>,
    /// History from the manifest store, if one exists and is still valid
    /// for the archive's current content hash. `None` means this archive
    /// has never been verified by this tool, or its manifest was
    /// invalidated by a content change.
    pub manifest: Option<Manifest>,
}

impl Job {
    pub fn new(par2_path: PathBuf, manifest: Option<Manifest>) -> Job {
        let dir = par2_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let par2_basename = par2_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let manifest_path = {
            let mut p = par2_path.clone().into_os_string();
            p.push(".json");
            PathBuf::from(p)
        };
        let manifest_basename = manifest_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lock_path = {
            let mut p = par2_path.clone().into_os_string();
            p.push(".lock");
            PathBuf::from(p)
        };
        Job {
            dir,
            par2_path,
            par2_basename,
            manifest_path,
            manifest_basename,
            lock_path,
            args: Vec::new(),
            manifest,
        }
    }

    /// Time elapsed since the last recorded verification, or `None` if this
    /// archive has never been verified (no manifest, or no `verification`
    /// record within the manifest).
    pub fn age(&self, now: SystemTime) -> Option<Duration> {
        let verification = self.manifest.as_ref()?.verification.as_ref()?;
        Some(now.duration_since(verification.time).unwrap_or(Duration::ZERO))
    }

    /// The scheduler's priority class for this job (spec.md §4.5): 0 if
    /// there's no manifest at all, otherwise delegates to the manifest.
    pub fn priority_class(&self) -> u8 {
        self.manifest.as_ref().map(Manifest::priority_class).unwrap_or(0)
    }

    /// Last recorded verification duration, or `None` if unknown (no
    /// manifest, or no `verification` record yet).
    pub fn last_duration(&self) -> Option<Duration> {
        self.manifest.as_ref()?.verification.as_ref().map(|v| v.duration)
    }
}

/// Aggregates over a job list (spec.md §3), consumed by the analyser (C6)
/// and by the scheduler's backlog advisories.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub job_count: usize,
    /// Jobs with a non-zero recorded verification duration.
    pub known_count: usize,
    pub unknown_count: usize,
    pub unverifieds: usize,
    pub healthies: usize,
    pub repairables: usize,
    pub unrepairables: usize,
    pub total_duration: Duration,
    pub avg_duration: Duration,
    pub largest_duration: Duration,
    pub largest_job: Option<String>,
    pub last_verification: Option<SystemTime>,
}

impl Stats {
    pub fn compute(jobs: &[Job]) -> Stats {
        let mut stats = Stats {
            job_count: jobs.len(),
            ..Stats::default()
        };

        for job in jobs {
            match job.manifest.as_ref().and_then(|m| m.verification.as_ref()) {
                None => {
                    stats.unverifieds += 1;
                    stats.unknown_count += 1;
                }
                Some(v) => {
                    if v.duration > Duration::ZERO {
                        stats.known_count += 1;
                        stats.total_duration += v.duration;
                        if v.duration > stats.largest_duration {
                            stats.largest_duration = v.duration;
                            stats.largest_job = Some(job.par2_basename.clone());
                        }
                    } else {
                        stats.unknown_count += 1;
                    }

                    if v.repair_needed && v.repair_possible {
                        stats.repairables += 1;
                    } else if v.repair_needed {
                        stats.unrepairables += 1;
                    } else {
                        stats.healthies += 1;
                    }

                    stats.last_verification = Some(match stats.last_verification {
                        Some(prev) if prev >= v.time => prev,
                        _ => v.time,
                    });
                }
            }
        }

        stats.avg_duration = if stats.known_count > 0 {
            stats.total_duration / stats.known_count as u32
        } else {
            Duration::ZERO
        };

        stats
    }
}
