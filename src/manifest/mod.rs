//! The manifest sidecar: per-archive JSON bookkeeping of creation,
//! verification and repair history (spec.md §3, §4.3, §6).
//!
//! Every read that must not race a concurrent instance, and every write,
//! takes a non-blocking advisory lock on a companion `.lock` file first,
//! mirroring the lock discipline `par2rs`'s recovery loader uses around its
//! slice cache: a lock already held by another process is a distinguished
//! condition, never treated as corruption.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::checksum::sha256_file;
use crate::job::{CreationRecord, Manifest, RepairRecord, VerificationRecord};

/// Bumped whenever the on-disk schema changes (spec.md §3: `manifest_version`).
pub const MANIFEST_VERSION: &str = "1";

/// `par2cron`'s own version, written into every manifest it touches
/// (spec.md §9: "Program version is a process-wide constant").
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed manifest json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest is locked by another process")]
    Locked,
}

/// Outcome of attempting to load one archive's sidecar, distinguishing the
/// cases the enumerator (C4) treats differently (spec.md §4.4).
pub enum LoadOutcome {
    /// No sidecar file exists yet.
    NotFound,
    /// A sidecar exists but its JSON doesn't parse.
    Invalid,
    /// A sidecar exists, parsed cleanly, and (if the content hash still
    /// matches) is returned here. A content-hash mismatch is reported the
    /// same as `NotFound`: the archive changed since the manifest was last
    /// written, so its history no longer applies (spec.md §4.3).
    Found(Manifest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreationRecordFile {
    time: u64,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
    files_count: usize,
    duration_ns: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VerificationRecordFile {
    count: u64,
    #[serde(default)]
    count_corrupted: u64,
    time: u64,
    #[serde(default)]
    args: Vec<String>,
    exit_code: i32,
    repair_needed: bool,
    repair_possible: bool,
    duration_ns: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepairRecordFile {
    count: u64,
    time: u64,
    #[serde(default)]
    args: Vec<String>,
    exit_code: i32,
    duration_ns: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    program_version: String,
    manifest_version: String,
    name: String,
    sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creation: Option<CreationRecordFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification: Option<VerificationRecordFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repair: Option<RepairRecordFile>,
}

fn to_unix(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

fn from_unix(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

impl From<&Manifest> for ManifestFile {
    fn from(m: &Manifest) -> Self {
        ManifestFile {
            program_version: PROGRAM_VERSION.to_string(),
            manifest_version: MANIFEST_VERSION.to_string(),
            name: m.name.clone(),
            sha256: m.sha256.clone(),
            creation: m.creation.as_ref().map(|c| CreationRecordFile {
                time: to_unix(c.time),
                args: c.args.clone(),
                files: c.files.clone(),
                files_count: c.files_count,
                duration_ns: c.duration.as_nanos() as u64,
            }),
            verification: m.verification.as_ref().map(|v| VerificationRecordFile {
                count: v.count,
                count_corrupted: v.count_corrupted,
                time: to_unix(v.time),
                args: v.args.clone(),
                exit_code: v.exit_code,
                repair_needed: v.repair_needed,
                repair_possible: v.repair_possible,
                duration_ns: v.duration.as_nanos() as u64,
            }),
            repair: m.repair.as_ref().map(|r| RepairRecordFile {
                count: r.count,
                time: to_unix(r.time),
                args: r.args.clone(),
                exit_code: r.exit_code,
                duration_ns: r.duration.as_nanos() as u64,
            }),
        }
    }
}

impl From<ManifestFile> for Manifest {
    fn from(f: ManifestFile) -> Self {
        Manifest {
            program_version: f.program_version,
            manifest_version: f.manifest_version,
            name: f.name,
            sha256: f.sha256,
            creation: f.creation.map(|c| CreationRecord {
                time: from_unix(c.time),
                args: c.args,
                files: c.files,
                files_count: c.files_count,
                duration: Duration::from_nanos(c.duration_ns),
            }),
            verification: f.verification.map(|v| VerificationRecord {
                count: v.count,
                count_corrupted: v.count_corrupted,
                time: from_unix(v.time),
                args: v.args,
                exit_code: v.exit_code,
                repair_needed: v.repair_needed,
                repair_possible: v.repair_possible,
                duration: Duration::from_nanos(v.duration_ns),
            }),
            repair: f.repair.map(|r| RepairRecord {
                time: from_unix(r.time),
                count: r.count,
                args: r.args,
                exit_code: r.exit_code,
                duration: Duration::from_nanos(r.duration_ns),
            }),
        }
    }
}

/// Sidecar path for an archive: `<par2_path>.json` (spec.md §6).
pub fn sidecar_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Lock path for an archive: `<par2_path>.lock` (spec.md §6).
pub fn lock_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // 0o666 before umask: bookkeeping, not meant to be process-private.
        file.set_permissions(fs::Permissions::from_mode(0o666))?;
    }
    Ok(file)
}

/// An acquired exclusive lock on one archive's `.lock` file, released when
/// dropped. The verify-then-write sequence holds this for its whole
/// duration so a concurrent instance sees either the fully-old or the
/// fully-new manifest, never a partial write (spec.md §4.3, §5).
pub struct Lock {
    _file: File,
}

/// Acquire the exclusive, non-blocking lock for `archive_path`. Returns
/// [`ManifestError::Locked`] if another process already holds it.
pub fn acquire_lock(archive_path: &Path) -> Result<Lock, ManifestError> {
    let file = open_lock_file(&lock_path(archive_path))?;
    file.try_lock_exclusive().map_err(|_| ManifestError::Locked)?;
    Ok(Lock { _file: file })
}

impl Drop for Lock {
    fn drop(&mut self) {
        self._file.unlock().ok();
    }
}

/// Load the manifest for `archive_path`, if any, checking it against the
/// archive's current content hash (spec.md §4.3). Takes a shared lock for
/// the duration of the read so it doesn't race a concurrent writer.
pub fn load(archive_path: &Path) -> Result<LoadOutcome, ManifestError> {
    let sidecar = sidecar_path(archive_path);
    if !sidecar.exists() {
        return Ok(LoadOutcome::NotFound);
    }

    let lock_file = open_lock_file(&lock_path(archive_path))?;
    lock_file.try_lock_shared().map_err(|_| ManifestError::Locked)?;
    let raw = fs::read(&sidecar)?;
    lock_file.unlock().ok();

    let parsed: ManifestFile = match serde_json::from_slice(&raw) {
        Ok(p) => p,
        Err(_) => return Ok(LoadOutcome::Invalid),
    };

    let current_hash = sha256_file(archive_path)?;
    if parsed.sha256 != current_hash {
        return Ok(LoadOutcome::NotFound);
    }

    Ok(LoadOutcome::Found(parsed.into()))
}

/// Write `manifest` to `archive_path`'s sidecar, under the already-acquired
/// exclusive `lock` (spec.md §4.3: "write policy"). Serialization is
/// indented JSON; file mode is `0o666` before umask.
pub fn store(archive_path: &Path, manifest: &Manifest, _lock: &Lock) -> Result<(), ManifestError> {
    let sidecar = sidecar_path(archive_path);
    let file = ManifestFile::from(manifest);
    let body = serde_json::to_vec_pretty(&file)?;

    // Write to a temp file in the same directory and rename, so a crash
    // mid-write never leaves a half-written sidecar behind.
    let tmp_path = sidecar.with_extension("json.tmp");
    {
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.set_permissions(fs::Permissions::from_mode(0o666))?;
        }
        tmp.write_all(&body)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, &sidecar)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::VerificationRecord;
    use std::time::Duration;

    fn sample_manifest(sha256: &str) -> Manifest {
        Manifest {
            program_version: "old".into(),
            manifest_version: "0".into(),
            name: "job.par2".into(),
            sha256: sha256.to_string(),
            creation: None,
            verification: Some(VerificationRecord {
                count: 1,
                count_corrupted: 0,
                time: UNIX_EPOCH + Duration::from_secs(1_000),
                args: vec!["-q".into()],
                exit_code: 0,
                repair_needed: false,
                repair_possible: true,
                duration: Duration::from_secs(5),
            }),
            repair: None,
        }
    }

    #[test]
    fn roundtrips_through_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("job.par2");
        fs::write(&archive, b"archive contents").unwrap();
        let hash = sha256_file(&archive).unwrap();

        let lock = acquire_lock(&archive).unwrap();
        store(&archive, &sample_manifest(&hash), &lock).unwrap();
        drop(lock);

        let stats = match load(&archive).unwrap() {
            LoadOutcome::Found(m) => m,
            _ => panic!("expected manifest"),
        };
        // program_version/manifest_version are bumped on write, regardless
        // of what was asked to be stored (spec.md §4.3 write policy).
        assert_eq!(stats.program_version, PROGRAM_VERSION);
        assert_eq!(stats.manifest_version, MANIFEST_VERSION);
        let v = stats.verification.unwrap();
        assert_eq!(v.count, 1);
        assert_eq!(v.duration, Duration::from_secs(5));
    }

    #[test]
    fn content_change_invalidates_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("job.par2");
        fs::write(&archive, b"original").unwrap();
        let hash = sha256_file(&archive).unwrap();

        let lock = acquire_lock(&archive).unwrap();
        store(&archive, &sample_manifest(&hash), &lock).unwrap();
        drop(lock);

        fs::write(&archive, b"modified contents").unwrap();
        assert!(matches!(load(&archive).unwrap(), LoadOutcome::NotFound));
    }

    #[test]
    fn missing_manifest_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("job.par2");
        fs::write(&archive, b"x").unwrap();
        assert!(matches!(load(&archive).unwrap(), LoadOutcome::NotFound));
    }

    #[test]
    fn invalid_json_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("job.par2");
        fs::write(&archive, b"x").unwrap();
        fs::write(sidecar_path(&archive), b"not json").unwrap();
        assert!(matches!(load(&archive).unwrap(), LoadOutcome::Invalid));
    }

    #[test]
    fn second_exclusive_lock_attempt_fails_with_locked() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("job.par2");
        fs::write(&archive, b"x").unwrap();
        let _first = acquire_lock(&archive).unwrap();
        assert!(matches!(acquire_lock(&archive), Err(ManifestError::Locked)));
    }
}
