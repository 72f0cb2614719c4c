//! Recursive discovery of PAR2 archives under a root directory (spec.md §4.4).
//!
//! Two marker files let an operator opt directories out of scheduling
//! without moving anything: `.par2cron-ignore` skips archives found directly
//! in that directory (subdirectories are still walked), and
//! `.par2cron-ignore-all` skips the directory and its entire subtree.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::job::Job;
use crate::manifest::{self, LoadOutcome, ManifestError};

const IGNORE_MARKER: &str = ".par2cron-ignore";
const IGNORE_ALL_MARKER: &str = ".par2cron-ignore-all";

#[derive(Debug, thiserror::Error)]
pub enum EnumError {
    #[error("i/o error walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A non-fatal problem hit while enumerating one or more archives
    /// (manifest unreadable or locked). Enumeration finishes anyway; the
    /// caller decides whether to surface this (spec.md §4.4: `ErrNonFatal`).
    #[error("{count} archive(s) had unreadable manifests during enumeration")]
    NonFatal { count: usize },
}

/// Options controlling which candidates become jobs (spec.md §4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumOptions {
    /// Create a job for a `.par2` file with no sidecar manifest at all.
    /// When false, such archives are silently skipped (treated as not
    /// managed by this tool).
    pub include_external: bool,
    /// Skip archives whose sidecar is present but undecodable, or decodes
    /// but has no `creation` record, rather than rebuilding their manifest
    /// from scratch.
    pub skip_not_created: bool,
}

/// A non-fatal problem hit while enumerating one archive. Enumeration keeps
/// going after these; the caller decides whether their accumulation is
/// worth surfacing to the operator.
#[derive(Debug)]
pub struct EnumWarning {
    pub path: PathBuf,
    pub message: String,
}

/// The result of a full enumeration pass: the jobs found, plus any
/// per-archive problems that didn't stop the walk.
#[derive(Debug, Default)]
pub struct EnumResult {
    pub jobs: Vec<Job>,
    pub warnings: Vec<EnumWarning>,
}

/// Walk `root`, returning one `Job` per discovered PAR2 index file.
///
/// Per directory, in order:
/// 1. `.par2cron-ignore-all` present → skip this directory and everything
///    beneath it entirely.
/// 2. `.par2cron-ignore` present → skip archives directly in this
///    directory, but still descend into its subdirectories.
/// 3. Per candidate archive, apply the job construction rules of spec.md
///    §4.4: no sidecar → `IncludeExternal` decides; unreadable sidecar →
///    `EnumWarning`, archive skipped; undecodable or creation-less sidecar
///    → `SkipNotCreated` decides; otherwise the decoded manifest is attached.
pub fn enumerate(root: &Path, options: &EnumOptions) -> Result<EnumResult, EnumError> {
    let mut result = EnumResult::default();
    let mut walker = WalkDir::new(root).into_iter();

    loop {
        let entry = match walker.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(EnumError::Walk { path, source: e.into() });
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let dir = entry.path();
        if dir.join(IGNORE_ALL_MARKER).exists() {
            walker.skip_current_dir();
            continue;
        }
        if dir.join(IGNORE_MARKER).exists() {
            continue;
        }

        for archive in index_files_in(dir) {
            match build_job(&archive, options) {
                Ok(Some(job)) => result.jobs.push(job),
                Ok(None) => {}
                Err(e) => result.warnings.push(EnumWarning {
                    path: archive,
                    message: e.to_string(),
                }),
            }
        }
    }

    Ok(result)
}

fn build_job(archive: &Path, options: &EnumOptions) -> Result<Option<Job>, ManifestError> {
    match manifest::load(archive) {
        Ok(LoadOutcome::NotFound) => {
            if options.include_external {
                Ok(Some(Job::new(archive.to_path_buf(), None)))
            } else {
                Ok(None)
            }
        }
        Ok(LoadOutcome::Invalid) => {
            if options.skip_not_created {
                Ok(None)
            } else {
                Ok(Some(Job::new(archive.to_path_buf(), None)))
            }
        }
        Ok(LoadOutcome::Found(manifest)) => {
            if options.skip_not_created && manifest.creation.is_none() {
                Ok(None)
            } else {
                Ok(Some(Job::new(archive.to_path_buf(), Some(manifest))))
            }
        }
        Err(e) => Err(e),
    }
}

/// Main/index `.par2` files in `dir` — excludes volume files, which are
/// named `<name>.volNNN+MMM.par2` and are never scheduled on their own.
/// Matching is case-insensitive per spec.md §4.4.
fn index_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_par2(p) && !is_volume_file(p))
        .collect()
}

fn is_par2(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().ends_with(".par2"))
        .unwrap_or(false)
}

fn is_volume_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().contains(".vol"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn opts() -> EnumOptions {
        EnumOptions { include_external: true, skip_not_created: false }
    }

    #[test]
    fn finds_index_file_and_skips_volumes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("archive.par2"), b"x").unwrap();
        fs::write(dir.path().join("archive.vol000+001.par2"), b"x").unwrap();

        let result = enumerate(dir.path(), &opts()).unwrap();
        assert_eq!(result.jobs.len(), 1);
        assert_eq!(result.jobs[0].par2_path.file_name().unwrap(), "archive.par2");
    }

    #[test]
    fn case_insensitive_extension_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("archive.PAR2"), b"x").unwrap();
        let result = enumerate(dir.path(), &opts()).unwrap();
        assert_eq!(result.jobs.len(), 1);
    }

    #[test]
    fn without_include_external_a_manifestless_archive_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("archive.par2"), b"x").unwrap();
        let options = EnumOptions { include_external: false, skip_not_created: false };
        let result = enumerate(dir.path(), &options).unwrap();
        assert!(result.jobs.is_empty());
    }

    #[test]
    fn ignore_marker_skips_directory_but_not_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IGNORE_MARKER), b"").unwrap();
        fs::write(dir.path().join("archive.par2"), b"x").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("nested.par2"), b"x").unwrap();

        let result = enumerate(dir.path(), &opts()).unwrap();
        assert_eq!(result.jobs.len(), 1);
        assert_eq!(result.jobs[0].par2_path.file_name().unwrap(), "nested.par2");
    }

    #[test]
    fn ignore_all_marker_skips_entire_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IGNORE_ALL_MARKER), b"").unwrap();
        fs::write(dir.path().join("archive.par2"), b"x").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("nested.par2"), b"x").unwrap();

        let result = enumerate(dir.path(), &opts()).unwrap();
        assert!(result.jobs.is_empty());
    }

    #[test]
    fn directory_with_no_archives_yields_no_jobs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let result = enumerate(dir.path(), &opts()).unwrap();
        assert!(result.jobs.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn invalid_json_with_skip_not_created_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.par2");
        fs::write(&archive, b"x").unwrap();
        fs::write(crate::manifest::sidecar_path(&archive), b"not json").unwrap();

        let options = EnumOptions { include_external: true, skip_not_created: true };
        let result = enumerate(dir.path(), &options).unwrap();
        assert!(result.jobs.is_empty());
    }

    #[test]
    fn invalid_json_without_skip_not_created_yields_fresh_job() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.par2");
        fs::write(&archive, b"x").unwrap();
        fs::write(crate::manifest::sidecar_path(&archive), b"not json").unwrap();

        let result = enumerate(dir.path(), &opts()).unwrap();
        assert_eq!(result.jobs.len(), 1);
        assert!(result.jobs[0].manifest.is_none());
    }
}
