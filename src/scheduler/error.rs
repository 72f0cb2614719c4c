//! Per-job scheduler errors (spec.md §5, §7): outcomes of driving the
//! external `par2` subprocess for one archive, classified by its exit code.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn par2 for {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait on par2 for {path}: {source}")]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write manifest for {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: crate::manifest::ManifestError,
    },
    /// par2 exited 1: repair is needed and possible (spec.md §4.5 exit-code
    /// table). A *data* outcome, not a bug: this is a normal, expected
    /// result of a verification run.
    #[error("{path} needs repair (repair possible)")]
    ExitRepairable { path: PathBuf },
    /// par2 exited 2: repair is needed but not possible.
    #[error("{path} needs repair (repair impossible)")]
    ExitUnrepairable { path: PathBuf },
    /// Any exit code other than 0/1/2: treated as an I/O failure of this job.
    #[error("par2 for {path} exited with unexpected code {code:?}")]
    ExitUnclassified { path: PathBuf, code: Option<i32> },
    #[error("run cancelled")]
    Cancelled,
}

impl SchedulerError {
    /// Map this error onto the process-level exit code taxonomy of
    /// spec.md §7: the per-job severity this error contributes when many
    /// jobs' errors are aggregated into one process exit code.
    pub fn exit_code(&self) -> crate::error::ExitCode {
        use crate::error::ExitCode;
        match self {
            SchedulerError::ExitRepairable { .. } => ExitCode::Repairable,
            SchedulerError::ExitUnrepairable { .. } => ExitCode::Unrepairable,
            SchedulerError::Spawn { .. }
            | SchedulerError::Wait { .. }
            | SchedulerError::Hash { .. }
            | SchedulerError::Manifest { .. }
            | SchedulerError::ExitUnclassified { .. } => ExitCode::PartialFailure,
            SchedulerError::Cancelled => ExitCode::Unclassified,
        }
    }
}
