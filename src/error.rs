//! The process-level exit code taxonomy (spec.md §7): what `par2cron`
//! itself exits with, distinct from the exit code of the `par2` subprocess
//! it drives (see [`crate::scheduler::runner::RunOutput`] for that).

/// `par2cron`'s own exit status. Ordered so that a plain numeric `max`
/// across a run's job outcomes picks the most severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    PartialFailure = 1,
    BadInvocation = 2,
    Repairable = 3,
    Unrepairable = 4,
    Unclassified = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Fold a run's per-job exit codes into one process exit code.
///
/// The highest-severity code wins (`Unclassified` > `Unrepairable` >
/// `Repairable` > `BadInvocation` > `PartialFailure` > `Success`). If every
/// job that ran succeeded but enumeration produced warnings (archives
/// skipped due to a locked or unreadable manifest), the run as a whole is
/// a partial failure rather than a clean success.
///
/// Cancellation short-circuits this: the caller should call `aggregate`
/// with only the job outcomes observed before cancellation, rather than
/// waiting for the full job list.
pub fn aggregate(job_codes: impl IntoIterator<Item = ExitCode>, had_enum_warnings: bool) -> ExitCode {
    let worst = job_codes.into_iter().max();
    match worst {
        Some(code) if code > ExitCode::Success => code,
        _ if had_enum_warnings => ExitCode::PartialFailure,
        _ => ExitCode::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_outcome_wins() {
        let codes = [ExitCode::Success, ExitCode::Repairable, ExitCode::Unrepairable];
        assert_eq!(aggregate(codes, false), ExitCode::Unrepairable);
    }

    #[test]
    fn all_success_with_no_warnings_is_success() {
        assert_eq!(aggregate([ExitCode::Success, ExitCode::Success], false), ExitCode::Success);
    }

    #[test]
    fn all_success_with_warnings_is_partial_failure() {
        assert_eq!(aggregate([ExitCode::Success], true), ExitCode::PartialFailure);
    }

    #[test]
    fn empty_run_with_warnings_is_partial_failure() {
        assert_eq!(aggregate(std::iter::empty(), true), ExitCode::PartialFailure);
    }

    #[test]
    fn empty_run_with_no_warnings_is_success() {
        assert_eq!(aggregate(std::iter::empty(), false), ExitCode::Success);
    }
}
