//! C5: turns the enumerator's job list into a bounded, prioritized run
//! order and drives it through an external `par2` process.

pub mod error;
pub mod runner;

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::checksum::sha256_file;
use crate::error::ExitCode;
use crate::job::{Job, Manifest, VerificationRecord};
use crate::manifest;
use error::SchedulerError;
use runner::{CancellationToken, Clock, CommandRunner};

/// Options controlling which jobs get scheduled, how many, and what the
/// host scheduler's cadence is (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Skip archives verified more recently than this.
    pub min_age: Option<Duration>,
    /// Anti-starvation budget: stop adding jobs to the run once their
    /// estimated total duration would exceed this, except the run always
    /// includes at least one job so progress is never fully starved by a
    /// single oversized archive.
    pub max_duration: Option<Duration>,
    /// How often the host scheduler invokes this program. Used only for
    /// the backlog advisory (spec.md §4.5), not for selection itself.
    pub run_interval: Option<Duration>,
    /// Pass-through arguments forwarded to `par2 verify` for every job.
    pub args: Vec<String>,
}

/// Sort jobs by priority class, then oldest-verified-first within a class,
/// then by path for full determinism (spec.md §4.5). `sort_by` is stable.
pub fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.priority_class()
            .cmp(&b.priority_class())
            .then_with(|| {
                let a_time = a.manifest.as_ref().and_then(|m| m.verification.as_ref()).map(|v| v.time);
                let b_time = b.manifest.as_ref().and_then(|m| m.verification.as_ref()).map(|v| v.time);
                // Zero/absent time sorts first per spec.md §4.5.
                a_time.cmp(&b_time)
            })
            .then_with(|| a.par2_path.cmp(&b.par2_path))
    });
}

/// Drop jobs verified more recently than `min_age`. Jobs with no manifest
/// or no verification record are never filtered out (spec.md §4.5).
pub fn filter_by_age(jobs: Vec<Job>, min_age: Option<Duration>, now: SystemTime) -> Vec<Job> {
    let Some(min_age) = min_age else {
        return jobs;
    };
    if min_age <= Duration::ZERO {
        return jobs;
    }
    jobs.into_iter()
        .filter(|job| match job.age(now) {
            None => true,
            Some(age) => age >= min_age,
        })
        .collect()
}

/// Enforce the duration budget (spec.md §4.5): the first job is always
/// included regardless of its estimate. Every subsequent job whose last
/// recorded duration is unknown (no manifest, or zero) is included
/// unconditionally, to establish a baseline for next time; everything else
/// is included only if it fits the remaining budget.
pub fn filter_by_duration_budget(jobs: Vec<Job>, max_duration: Option<Duration>) -> Vec<Job> {
    let Some(max_duration) = max_duration else {
        return jobs;
    };
    let mut kept = Vec::new();
    let mut spent = Duration::ZERO;
    for (i, job) in jobs.into_iter().enumerate() {
        if i == 0 {
            if let Some(d) = job.last_duration().filter(|d| *d > Duration::ZERO) {
                spent += d;
            }
            kept.push(job);
            continue;
        }
        match job.last_duration() {
            None => kept.push(job),
            Some(d) if d == Duration::ZERO => kept.push(job),
            Some(d) => {
                if spent + d <= max_duration {
                    spent += d;
                    kept.push(job);
                }
            }
        }
    }
    kept
}

/// Compose the age filter, priority sort and duration filter into the
/// final run order (spec.md §4.5).
pub fn schedule(jobs: Vec<Job>, options: &ScheduleOptions, clock: &dyn Clock) -> Vec<Job> {
    let mut jobs = filter_by_age(jobs, options.min_age, clock.now());
    sort_jobs(&mut jobs);
    filter_by_duration_budget(jobs, options.max_duration)
}

/// Backlog/duration advisories computed before a run starts (spec.md §4.5,
/// last paragraph). Returned as plain strings rather than logged directly
/// so callers (and tests) can decide what to do with them.
pub fn backlog_advisories(selected: &[Job], known_total: Duration, options: &ScheduleOptions) -> Vec<String> {
    let mut warnings = Vec::new();

    if let (Some(min_age), Some(max_duration), Some(run_interval)) =
        (options.min_age, options.max_duration, options.run_interval)
    {
        if min_age > Duration::ZERO && max_duration > Duration::ZERO && run_interval > Duration::ZERO {
            let runs_per_cycle =
                ((min_age.as_secs_f64() / run_interval.as_secs_f64()).floor() as u64).max(1);
            let capacity = max_duration * runs_per_cycle as u32;
            if known_total > capacity {
                warnings.push(format!(
                    "backlog exceeds capacity: {:.0}s of known work against ~{:.0}s available per cycle",
                    known_total.as_secs_f64(),
                    capacity.as_secs_f64(),
                ));
            }
        }
    }

    if let Some(max_duration) = options.max_duration {
        if let Some(first) = selected.first() {
            match first.last_duration() {
                None => warnings.push(format!(
                    "first scheduled job {} has no duration estimate; it may overrun --max-duration",
                    first.par2_basename
                )),
                Some(d) if d > max_duration => warnings.push(format!(
                    "first scheduled job {} is estimated at {:.0}s, exceeding --max-duration of {:.0}s",
                    first.par2_basename,
                    d.as_secs_f64(),
                    max_duration.as_secs_f64(),
                )),
                _ => {}
            }
        }
        if selected.iter().skip(1).any(|j| j.last_duration().is_none()) {
            warnings.push(
                "one or more subsequently scheduled jobs have no duration estimate".to_string(),
            );
        }
    }

    warnings
}

/// One job's outcome from a scheduler run.
#[derive(Debug)]
pub struct JobRun {
    pub path: PathBuf,
    /// `None` for a clean (repair-not-needed) run; `Some` for every other
    /// classified or unclassified outcome (spec.md §4.5, §7).
    pub error: Option<SchedulerError>,
    /// The job was skipped because another process already held its lock
    /// (spec.md §4.3, §7: logged at warn level, does not affect the exit code).
    pub skipped_locked: bool,
}

/// The result of running a scheduled batch of jobs: the per-job outcomes,
/// and whether the run was cut short by cancellation (spec.md §5, §7).
#[derive(Debug, Default)]
pub struct RunSummary {
    pub runs: Vec<JobRun>,
    pub cancelled: bool,
}

impl RunSummary {
    /// The process-level exit code this batch alone (ignoring enumeration
    /// warnings) would contribute, per spec.md §7's aggregation rule.
    pub fn exit_codes(&self) -> impl Iterator<Item = ExitCode> + '_ {
        self.runs.iter().filter_map(|r| r.error.as_ref().map(|e| e.exit_code()))
    }
}

/// Run every job in `jobs` in order through `runner`, writing its manifest
/// back under the same lock the run used, stopping before starting the
/// next job once `cancel` is signalled (spec.md §5).
pub fn run_all(
    jobs: Vec<Job>,
    options: &ScheduleOptions,
    runner: &dyn CommandRunner,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for job in jobs {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let lock = match manifest::acquire_lock(&job.par2_path) {
            Ok(lock) => lock,
            Err(manifest::ManifestError::Locked) => {
                log::warn!("{} is locked by another process, skipping", job.par2_path.display());
                summary.runs.push(JobRun { path: job.par2_path, error: None, skipped_locked: true });
                continue;
            }
            Err(e) => {
                summary.runs.push(JobRun {
                    path: job.par2_path.clone(),
                    error: Some(SchedulerError::Manifest { path: job.par2_path, source: e }),
                    skipped_locked: false,
                });
                continue;
            }
        };

        let run_outcome = run_one_job(&job, options, runner, clock, cancel, &lock, stdout, stderr);
        drop(lock);

        match run_outcome {
            Ok(RunOneOutcome::Cancelled) => {
                summary.cancelled = true;
                summary.runs.push(JobRun { path: job.par2_path, error: Some(SchedulerError::Cancelled), skipped_locked: false });
                break;
            }
            Ok(RunOneOutcome::Completed(error)) => {
                summary.runs.push(JobRun { path: job.par2_path, error, skipped_locked: false });
            }
            Err(error) => {
                summary.runs.push(JobRun { path: job.par2_path, error: Some(error), skipped_locked: false });
            }
        }
    }

    summary
}

enum RunOneOutcome {
    Completed(Option<SchedulerError>),
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
fn run_one_job(
    job: &Job,
    options: &ScheduleOptions,
    runner: &dyn CommandRunner,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    lock: &manifest::Lock,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<RunOneOutcome, SchedulerError> {
    let current_hash =
        sha256_file(&job.par2_path).map_err(|source| SchedulerError::Hash { path: job.par2_path.clone(), source })?;

    let mut manifest = match &job.manifest {
        Some(m) if m.sha256 == current_hash => m.clone(),
        _ => Manifest {
            program_version: manifest::PROGRAM_VERSION.to_string(),
            manifest_version: manifest::MANIFEST_VERSION.to_string(),
            name: job.par2_basename.clone(),
            sha256: current_hash.clone(),
            creation: None,
            verification: None,
            repair: None,
        },
    };
    manifest.sha256 = current_hash;

    let started = clock.now();
    let output = runner.run(&job.par2_path, &job.dir, &options.args, cancel, stdout, stderr)?;
    let finished = clock.now();
    let duration = output.duration;

    if output.cancelled {
        return Ok(RunOneOutcome::Cancelled);
    }

    let previous_count = manifest.verification.as_ref().map(|v| v.count).unwrap_or(0);
    let previous_corrupted = manifest.verification.as_ref().map(|v| v.count_corrupted).unwrap_or(0);

    let (repair_needed, repair_possible, count_corrupted, error) = match output.exit_code {
        Some(0) => (false, true, 0, None),
        Some(1) => (true, true, previous_corrupted + 1, Some(SchedulerError::ExitRepairable { path: job.par2_path.clone() })),
        Some(2) => (true, false, previous_corrupted + 1, Some(SchedulerError::ExitUnrepairable { path: job.par2_path.clone() })),
        code => (false, false, previous_corrupted, Some(SchedulerError::ExitUnclassified { path: job.par2_path.clone(), code })),
    };

    manifest.verification = Some(VerificationRecord {
        count: previous_count + 1,
        count_corrupted,
        time: started,
        args: options.args.clone(),
        exit_code: output.exit_code.unwrap_or(-1),
        repair_needed,
        repair_possible,
        duration: finished.duration_since(started).unwrap_or(duration),
    });

    manifest::store(&job.par2_path, &manifest, lock)
        .map_err(|source| SchedulerError::Manifest { path: job.par2_path.clone(), source })?;

    Ok(RunOneOutcome::Completed(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::VerificationRecord;
    use std::time::UNIX_EPOCH;

    fn manifest_with(verification: Option<VerificationRecord>) -> Manifest {
        Manifest {
            program_version: "0.1.0".into(),
            manifest_version: "1".into(),
            name: "x.par2".into(),
            sha256: "abc".into(),
            creation: None,
            verification,
            repair: None,
        }
    }

    fn verification(time_secs: u64, duration_secs: u64, repair_needed: bool, repair_possible: bool) -> VerificationRecord {
        VerificationRecord {
            count: 1,
            count_corrupted: 0,
            time: UNIX_EPOCH + Duration::from_secs(time_secs),
            args: Vec::new(),
            exit_code: 0,
            repair_needed,
            repair_possible,
            duration: Duration::from_secs(duration_secs),
        }
    }

    fn job(path: &str, manifest: Option<Manifest>) -> Job {
        Job::new(PathBuf::from(path), manifest)
    }

    #[test]
    fn priority_orders_no_manifest_first_then_repair_then_healthy() {
        let mut jobs = vec![
            job("healthy.par2", Some(manifest_with(Some(verification(100, 10, false, true))))),
            job("needs-repair.par2", Some(manifest_with(Some(verification(100, 10, true, true))))),
            job("new.par2", None),
        ];
        sort_jobs(&mut jobs);
        assert_eq!(jobs[0].par2_path, PathBuf::from("new.par2"));
        assert_eq!(jobs[1].par2_path, PathBuf::from("needs-repair.par2"));
        assert_eq!(jobs[2].par2_path, PathBuf::from("healthy.par2"));
    }

    #[test]
    fn no_verification_record_ranks_above_verified_jobs() {
        let mut jobs = vec![
            job("healthy.par2", Some(manifest_with(Some(verification(100, 10, false, true))))),
            job("created-not-verified.par2", Some(manifest_with(None))),
        ];
        sort_jobs(&mut jobs);
        assert_eq!(jobs[0].par2_path, PathBuf::from("created-not-verified.par2"));
    }

    #[test]
    fn age_filter_drops_recently_verified_jobs() {
        let now = UNIX_EPOCH + Duration::from_secs(1000);
        let jobs = vec![
            job("fresh.par2", Some(manifest_with(Some(verification(999, 10, false, true))))),
            job("stale.par2", Some(manifest_with(Some(verification(0, 10, false, true))))),
            job("never.par2", None),
        ];
        let kept = filter_by_age(jobs, Some(Duration::from_secs(500)), now);
        let paths: Vec<_> = kept.iter().map(|j| j.par2_path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("stale.par2")));
        assert!(paths.contains(&PathBuf::from("never.par2")));
        assert!(!paths.contains(&PathBuf::from("fresh.par2")));
    }

    #[test]
    fn duration_budget_always_includes_first_job_even_if_oversized() {
        let mut jobs = vec![
            job("huge.par2", Some(manifest_with(Some(verification(0, 10_000, false, true))))),
            job("small.par2", Some(manifest_with(Some(verification(0, 1, false, true))))),
        ];
        jobs.truncate(2);
        let kept = filter_by_duration_budget(jobs, Some(Duration::from_secs(5)));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].par2_path, PathBuf::from("huge.par2"));
    }

    #[test]
    fn duration_budget_keeps_adding_while_under_budget() {
        let jobs = vec![
            job("a.par2", Some(manifest_with(Some(verification(0, 10, false, true))))),
            job("b.par2", Some(manifest_with(Some(verification(0, 10, false, true))))),
            job("c.par2", Some(manifest_with(Some(verification(0, 10, false, true))))),
        ];
        let kept = filter_by_duration_budget(jobs, Some(Duration::from_secs(25)));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn unknown_duration_job_is_always_included() {
        let jobs = vec![
            job("first.par2", Some(manifest_with(Some(verification(0, 5, false, true))))),
            job("unknown.par2", None),
            job("over-budget.par2", Some(manifest_with(Some(verification(0, 100, false, true))))),
        ];
        let kept = filter_by_duration_budget(jobs, Some(Duration::from_secs(5)));
        let paths: Vec<_> = kept.iter().map(|j| j.par2_path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("first.par2")));
        assert!(paths.contains(&PathBuf::from("unknown.par2")));
        assert!(!paths.contains(&PathBuf::from("over-budget.par2")));
    }

    #[test]
    fn no_max_duration_keeps_everything() {
        let jobs = vec![job("a.par2", None), job("b.par2", None)];
        let kept = filter_by_duration_budget(jobs, None);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn backlog_advisory_fires_when_capacity_exceeded() {
        let jobs = vec![job("a.par2", Some(manifest_with(Some(verification(0, 3600, false, true)))))];
        let options = ScheduleOptions {
            min_age: Some(Duration::from_secs(60)),
            max_duration: Some(Duration::from_secs(60)),
            run_interval: Some(Duration::from_secs(60)),
            args: Vec::new(),
        };
        let warnings = backlog_advisories(&jobs, Duration::from_secs(3600), &options);
        assert!(warnings.iter().any(|w| w.contains("backlog exceeds capacity")));
    }
}
