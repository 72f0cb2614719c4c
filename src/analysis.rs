//! C6: the informational analyser (spec.md §4.6). From the same manifests
//! the scheduler reads, computes backlog health (capacity vs. required
//! work) and verification-cycle progress, either as a structured
//! [`Analysis`] (for `--json`) or a human-readable report.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::error::ExitCode;
use crate::job::{Job, Stats};
use crate::scheduler::ScheduleOptions;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// spec.md §4.6: `RunInterval<=0` means there's no cadence to measure
    /// a verification cycle against at all.
    #[error("no run interval configured; cannot calculate cycle information")]
    NoRunInterval,
}

impl AnalysisError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::BadInvocation
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub job_count: usize,
    pub known_count: usize,
    pub unknown_count: usize,
    pub unverifieds: usize,
    pub healthies: usize,
    pub repairables: usize,
    pub unrepairables: usize,
    pub total_duration_secs: f64,
    pub avg_duration_secs: f64,
    pub largest_duration_secs: f64,
    pub largest_job: Option<String>,
    /// Set, with every other section omitted, when there's no duration
    /// history at all to compute anything from (spec.md §4.6).
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgeInfo {
    pub runs_per_cycle: u64,
    pub min_duration_secs: f64,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationInfo {
    pub runs_needed: u64,
    pub complete_in_one_run: bool,
    pub full_cycle_every_secs: Option<f64>,
    pub largest_job: Option<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacklogInfo {
    pub capacity_secs: f64,
    pub min_required_secs: f64,
    pub margin_secs: f64,
    pub healthy: bool,
    pub unknown_count: usize,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleInfo {
    pub verified_count: usize,
    pub verified_pct: f64,
    pub duration_covered_pct: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub summary: Summary,
    pub age: Option<AgeInfo>,
    pub duration: Option<DurationInfo>,
    pub backlog: Option<BacklogInfo>,
    pub cycle: Option<CycleInfo>,
}

/// Compute the full analysis for `jobs` under `options` (spec.md §4.6).
/// `options.run_interval` must be set (`>0`); everything else is optional
/// and simply omits the section(s) that depend on it.
pub fn analyze(jobs: &[Job], options: &ScheduleOptions, now: SystemTime) -> Result<Analysis, AnalysisError> {
    let run_interval = match options.run_interval {
        Some(ri) if ri > Duration::ZERO => ri,
        _ => return Err(AnalysisError::NoRunInterval),
    };

    let stats = Stats::compute(jobs);

    let summary = Summary {
        job_count: stats.job_count,
        known_count: stats.known_count,
        unknown_count: stats.unknown_count,
        unverifieds: stats.unverifieds,
        healthies: stats.healthies,
        repairables: stats.repairables,
        unrepairables: stats.unrepairables,
        total_duration_secs: stats.total_duration.as_secs_f64(),
        avg_duration_secs: stats.avg_duration.as_secs_f64(),
        largest_duration_secs: stats.largest_duration.as_secs_f64(),
        largest_job: stats.largest_job.clone(),
        warning: if stats.known_count == 0 {
            Some("No duration data available; run a verification pass first.".to_string())
        } else {
            None
        },
    };

    if stats.known_count == 0 {
        return Ok(Analysis { summary, age: None, duration: None, backlog: None, cycle: None });
    }

    let runs_per_cycle = options.min_age.map(|min_age| {
        ((min_age.as_secs_f64() / run_interval.as_secs_f64()).floor() as u64).max(1)
    });

    let age = options.min_age.filter(|d| *d > Duration::ZERO).map(|min_age| {
        let runs_per_cycle = runs_per_cycle.unwrap_or(1);
        let min_duration =
            (stats.total_duration / runs_per_cycle as u32).max(Duration::from_secs(1));
        AgeInfo {
            runs_per_cycle,
            min_duration_secs: min_duration.as_secs_f64(),
            warning: if min_age < run_interval {
                Some(format!(
                    "--min-age ({:.0}s) is shorter than --run-interval ({:.0}s); \
                     some archives may never be selected in time",
                    min_age.as_secs_f64(),
                    run_interval.as_secs_f64(),
                ))
            } else {
                None
            },
        }
    });

    let duration = options.max_duration.filter(|d| *d > Duration::ZERO).map(|max_duration| {
        let runs_needed =
            ((stats.total_duration.as_secs_f64() / max_duration.as_secs_f64()).ceil() as u64).max(1);
        let complete_in_one_run = stats.total_duration <= max_duration;
        let full_cycle_every_secs =
            (!complete_in_one_run).then(|| (run_interval * runs_needed as u32).as_secs_f64());
        let (largest_job, warning) = if stats.largest_duration > max_duration {
            (
                stats.largest_job.clone(),
                Some(format!(
                    "the largest known job ({}) is estimated at {:.0}s, exceeding --max-duration of {:.0}s",
                    stats.largest_job.clone().unwrap_or_else(|| "<unknown>".to_string()),
                    stats.largest_duration.as_secs_f64(),
                    max_duration.as_secs_f64(),
                )),
            )
        } else {
            (None, None)
        };
        DurationInfo {
            runs_needed,
            complete_in_one_run,
            full_cycle_every_secs,
            largest_job,
            warning,
        }
    });

    let backlog = match (options.min_age.filter(|d| *d > Duration::ZERO), options.max_duration.filter(|d| *d > Duration::ZERO)) {
        (Some(_), Some(max_duration)) => {
            let runs_per_cycle = runs_per_cycle.unwrap_or(1);
            let capacity_secs = (max_duration * runs_per_cycle as u32).as_secs_f64();
            let min_required_secs = stats.total_duration.as_secs_f64();
            // Signed, not a saturating subtraction: an unhealthy backlog
            // needs to report how far over capacity it is, not clamp at zero.
            let margin_secs = capacity_secs - min_required_secs;
            Some(BacklogInfo {
                capacity_secs,
                min_required_secs,
                margin_secs,
                healthy: margin_secs >= 0.0,
                unknown_count: stats.unknown_count,
                note: (stats.unknown_count > 0)
                    .then(|| "health assessment is based on known durations only".to_string()),
            })
        }
        _ => None,
    };

    let cycle = if let Some(min_age) = options.min_age.filter(|d| *d > Duration::ZERO) {
        if stats.total_duration > Duration::ZERO && stats.job_count > 0 {
            let window_start = now.checked_sub(min_age).unwrap_or(std::time::UNIX_EPOCH);
            let mut verified_count = 0usize;
            let mut verified_duration = Duration::ZERO;
            for job in jobs {
                if let Some(v) = job.manifest.as_ref().and_then(|m| m.verification.as_ref()) {
                    if v.time > window_start {
                        verified_count += 1;
                        verified_duration += v.duration;
                    }
                }
            }
            Some(CycleInfo {
                verified_count,
                verified_pct: verified_count as f64 / stats.job_count as f64 * 100.0,
                duration_covered_pct: verified_duration.as_secs_f64() / stats.total_duration.as_secs_f64() * 100.0,
                note: (stats.unknown_count > 0)
                    .then(|| "duration coverage excludes jobs with unknown duration".to_string()),
            })
        } else {
            None
        }
    } else {
        None
    };

    Ok(Analysis { summary, age, duration, backlog, cycle })
}

pub fn render_text(analysis: &Analysis) -> String {
    let mut out = String::new();
    let s = &analysis.summary;
    out.push_str(&format!(
        "{} archives tracked: {} unverified, {} healthy, {} repairable, {} unrepairable ({} with known duration, {} unknown)\n",
        s.job_count, s.unverifieds, s.healthies, s.repairables, s.unrepairables, s.known_count, s.unknown_count,
    ));
    if let Some(warning) = &s.warning {
        out.push_str(warning);
        out.push('\n');
        return out;
    }
    out.push_str(&format!(
        "total known verification time: {:.0}s (avg {:.0}s, largest {:.0}s{})\n",
        s.total_duration_secs,
        s.avg_duration_secs,
        s.largest_duration_secs,
        s.largest_job.as_deref().map(|n| format!(" on {n}")).unwrap_or_default(),
    ));

    if let Some(age) = &analysis.age {
        out.push_str(&format!(
            "age: {} runs per verification cycle, {:.0}s minimum per-run budget to keep up\n",
            age.runs_per_cycle, age.min_duration_secs,
        ));
        if let Some(w) = &age.warning {
            out.push_str(w);
            out.push('\n');
        }
    }

    if let Some(duration) = &analysis.duration {
        if duration.complete_in_one_run {
            out.push_str("duration: entire backlog completes in a single run\n");
        } else {
            out.push_str(&format!(
                "duration: {} runs needed, full cycle every ~{:.0}s\n",
                duration.runs_needed,
                duration.full_cycle_every_secs.unwrap_or(0.0),
            ));
        }
        if let Some(w) = &duration.warning {
            out.push_str(w);
            out.push('\n');
        }
    }

    if let Some(backlog) = &analysis.backlog {
        if backlog.healthy {
            out.push_str(&format!(
                "backlog: healthy, {:.0}s of capacity margin per cycle\n",
                backlog.margin_secs,
            ));
        } else {
            out.push_str(&format!(
                "INSANE CONFIGURATION: backlog unhealthy, {:.0}s over capacity per cycle \
                 ({:.0}s required against {:.0}s available)\n",
                -backlog.margin_secs, backlog.min_required_secs, backlog.capacity_secs,
            ));
        }
        if let Some(note) = &backlog.note {
            out.push_str(note);
            out.push('\n');
        }
    }

    if let Some(cycle) = &analysis.cycle {
        out.push_str(&format!(
            "cycle: {} archives verified within the current window ({:.1}% of archives, {:.1}% of known duration)\n",
            cycle.verified_count, cycle.verified_pct, cycle.duration_covered_pct,
        ));
        if let Some(note) = &cycle.note {
            out.push_str(note);
            out.push('\n');
        }
    }

    out
}

pub fn render_json(analysis: &Analysis) -> serde_json::Result<String> {
    serde_json::to_string_pretty(analysis)
}
