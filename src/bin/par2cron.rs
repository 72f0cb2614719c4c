//! Thin CLI wiring for `par2cron` (spec.md §1: the "invocation layer" is an
//! external collaborator; this binary is the minimal demonstration harness
//! that drives the library end to end, not the flag/config surface the
//! spec places out of scope).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use par2cron::enumerator::{self, EnumOptions};
use par2cron::error::ExitCode;
use par2cron::scheduler::runner::{CancellationToken, Clock, OsCommandRunner, SystemClock};
use par2cron::scheduler::{self, ScheduleOptions};
use par2cron::{analysis, error};

#[derive(Parser)]
#[command(name = "par2cron", version, about = "Scheduled re-verification of PAR2 archives")]
struct Cli {
    /// Directory to scan for `.par2` archives.
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    selection: Selection,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a bounded batch of archives (the default if no subcommand is given).
    Run,
    /// Report backlog health and verification-cycle progress without running anything.
    Report {
        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct Selection {
    /// Skip archives verified more recently than this many seconds.
    #[arg(long, value_name = "SECONDS")]
    min_age: Option<u64>,
    /// Stop adding jobs once their estimated total duration would exceed this many seconds.
    #[arg(long, value_name = "SECONDS")]
    max_duration: Option<u64>,
    /// How often (in seconds) the host scheduler invokes this program; used for advisories and reports.
    #[arg(long, value_name = "SECONDS")]
    run_interval: Option<u64>,
    /// Create jobs for archives with no sidecar manifest at all.
    #[arg(long)]
    include_external: bool,
    /// Skip archives whose sidecar is undecodable or has no creation record.
    #[arg(long)]
    skip_not_created: bool,
    /// Extra arguments forwarded to `par2 verify`, after `--`.
    #[arg(last = true)]
    par2_args: Vec<String>,
}

impl Selection {
    fn enum_options(&self) -> EnumOptions {
        EnumOptions {
            include_external: self.include_external,
            skip_not_created: self.skip_not_created,
        }
    }

    fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            min_age: self.min_age.map(Duration::from_secs),
            max_duration: self.max_duration.map(Duration::from_secs),
            run_interval: self.run_interval.map(Duration::from_secs),
            args: self.par2_args.clone(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.root, &cli.selection)?,
        Command::Report { json } => report(&cli.root, &cli.selection, json)?,
    };

    std::process::exit(exit_code.as_i32());
}

fn run(root: &PathBuf, selection: &Selection) -> Result<ExitCode> {
    let enum_result = enumerator::enumerate(root, &selection.enum_options())
        .context("failed to enumerate PAR2 archives")?;
    for warning in &enum_result.warnings {
        log::warn!("{}: {}", warning.path.display(), warning.message);
    }
    let had_enum_warnings = !enum_result.warnings.is_empty();

    let options = selection.schedule_options();
    let clock = SystemClock;
    let selected = scheduler::schedule(enum_result.jobs, &options, &clock);

    let known_total: Duration = selected
        .iter()
        .filter_map(|j| j.last_duration().filter(|d| *d > Duration::ZERO))
        .sum();
    for advisory in scheduler::backlog_advisories(&selected, known_total, &options) {
        log::warn!("{advisory}");
    }

    let runner = OsCommandRunner::default();
    // This demo binary doesn't wire a Ctrl-C handler of its own: spec.md §1
    // places the invocation layer (the thing that would own process signals)
    // out of the core's scope. An embedder with a real invocation layer
    // calls `cancel.cancel()` from wherever it handles SIGINT/SIGTERM.
    let cancel = CancellationToken::new();

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let summary = scheduler::run_all(selected, &options, &runner, &clock, &cancel, &mut stdout, &mut stderr);

    if summary.cancelled {
        return Ok(ExitCode::Unclassified);
    }

    Ok(error::aggregate(summary.exit_codes(), had_enum_warnings))
}

fn report(root: &PathBuf, selection: &Selection, json: bool) -> Result<ExitCode> {
    let enum_result = enumerator::enumerate(root, &selection.enum_options())
        .context("failed to enumerate PAR2 archives")?;
    let options = selection.schedule_options();

    let analysis = match analysis::analyze(&enum_result.jobs, &options, SystemClock.now()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            return Ok(e.exit_code());
        }
    };

    if json {
        println!("{}", analysis::render_json(&analysis)?);
    } else {
        print!("{}", analysis::render_text(&analysis));
    }

    Ok(ExitCode::Success)
}
