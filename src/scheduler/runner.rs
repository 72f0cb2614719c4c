//! The `CommandRunner` and `Clock` seams (spec.md §5, §6): the scheduler's
//! core loop depends on these traits, never on `std::process` or
//! `SystemTime::now()` directly, so tests can drive it with a fake.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::scheduler::error::SchedulerError;

/// How long to wait after a cancelled job is sent SIGINT before it's
/// force-killed (spec.md §5).
pub const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// A cooperative stop signal shared between the scheduler's run loop and
/// whatever installs a Ctrl-C handler in the binary.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Abstracts `SystemTime::now()` so age/duration calculations are testable
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// The raw outcome of running the external tool once against one archive:
/// unclassified, because exit-code → repair-flags classification is the
/// scheduler's job (spec.md §4.5), not the runner's.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub cancelled: bool,
}

/// Drives the external verification tool for one archive (spec.md §6):
/// argv `["verify", <pass-through args>, "--", <par2 path>]`, working
/// directory set to the archive's containing directory, output routed to
/// the given sinks.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        par2_path: &Path,
        working_dir: &Path,
        args: &[String],
        cancel: &CancellationToken,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<RunOutput, SchedulerError>;
}

/// Spawns the real `par2 verify` subprocess, polling for completion so it
/// can react to cancellation: SIGINT first, then a hard kill after
/// [`CANCEL_GRACE`] if the child hasn't exited (spec.md §5).
pub struct OsCommandRunner {
    /// Name/path of the external binary to invoke. Exposed for tests that
    /// want to point this at a stub script instead of a real `par2`.
    pub program: String,
}

impl Default for OsCommandRunner {
    fn default() -> Self {
        OsCommandRunner { program: "par2".to_string() }
    }
}

impl CommandRunner for OsCommandRunner {
    fn run(
        &self,
        par2_path: &Path,
        working_dir: &Path,
        args: &[String],
        cancel: &CancellationToken,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<RunOutput, SchedulerError> {
        let started = Instant::now();
        let mut child = std::process::Command::new(&self.program)
            .arg("verify")
            .args(args)
            .arg("--")
            .arg(par2_path)
            .current_dir(working_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|source| SchedulerError::Spawn { path: par2_path.to_path_buf(), source })?;

        // Pipe reads block when the child has written nothing new yet, so
        // draining them inline in the poll loop below would also block
        // cancellation checks. Each pipe gets its own reader thread instead,
        // forwarding chunks back over a channel the poll loop never blocks on.
        let stdout_rx = spawn_pipe_reader(child.stdout.take());
        let stderr_rx = spawn_pipe_reader(child.stderr.take());

        let mut sigint_sent_at: Option<Instant> = None;
        let exit_status = loop {
            drain_channel(&stdout_rx, stdout);
            drain_channel(&stderr_rx, stderr);

            if let Some(status) = child
                .try_wait()
                .map_err(|source| SchedulerError::Wait { path: par2_path.to_path_buf(), source })?
            {
                break Some(status);
            }

            if cancel.is_cancelled() {
                match sigint_sent_at {
                    None => {
                        send_sigint(&child);
                        sigint_sent_at = Some(Instant::now());
                    }
                    Some(sent_at) if sent_at.elapsed() >= CANCEL_GRACE => {
                        child.kill().ok();
                        child
                            .wait()
                            .map_err(|source| SchedulerError::Wait { path: par2_path.to_path_buf(), source })?;
                        break None;
                    }
                    Some(_) => {}
                }
            }

            std::thread::sleep(Duration::from_millis(50));
        };

        // The child has exited (or been killed); its pipes are now closed,
        // so the reader threads will finish and these channels drain to empty.
        drain_channel(&stdout_rx, stdout);
        drain_channel(&stderr_rx, stderr);

        let duration = started.elapsed();
        match exit_status {
            None => Ok(RunOutput { exit_code: None, duration, cancelled: true }),
            Some(status) => Ok(RunOutput { exit_code: status.code(), duration, cancelled: false }),
        }
    }
}

/// Spawn a thread that copies a child pipe into a channel of chunks, one
/// `read()` call at a time. Returns a receiver that yields empty/closed once
/// the pipe hits EOF; `None` in means there's nothing to read (already
/// `Stdio::piped()` failed to hand back a handle), and the channel is
/// immediately closed.
fn spawn_pipe_reader<R: std::io::Read + Send + 'static>(source: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut r) = source {
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; 4096];
            loop {
                match r.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
    rx
}

fn drain_channel(rx: &mpsc::Receiver<Vec<u8>>, sink: &mut dyn Write) {
    while let Ok(chunk) = rx.try_recv() {
        sink.write_all(&chunk).ok();
    }
}

#[cfg(unix)]
fn send_sigint(child: &std::process::Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }
}

#[cfg(not(unix))]
fn send_sigint(_child: &std::process::Child) {
    // No portable SIGINT equivalent; the grace period still elapses and the
    // child is then hard-killed.
}

