//! Subprocess execution with progress tailing, exit-code-is-truth, and the
//! timeout→SIGTERM→grace→kill sequence (spec.md §4.6).

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use recon_models::{ReconError, ReconResult, StageKind};
use tracing::{info, warn};

use crate::args::StageCommand;
use crate::progress::{default_patterns, extract_progress};

const TAIL_CAPACITY_BYTES: usize = 4 * 1024;
const GRACE_PERIOD: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run one toolchain subprocess to completion, feeding normalized progress
/// fractions parsed from its output to `on_progress` (spec.md §4.6).
///
/// The subprocess's exit code alone determines success. Output beyond the
/// progress regexes is never interpreted; only the trailing 4 KiB is kept,
/// as the `StageFailed` reason.
pub fn run_stage(
    stage: StageKind,
    command: &StageCommand,
    timeout: Duration,
    on_progress: impl FnMut(f64),
) -> ReconResult<()> {
    run_stage_cancellable(stage, command, timeout, &AtomicBool::new(false), on_progress)
}

/// As [`run_stage`], but also polled against `cancel`: if it becomes `true`
/// while the subprocess is running, the same signal→grace→kill sequence used
/// for a timeout is applied and `StageCancelled` is returned.
pub fn run_stage_cancellable(
    stage: StageKind,
    command: &StageCommand,
    timeout: Duration,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(f64),
) -> ReconResult<()> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ReconError::io_error(command.program.clone(), e))?;

    let (tx, rx) = mpsc::channel::<String>();

    let stdout = child.stdout.take().expect("stdout was piped");
    let stdout_tx = tx.clone();
    let stdout_thread = std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if stdout_tx.send(line).is_err() {
                break;
            }
        }
    });

    let stderr = child.stderr.take().expect("stderr was piped");
    let stderr_thread = std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let patterns = default_patterns();
    let mut tail = String::new();
    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let mut cancelled = false;

    loop {
        if cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if let Some(fraction) = extract_progress(&patterns, &line) {
                    on_progress(fraction);
                }
                append_tail(&mut tail, &line);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(status) = child.try_wait().map_err(|e| ReconError::io_error(&command.program, e))? {
                    drop(status);
                    break;
                }
                if Instant::now() >= deadline {
                    timed_out = true;
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if child.try_wait().map_err(|e| ReconError::io_error(&command.program, e))?.is_some() {
                    break;
                }
            }
        }
    }

    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    if cancelled {
        info!(?stage, "stage cancelled, signalling subprocess");
        terminate_with_grace(&mut child);
        return Err(ReconError::StageCancelled);
    }

    if timed_out {
        warn!(?stage, "stage exceeded timeout, signalling subprocess");
        terminate_with_grace(&mut child);
        return Err(ReconError::StageTimeout(stage));
    }

    let status = child.wait().map_err(|e| ReconError::io_error(&command.program, e))?;
    if status.success() {
        info!(?stage, "stage completed");
        Ok(())
    } else {
        Err(ReconError::StageFailed { stage, exit_code: status.code(), tail })
    }
}

fn append_tail(tail: &mut String, line: &str) {
    tail.push_str(line);
    tail.push('\n');
    if tail.len() > TAIL_CAPACITY_BYTES {
        let excess = tail.len() - TAIL_CAPACITY_BYTES;
        let mut boundary = excess;
        while !tail.is_char_boundary(boundary) {
            boundary += 1;
        }
        tail.drain(..boundary);
    }
}

#[cfg(unix)]
fn terminate_with_grace(child: &mut std::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    let _ = kill(pid, Signal::SIGTERM);

    let grace_deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < grace_deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate_with_grace(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_buffer_stays_bounded() {
        let mut tail = String::new();
        for i in 0..2000 {
            append_tail(&mut tail, &format!("line {i}"));
        }
        assert!(tail.len() <= TAIL_CAPACITY_BYTES + 32);
    }

    #[test]
    fn successful_command_reports_progress_and_succeeds() {
        let command = StageCommand { program: "echo".into(), args: vec!["image 1 of 1".into()] };
        let mut seen = Vec::new();
        let result = run_stage(StageKind::Features, &command, Duration::from_secs(5), |f| seen.push(f));
        assert!(result.is_ok());
        assert_eq!(seen, vec![1.0]);
    }

    #[test]
    fn nonzero_exit_is_stage_failed() {
        let command = StageCommand { program: "false".into(), args: vec![] };
        let result = run_stage(StageKind::Matches, &command, Duration::from_secs(5), |_| {});
        assert!(matches!(result, Err(ReconError::StageFailed { .. })));
    }

    #[test]
    fn cancel_flag_stops_a_long_running_command() {
        let command = StageCommand { program: "sleep".into(), args: vec!["30".into()] };
        let cancel = AtomicBool::new(false);
        let cancel_ref = &cancel;
        std::thread::scope(|scope| {
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                cancel_ref.store(true, Ordering::SeqCst);
            });
            let result = run_stage_cancellable(StageKind::Matches, &command, Duration::from_secs(30), &cancel, |_| {});
            assert!(matches!(result, Err(ReconError::StageCancelled)));
        });
    }
}
