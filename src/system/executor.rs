// src/system/executor.rs

use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("command `{0}` could not be executed: {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("failed to execute `{0}` command")]
    NonZeroExit(String),
    #[error("`{0}` did not finish within {secs} seconds", secs = .1.as_secs())]
    Timeout(String, Duration),
    #[error("`{0}` produced output that was not valid UTF-8")]
    InvalidUtf8(String),
    #[error("interrupted by the user")]
    Interrupted,
}

/// Captured output of a finished external command.
#[derive(Debug)]
pub struct CaptureResult {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program with captured stdout/stderr and a hard timeout.
///
/// The program is resolved on PATH first; a missing binary, a non-zero exit
/// and a timeout are all distinct typed failures. On non-zero exit the
/// captured stderr is logged before the error is returned.
pub fn capture_output(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CaptureResult, ExecutorError> {
    let binary =
        which::which(program).map_err(|_| ExecutorError::NotFound(program.to_string()))?;

    let mut command = Command::new(&binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!("run command: {} {}", binary.display(), args.join(" "));

    let mut child = command
        .spawn()
        .map_err(|e| ExecutorError::Spawn(program.to_string(), e))?;

    // The pipes are drained on separate threads so a chatty child cannot
    // deadlock against the timeout loop.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    if let Err(e) = child.kill() {
                        log::warn!("failed to kill timed-out `{}` (pid {}): {}", program, child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ExecutorError::Timeout(program.to_string(), timeout));
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(e) => return Err(ExecutorError::Spawn(program.to_string(), e)),
        }
    };

    let stdout = join_reader(stdout_reader, program)?;
    let stderr = join_reader(stderr_reader, program)?;

    if !status.success() {
        if !stderr.is_empty() {
            log::error!("{}: {}", program, stderr.trim_end());
        }
        return Err(ExecutorError::NonZeroExit(program.to_string()));
    }

    Ok(CaptureResult { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer).ok();
        buffer
    })
}

fn join_reader(
    handle: Option<thread::JoinHandle<Vec<u8>>>,
    program: &str,
) -> Result<String, ExecutorError> {
    let bytes = handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
    String::from_utf8(bytes).map_err(|_| ExecutorError::InvalidUtf8(program.to_string()))
}

/// Runs the final submission command with inherited standard streams and
/// returns its exit code. An interrupt (SIGINT) is surfaced as a distinct
/// error so the caller can exit with the conventional status.
pub fn run_inherited(binary: &Path, args: &[String]) -> Result<i32, ExecutorError> {
    let display = binary.display().to_string();
    let status = Command::new(binary)
        .args(args)
        .status()
        .map_err(|e| ExecutorError::Spawn(display.clone(), e))?;

    if let Some(code) = status.code() {
        return Ok(code);
    }
    match status.signal() {
        Some(libc_sigint) if libc_sigint == nix::sys::signal::Signal::SIGINT as i32 => {
            Err(ExecutorError::Interrupted)
        }
        Some(signal) => Ok(128 + signal),
        None => Ok(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_output_collects_stdout() {
        let result = capture_output("echo", &["hello"], Duration::from_secs(5)).unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn test_missing_binary_is_typed() {
        let err = capture_output("qslurm-no-such-binary", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ExecutorError::NotFound(_)));
    }

    #[test]
    fn test_non_zero_exit_is_typed() {
        let err = capture_output("false", &[], Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ExecutorError::NonZeroExit(_)));
    }

    #[test]
    fn test_timeout_kills_the_child() {
        let err = capture_output("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout(_, _)));
    }
}
