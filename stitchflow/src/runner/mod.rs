//! Subprocess runner for the external stitcher.
//!
//! One call to [`SubprocessRunner::run`] spawns the stitcher, drains its
//! stdout and stderr concurrently while it runs, waits for it to exit (or
//! kills it once the optional time bound passes) and classifies the result
//! into a [`ProcessOutcome`].

mod capture;
mod classify;
mod command;
pub mod scan;

pub use capture::DEFAULT_MAX_OUTPUT_BYTES;
pub use classify::{classify_failure, DLASCL_MARKER, DLASCL_REASON};
pub use command::{StitcherCommand, INPUT_DIR_ENV, OUTPUT_DIR_ENV};

use crate::core::{CompletedRun, ProcessFailure, ProcessOutcome};
use capture::{spawn_reader, StreamKind};
use serde_json::Value;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Conventional shell encoding of a signal death: 128 + signal number.
pub const EXIT_CODE_SIGNAL_BASE: i32 = 128;

/// Runs the stitcher and classifies its exit.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    command: StitcherCommand,
    timeout: Option<Duration>,
    output_limit: usize,
}

impl SubprocessRunner {
    /// Creates a runner with no time bound.
    #[must_use]
    pub const fn new(command: StitcherCommand) -> Self {
        Self {
            command,
            timeout: None,
            output_limit: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Sets the time bound; `None` waits for as long as the child runs.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the bytes kept per stream; the most recent bytes are kept.
    #[must_use]
    pub const fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    /// The command this runner launches.
    #[must_use]
    pub const fn command(&self) -> &StitcherCommand {
        &self.command
    }

    /// Launches the stitcher and waits for it.
    ///
    /// Never returns an error: launch failures, non-zero exits and timeouts
    /// are all [`ProcessOutcome::Failure`] values.
    pub async fn run(&self) -> ProcessOutcome {
        let started = Instant::now();
        let mut child = match self.command.to_command().spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %self.command.program(), error = %err, "failed to start stitcher");
                return ProcessOutcome::Failure(ProcessFailure::launch(format!(
                    "Failed to start process `{}`: {err}",
                    self.command.program()
                )));
            }
        };
        info!(command = %self.command.display(), pid = child.id(), "stitcher started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            if let Err(err) = child.start_kill() {
                warn!(error = %err, "failed to kill stitcher without output pipes");
            }
            return ProcessOutcome::Failure(ProcessFailure::launch(
                "Failed to start process: output pipes unavailable",
            ));
        };
        let stdout_reader = spawn_reader(stdout, StreamKind::Stdout, self.output_limit);
        let stderr_reader = spawn_reader(stderr, StreamKind::Stderr, self.output_limit);

        let expiry = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = expiry => None,
        };

        let status = match waited {
            Some(status) => status,
            None => {
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "failed to kill timed out stitcher");
                }
                if let Err(err) = child.wait().await {
                    warn!(error = %err, "failed to reap timed out stitcher");
                }
                let (stdout, stderr) = tokio::join!(stdout_reader.collect(), stderr_reader.collect());
                let limit = self.timeout.unwrap_or_default();
                warn!(timeout_ms = %limit.as_millis(), "stitcher timed out and was killed");
                return ProcessOutcome::Failure(ProcessFailure::timeout(limit, stdout, stderr));
            }
        };

        let (stdout, stderr) = tokio::join!(stdout_reader.collect(), stderr_reader.collect());
        let elapsed = started.elapsed();

        let status = match status {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "failed to wait for stitcher");
                return ProcessOutcome::Failure(ProcessFailure::exit(
                    crate::core::LAUNCH_FAILURE_EXIT_CODE,
                    format!("Failed to wait for process: {err}"),
                    stdout,
                    stderr,
                ));
            }
        };

        let code = exit_code(status);
        info!(code, elapsed_ms = %elapsed.as_millis(), "stitcher exited");

        if code == 0 {
            let result = success_result(&stdout);
            ProcessOutcome::Success(CompletedRun::new(stdout, stderr, result, elapsed))
        } else {
            let reason = classify_failure(code, &stdout, &stderr);
            ProcessOutcome::Failure(ProcessFailure::exit(code, reason, stdout, stderr))
        }
    }
}

/// Best-effort lookup of the result object on the success path.
fn success_result(stdout: &str) -> Option<Value> {
    let found = scan::find_result_object(stdout).map(Value::Object);
    match &found {
        Some(result) => info!("Stitching result: {result}"),
        None if stdout.contains("\"result\"") => {
            warn!("stitcher output mentions a result but no JSON object could be parsed");
        }
        None => debug!("no result object in stitcher output"),
    }
    found
}

/// Exit code, or 128 + signal for a child killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    crate::core::LAUNCH_FAILURE_EXIT_CODE
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::{FailureKind, TIMEOUT_EXIT_CODE};
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> SubprocessRunner {
        SubprocessRunner::new(StitcherCommand::new("/bin/sh").arg("-c").arg(script))
    }

    fn failure(outcome: ProcessOutcome) -> ProcessFailure {
        match outcome {
            ProcessOutcome::Failure(failure) => failure,
            ProcessOutcome::Success(run) => panic!("expected failure, got success: {run:?}"),
        }
    }

    #[tokio::test]
    async fn test_exit_zero_with_malformed_json_is_success() {
        let outcome = sh(r#"echo '{"result": "success", broken'; exit 0"#).run().await;
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        let run = outcome.into_result().unwrap();
        assert!(run.result().is_none());
        assert!(run.stdout().contains("broken"));
    }

    #[tokio::test]
    async fn test_exit_zero_surfaces_result_object() {
        let outcome = sh(r#"echo 'stitching...'; echo '{"result":"success","images":7}'"#)
            .run()
            .await;
        let run = outcome.into_result().unwrap();
        assert_eq!(run.result().map(|r| r["images"].clone()), Some(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn test_json_reason_from_stdout() {
        let outcome = sh(r#"echo '{"result":"error","reason":"bad input"}'; exit 137"#)
            .run()
            .await;
        let failure = failure(outcome);
        assert_eq!(failure.kind, FailureKind::Exit);
        assert_eq!(failure.exit_code, 137);
        assert_eq!(failure.reason, "bad input");
        assert!(failure.stdout.contains("bad input"));
    }

    #[tokio::test]
    async fn test_dlascl_in_stderr() {
        let outcome = sh("echo 'DLASCL parameter number 4 had an illegal value' >&2; exit 1")
            .run()
            .await;
        let failure = failure(outcome);
        assert_eq!(failure.reason, DLASCL_REASON);
        assert!(failure.stderr.contains("DLASCL"));
    }

    #[tokio::test]
    async fn test_silent_failure_uses_exit_code() {
        let failure = failure(sh("exit 1").run().await);
        assert_eq!(failure.reason, "Process exited with code 1");
        assert_eq!(failure.stdout, "");
        assert_eq!(failure.stderr, "");
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_failure() {
        let runner = SubprocessRunner::new(StitcherCommand::new("/nonexistent/stitcher-binary"));
        let failure = failure(runner.run().await);
        assert_eq!(failure.kind, FailureKind::Launch);
        assert_eq!(failure.exit_code, -1);
        assert!(failure.reason.starts_with("Failed to start process"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = std::time::Instant::now();
        let outcome = sh("echo started; sleep 30")
            .with_timeout(Some(Duration::from_millis(300)))
            .run()
            .await;
        let failure = failure(outcome);
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(failure.reason, "Process timed out after 300 ms");
        assert_eq!(failure.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_signal_death_maps_to_shell_code() {
        let failure = failure(sh("kill -9 $$").run().await);
        assert_eq!(failure.exit_code, EXIT_CODE_SIGNAL_BASE + 9);
        assert_eq!(failure.reason, "Process exited with code 137");
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        let script = "i=0; while [ $i -lt 4000 ]; do echo \"progress line $i padded to be long enough\"; echo \"warn $i\" >&2; i=$((i+1)); done";
        let outcome = sh(script)
            .with_timeout(Some(Duration::from_secs(30)))
            .run()
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout().lines().count(), 4000);
        assert_eq!(outcome.stderr().lines().count(), 4000);
    }

    #[tokio::test]
    async fn test_output_survives_a_grandchild_holding_the_pipes() {
        let outcome = sh(r#"echo '{"result":"failed","reason":"Need at least two images"}'; echo boom >&2; sleep 4 & exit 1"#)
            .run()
            .await;
        let failure = failure(outcome);
        assert_eq!(failure.exit_code, 1);
        assert_eq!(failure.reason, "Need at least two images");
        assert!(failure.stdout.contains("Need at least two images"));
        assert_eq!(failure.stderr, "boom\n");
    }

    #[tokio::test]
    async fn test_output_limit_keeps_the_result_object() {
        let script = r#"i=0; while [ $i -lt 2000 ]; do echo "progress line $i"; i=$((i+1)); done; echo '{"result":"failed","reason":"late reason"}'; exit 3"#;
        let failure = failure(sh(script).with_output_limit(4096).run().await);
        assert!(failure.stdout.len() <= 4096);
        assert!(failure.stdout.ends_with("\"late reason\"}\n"));
        assert!(!failure.stdout.contains("progress line 0\n"));
        assert_eq!(failure.reason, "late reason");
    }

    #[tokio::test]
    async fn test_child_sees_directory_environment() {
        let command = StitcherCommand::new("/bin/sh")
            .arg("-c")
            .arg("echo \"$STITCH_INPUT_DIR|$STITCH_OUTPUT_DIR\"")
            .env(INPUT_DIR_ENV, "/in")
            .env(OUTPUT_DIR_ENV, "/out");
        let outcome = SubprocessRunner::new(command).run().await;
        assert_eq!(outcome.stdout().trim(), "/in|/out");
    }
}
