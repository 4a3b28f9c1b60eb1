//! Classified outcome of one stitcher subprocess run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Exit code reported when the child process could not be started at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// Exit code reported when the child was killed for exceeding its time bound.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executable could not be spawned.
    Launch,
    /// The process ran and exited with a non-zero code.
    Exit,
    /// The process exceeded the configured wait bound and was killed.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch => write!(f, "launch"),
            Self::Exit => write!(f, "exit"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A failed run with its classified reason and the raw captured streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Exit code, or a sentinel for launch failures and timeouts.
    pub exit_code: i32,
    /// Human-readable reason chosen by the classifier.
    pub reason: String,
    /// Everything the child wrote to stdout.
    pub stdout: String,
    /// Everything the child wrote to stderr.
    pub stderr: String,
}

impl ProcessFailure {
    /// Creates a launch failure; no output was captured.
    #[must_use]
    pub fn launch(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Launch,
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            reason: reason.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Creates a failure for a process that exited with a non-zero code.
    #[must_use]
    pub fn exit(
        exit_code: i32,
        reason: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            kind: FailureKind::Exit,
            exit_code,
            reason: reason.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Creates a failure for a process killed after `limit`.
    #[must_use]
    pub fn timeout(limit: Duration, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            exit_code: TIMEOUT_EXIT_CODE,
            reason: format!("Process timed out after {} ms", limit.as_millis()),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.reason, self.exit_code)
    }
}

/// A run that exited with code 0.
///
/// Only the subprocess runner can create one, so holding a `CompletedRun`
/// proves the stitcher succeeded. Reading artifacts requires it.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    stdout: String,
    stderr: String,
    result: Option<serde_json::Value>,
    elapsed: Duration,
}

impl CompletedRun {
    pub(crate) fn new(
        stdout: String,
        stderr: String,
        result: Option<serde_json::Value>,
        elapsed: Duration,
    ) -> Self {
        Self {
            stdout,
            stderr,
            result,
            elapsed,
        }
    }

    /// Always 0.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        0
    }

    /// Captured stdout.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured stderr.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// The JSON result object found in stdout, if any. Diagnostic only.
    #[must_use]
    pub const fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Wall time between spawn and exit.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Result of running the external stitcher.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Exit code 0.
    Success(CompletedRun),
    /// Launch failure, non-zero exit, or timeout.
    Failure(ProcessFailure),
}

impl ProcessOutcome {
    /// Returns true for exit code 0.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the exit code (or sentinel).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Success(run) => run.exit_code(),
            Self::Failure(failure) => failure.exit_code,
        }
    }

    /// Returns the failure reason, if the run failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.reason),
        }
    }

    /// Captured stdout.
    #[must_use]
    pub fn stdout(&self) -> &str {
        match self {
            Self::Success(run) => run.stdout(),
            Self::Failure(failure) => &failure.stdout,
        }
    }

    /// Captured stderr.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Success(run) => run.stderr(),
            Self::Failure(failure) => &failure.stderr,
        }
    }

    /// Splits the outcome into the success proof or the failure.
    pub fn into_result(self) -> Result<CompletedRun, ProcessFailure> {
        match self {
            Self::Success(run) => Ok(run),
            Self::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_failure_uses_sentinel() {
        let failure = ProcessFailure::launch("No such file or directory");
        assert_eq!(failure.kind, FailureKind::Launch);
        assert_eq!(failure.exit_code, -1);
        assert!(failure.stdout.is_empty());
    }

    #[test]
    fn test_timeout_reason_mentions_limit() {
        let failure = ProcessFailure::timeout(Duration::from_millis(2500), "out", "");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(failure.reason, "Process timed out after 2500 ms");
        assert_eq!(failure.stdout, "out");
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = ProcessOutcome::Success(CompletedRun::new(
            "done".into(),
            String::new(),
            None,
            Duration::from_millis(5),
        ));
        assert!(ok.is_success());
        assert_eq!(ok.exit_code(), 0);
        assert_eq!(ok.reason(), None);
        assert_eq!(ok.stdout(), "done");

        let failed = ProcessOutcome::Failure(ProcessFailure::exit(2, "bad", "o", "e"));
        assert!(!failed.is_success());
        assert_eq!(failed.exit_code(), 2);
        assert_eq!(failed.reason(), Some("bad"));
        assert_eq!(failed.stderr(), "e");
        assert!(failed.into_result().is_err());
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_value(FailureKind::Timeout).unwrap();
        assert_eq!(json, serde_json::json!("timeout"));
        assert_eq!(FailureKind::Launch.to_string(), "launch");
    }
}
