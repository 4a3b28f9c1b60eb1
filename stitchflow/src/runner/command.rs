//! The external stitcher invocation.

use crate::config::StitchConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable naming the directory the child should read images from.
pub const INPUT_DIR_ENV: &str = "STITCH_INPUT_DIR";

/// Environment variable naming the directory the child should write images to.
pub const OUTPUT_DIR_ENV: &str = "STITCH_OUTPUT_DIR";

/// A fixed executable, its arguments, and the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitcherCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl StitcherCommand {
    /// Creates a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Builds the configured stitcher invocation for one request's directories.
    #[must_use]
    pub fn from_config(config: &StitchConfig, input_dir: &Path, output_dir: &Path) -> Self {
        let mut command = Self::new(config.program.clone());
        if let Some(script) = &config.script {
            command = command.arg(script.to_string_lossy());
        }
        if let Some(dir) = &config.working_dir {
            command = command.current_dir(dir);
        }
        command
            .env(INPUT_DIR_ENV, input_dir.to_string_lossy())
            .env(OUTPUT_DIR_ENV, output_dir.to_string_lossy())
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Executable name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments joined for logging.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Builds a tokio command with stdin closed and both output streams piped.
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}
