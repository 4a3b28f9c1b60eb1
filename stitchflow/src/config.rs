//! Runtime configuration.
//!
//! Every directory and limit the pipeline touches is an explicit value here
//! and is passed into the components that need it. Values come from
//! defaults, then from environment variables via [`StitchConfig::from_env`].

use crate::core::ArtifactPlan;
use crate::errors::ConfigError;
use crate::runner::DEFAULT_MAX_OUTPUT_BYTES;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Response shape served by the upload route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseVariant {
    /// `{message, data}` with the composite only; no diagnostics on failure.
    Minimal,
    /// All seven images on success; `details` with raw output on failure.
    #[default]
    Full,
}

impl FromStr for ResponseVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "full" => Ok(Self::Full),
            other => Err(ConfigError::invalid_value(
                "STITCH_VARIANT",
                other,
                "one of: minimal, full",
            )),
        }
    }
}

/// What happens to a request's staged uploads once its response is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Leave uploads on disk.
    #[default]
    Keep,
    /// Remove the request's uploads (and its isolated output directory).
    Delete,
}

impl FromStr for RetentionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "delete" => Ok(Self::Delete),
            other => Err(ConfigError::invalid_value(
                "STITCH_RETENTION",
                other,
                "one of: keep, delete",
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Configuration for the stitch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listening address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Root directory for staged uploads.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Root directory the stitcher writes images to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Executable that runs the stitcher.
    #[serde(default = "default_program")]
    pub program: String,
    /// Script passed as the sole argument to `program`.
    #[serde(default = "default_script")]
    pub script: Option<PathBuf>,
    /// Working directory for the child; inherited when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Response shape.
    #[serde(default)]
    pub variant: ResponseVariant,
    /// Whether the full variant fails when a face image is missing.
    #[serde(default = "default_true")]
    pub faces_required: bool,
    /// Upper bound on waiting for uploads to become non-empty.
    #[serde(default = "default_stability_timeout_ms")]
    pub stability_timeout_ms: u64,
    /// Sleep between stability probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on the stitcher's run time; 0 disables it.
    #[serde(default = "default_process_timeout_ms")]
    pub process_timeout_ms: u64,
    /// Maximum files accepted per batch.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Bytes of stdout and of stderr kept per run; the tail is kept.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Give every request its own upload and output subdirectory.
    ///
    /// When disabled, all requests stage into the upload root and the
    /// stitcher reads everything found there.
    #[serde(default = "default_true")]
    pub isolate_requests: bool,
    /// Cleanup of staged uploads.
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_port() -> u16 {
    3000
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("unconverted")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_program() -> String {
    "python3".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_script() -> Option<PathBuf> {
    Some(PathBuf::from("panorama_stitcher/main.py"))
}

const fn default_true() -> bool {
    true
}

const fn default_stability_timeout_ms() -> u64 {
    5000
}

const fn default_poll_interval_ms() -> u64 {
    50
}

const fn default_process_timeout_ms() -> u64 {
    10 * 60 * 1000
}

const fn default_max_files() -> usize {
    50
}

const fn default_max_body_bytes() -> usize {
    512 * 1024 * 1024
}

const fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_addr: default_bind_addr(),
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            program: default_program(),
            script: default_script(),
            working_dir: None,
            variant: ResponseVariant::default(),
            faces_required: default_true(),
            stability_timeout_ms: default_stability_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            process_timeout_ms: default_process_timeout_ms(),
            max_files: default_max_files(),
            max_body_bytes: default_max_body_bytes(),
            max_output_bytes: default_max_output_bytes(),
            isolate_requests: default_true(),
            retention: RetentionPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl StitchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overlaid with values returned by `lookup`.
    ///
    /// Unset variables keep their default; malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("PORT") {
            config.port = parse_var("PORT", &v, "a port number")?;
        }
        if let Some(v) = lookup("STITCH_BIND_ADDR") {
            config.bind_addr = parse_var("STITCH_BIND_ADDR", &v, "an IP address")?;
        }
        if let Some(v) = lookup("STITCH_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STITCH_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STITCH_PROGRAM") {
            config.program = v;
        }
        if let Some(v) = lookup("STITCH_SCRIPT") {
            config.script = if v.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = lookup("STITCH_WORKDIR") {
            config.working_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STITCH_VARIANT") {
            config.variant = v.parse()?;
        }
        if let Some(v) = lookup("STITCH_FACES_REQUIRED") {
            config.faces_required = parse_bool("STITCH_FACES_REQUIRED", &v)?;
        }
        if let Some(v) = lookup("STITCH_STABILITY_TIMEOUT_MS") {
            config.stability_timeout_ms =
                parse_var("STITCH_STABILITY_TIMEOUT_MS", &v, "a duration in milliseconds")?;
        }
        if let Some(v) = lookup("STITCH_POLL_INTERVAL_MS") {
            config.poll_interval_ms =
                parse_var("STITCH_POLL_INTERVAL_MS", &v, "a duration in milliseconds")?;
        }
        if let Some(v) = lookup("STITCH_PROCESS_TIMEOUT_MS") {
            config.process_timeout_ms =
                parse_var("STITCH_PROCESS_TIMEOUT_MS", &v, "a duration in milliseconds")?;
        }
        if let Some(v) = lookup("STITCH_MAX_FILES") {
            config.max_files = parse_var("STITCH_MAX_FILES", &v, "a file count")?;
        }
        if let Some(v) = lookup("STITCH_MAX_BODY_BYTES") {
            config.max_body_bytes = parse_var("STITCH_MAX_BODY_BYTES", &v, "a size in bytes")?;
        }
        if let Some(v) = lookup("STITCH_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_var("STITCH_MAX_OUTPUT_BYTES", &v, "a size in bytes")?;
        }
        if let Some(v) = lookup("STITCH_ISOLATE_REQUESTS") {
            config.isolate_requests = parse_bool("STITCH_ISOLATE_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("STITCH_RETENTION") {
            config.retention = v.parse()?;
        }
        if let Some(v) = lookup("STITCH_LOG") {
            config.log.filter = v;
        }
        if let Some(v) = lookup("STITCH_LOG_JSON") {
            config.log.json = parse_bool("STITCH_LOG_JSON", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::Invalid("stitcher program is empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        if self.max_files == 0 {
            return Err(ConfigError::Invalid("max files must be positive".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max body size must be positive".into()));
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid("max output size must be positive".into()));
        }
        Ok(())
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the upload root.
    #[must_use]
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the program and its script argument.
    #[must_use]
    pub fn with_command(mut self, program: impl Into<String>, script: Option<PathBuf>) -> Self {
        self.program = program.into();
        self.script = script;
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the response variant.
    #[must_use]
    pub const fn with_variant(mut self, variant: ResponseVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets whether faces are required in the full variant.
    #[must_use]
    pub const fn with_faces_required(mut self, required: bool) -> Self {
        self.faces_required = required;
        self
    }

    /// Sets the stability timeout.
    #[must_use]
    pub const fn with_stability_timeout_ms(mut self, ms: u64) -> Self {
        self.stability_timeout_ms = ms;
        self
    }

    /// Sets the process timeout (0 disables it).
    #[must_use]
    pub const fn with_process_timeout_ms(mut self, ms: u64) -> Self {
        self.process_timeout_ms = ms;
        self
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub const fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    /// Sets the maximum request body size.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the per-stream output capture limit.
    #[must_use]
    pub const fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Enables or disables per-request directories.
    #[must_use]
    pub const fn with_isolation(mut self, isolate: bool) -> Self {
        self.isolate_requests = isolate;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub const fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Socket address to listen on.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Stability timeout as a duration.
    #[must_use]
    pub const fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Process timeout, `None` when disabled.
    #[must_use]
    pub const fn process_timeout(&self) -> Option<Duration> {
        if self.process_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.process_timeout_ms))
        }
    }

    /// Artifacts to read for the configured variant.
    #[must_use]
    pub fn artifact_plan(&self) -> ArtifactPlan {
        match self.variant {
            ResponseVariant::Minimal => ArtifactPlan::composite_only(),
            ResponseVariant::Full => ArtifactPlan::with_faces(self.faces_required),
        }
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(var, value, expected))
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(var, value, "a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StitchConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.stability_timeout(), Duration::from_millis(5000));
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.max_files, 50);
        assert_eq!(config.variant, ResponseVariant::Full);
        assert_eq!(config.retention, RetentionPolicy::Keep);
        assert!(config.isolate_requests);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        let config = StitchConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StitchConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = StitchConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("STITCH_VARIANT", "Minimal"),
            ("STITCH_PROCESS_TIMEOUT_MS", "0"),
            ("STITCH_ISOLATE_REQUESTS", "no"),
            ("STITCH_MAX_OUTPUT_BYTES", "65536"),
            ("STITCH_RETENTION", "delete"),
            ("STITCH_SCRIPT", ""),
            ("STITCH_LOG_JSON", "1"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.variant, ResponseVariant::Minimal);
        assert_eq!(config.process_timeout(), None);
        assert!(!config.isolate_requests);
        assert_eq!(config.max_output_bytes, 65536);
        assert_eq!(config.retention, RetentionPolicy::Delete);
        assert_eq!(config.script, None);
        assert!(config.log.json);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = StitchConfig::from_lookup(lookup_from(&[("PORT", "http")])).unwrap_err();
        assert_eq!(err, ConfigError::invalid_value("PORT", "http", "a port number"));

        let err =
            StitchConfig::from_lookup(lookup_from(&[("STITCH_VARIANT", "huge")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = StitchConfig::from_lookup(lookup_from(&[("STITCH_ISOLATE_REQUESTS", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("a boolean"));
    }

    #[test]
    fn test_validation() {
        let err = StitchConfig::from_lookup(lookup_from(&[("STITCH_POLL_INTERVAL_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        assert!(StitchConfig::new().with_max_files(0).validate().is_err());
        assert!(StitchConfig::new().with_max_output_bytes(0).validate().is_err());
        assert!(StitchConfig::new().with_command(" ", None).validate().is_err());
    }

    #[test]
    fn test_artifact_plan_follows_variant() {
        let minimal = StitchConfig::new().with_variant(ResponseVariant::Minimal);
        assert_eq!(minimal.artifact_plan(), ArtifactPlan::composite_only());

        let full = StitchConfig::new().with_faces_required(false);
        assert_eq!(full.artifact_plan(), ArtifactPlan::with_faces(false));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: StitchConfig =
            serde_json::from_value(serde_json::json!({"port": 9000, "variant": "minimal"}))
                .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.variant, ResponseVariant::Minimal);
        assert_eq!(config.max_files, 50);
        assert!(config.isolate_requests);
    }
}
