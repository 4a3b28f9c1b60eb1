//! # Stitchflow
//!
//! An HTTP front end for an external panorama stitcher.
//!
//! A request uploads a batch of images. Stitchflow then:
//!
//! - **Waits for the uploads to land**: [`watcher::StabilityWatcher`] polls until
//!   every file exists and is non-empty, with a bounded wait
//! - **Runs the stitcher**: [`runner::SubprocessRunner`] launches the configured
//!   program, drains its output while it runs and classifies the exit
//! - **Collects the images**: [`assembler::ResultAssembler`] reads the composite
//!   and cube faces the stitcher wrote, only after a successful run
//! - **Answers the request**: [`server`] renders either the images as base64 or
//!   a structured failure with the classified reason
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stitchflow::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StitchConfig::from_env()?;
//! let pipeline = StitchPipeline::new(config.clone());
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//! stitchflow::server::serve(listener, build_router(pipeline)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assembler;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod utils;
pub mod watcher;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assembler::ResultAssembler;
    pub use crate::config::{LogConfig, ResponseVariant, RetentionPolicy, StitchConfig};
    pub use crate::core::{
        ArtifactPlan, ArtifactRole, CompletedRun, FailureKind, ProcessFailure, ProcessOutcome,
        StagedFile, StitchArtifacts, UploadBatch,
    };
    pub use crate::errors::{ConfigError, Result, StitchflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{RequestDirs, StitchPipeline};
    pub use crate::runner::{StitcherCommand, SubprocessRunner};
    pub use crate::server::{build_router, AppState};
    pub use crate::utils::{iso_timestamp, RequestId, Timestamp};
    pub use crate::watcher::{StabilityCheckResult, StabilityWatcher};
}
