//! Request pipeline.
//!
//! This module provides:
//! - [`StitchPipeline`], which sequences watcher, runner and assembler
//! - Per-request directory resolution and retention cleanup
//! - Per-output-directory locking of stitcher runs

mod locks;
mod stitch;
mod workspace;

pub use locks::OutputLocks;
pub use stitch::StitchPipeline;
pub use workspace::RequestDirs;
pub(crate) use workspace::discard_request;
