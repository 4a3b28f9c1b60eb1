//! Small helpers shared across the crate.
//!
//! Timestamps for responses and stored filenames, request identifiers used
//! to key per-request directories, and sanitising of client-supplied
//! filenames.

mod ids;
pub mod naming;
pub mod timestamps;

pub use ids::RequestId;
pub use naming::{sanitize_file_name, staged_file_name};
pub use timestamps::{iso_timestamp, unix_millis, Timestamp};
