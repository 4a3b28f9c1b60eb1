//! Pipeline lifecycle events.
//!
//! The pipeline reports each step of a request to an [`EventSink`]. Event
//! names are the constants in [`names`]; payloads are built with
//! [`payload`] so that every event carries the request id and a timestamp.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::{iso_timestamp, RequestId};
use serde_json::{Map, Value};

/// Event names emitted by the pipeline, in the order a request produces them.
pub mod names {
    /// A batch was staged and handed to the pipeline.
    pub const UPLOAD_RECEIVED: &str = "upload.received";
    /// Every staged file reached a non-empty size.
    pub const STABILITY_READY: &str = "stability.ready";
    /// The stability bound elapsed with files still pending.
    pub const STABILITY_TIMEOUT: &str = "stability.timeout";
    /// The stitcher was spawned.
    pub const PROCESS_STARTED: &str = "process.started";
    /// The stitcher exited, was killed, or failed to start.
    pub const PROCESS_EXITED: &str = "process.exited";
    /// A JSON result object was found in stdout.
    pub const PROCESS_RESULT: &str = "process.result";
    /// Output images were read.
    pub const ARTIFACTS_LOADED: &str = "artifacts.loaded";
    /// The request produced a success response.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// The request produced a failure response.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
}

/// Builds an event payload: `data`'s fields plus `request_id` and `timestamp`.
///
/// Non-object `data` is placed under a `value` key.
#[must_use]
pub fn payload(request_id: RequestId, data: Value) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert("request_id".to_string(), Value::String(request_id.to_string()));
    map.insert("timestamp".to_string(), Value::String(iso_timestamp()));
    Value::Object(map)
}
