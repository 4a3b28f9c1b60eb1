//! Tolerant extraction of the stitcher's JSON result object from free text.
//!
//! The stitcher interleaves progress messages with at most one JSON object
//! carrying a `"result"` key. The scanner walks the text for balanced
//! `{...}` spans (ignoring braces inside JSON strings), decodes each span,
//! and keeps objects that have a `result` field. Text that is not valid
//! JSON is skipped; scanning never fails.

use serde_json::{Map, Value};

/// Iterator over balanced-brace spans of `text`, outermost first.
///
/// A single pass pairs each `}` with the nearest open `{`. Quotes start a
/// JSON string only inside an open brace, and a line break inside a string
/// abandons every open candidate. Spans may nest, so callers see both an
/// outer object and the objects inside it.
pub fn json_spans(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut ranges = span_ranges(text);
    ranges.sort_unstable_by_key(|&(start, _)| start);
    ranges.into_iter().map(move |(start, end)| &text[start..end])
}

/// Byte ranges of balanced spans, in closing order.
fn span_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                b'\n' => {
                    in_string = false;
                    open.clear();
                }
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    ranges.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    ranges
}

/// All decodable objects in `text` that contain a `result` key, in order.
pub fn result_objects(text: &str) -> Vec<Map<String, Value>> {
    const KEY: &str = "\"result\"";
    let key_offsets: Vec<usize> = text.match_indices(KEY).map(|(i, _)| i).collect();
    let mentions_key = |start: usize, end: usize| {
        let first = key_offsets.partition_point(|&i| i < start);
        key_offsets.get(first).is_some_and(|&i| i + KEY.len() <= end)
    };

    let mut found = Vec::new();
    let mut consumed_until = 0usize;

    for span in json_spans(text) {
        let offset = span.as_ptr() as usize - text.as_ptr() as usize;
        let end = offset + span.len();
        if offset < consumed_until || !mentions_key(offset, end) {
            continue;
        }
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
            if map.contains_key("result") {
                consumed_until = end;
                found.push(map);
            }
        }
    }
    found
}

/// The last result object in `text`, if any.
#[must_use]
pub fn find_result_object(text: &str) -> Option<Map<String, Value>> {
    result_objects(text).pop()
}
