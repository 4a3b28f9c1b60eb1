//! Failure reason classification.

use super::scan::find_result_object;
use serde_json::Value;

/// Marker the numerical library prints when it is handed degenerate input.
pub const DLASCL_MARKER: &str = "DLASCL";

/// Reason reported when stderr carries [`DLASCL_MARKER`].
pub const DLASCL_REASON: &str = "LAPACK error (DLASCL): Invalid image data or dimensions. Images may be corrupted, too small, or lack features for stitching.";

/// Picks the human-readable reason for a non-zero exit.
///
/// First match wins:
/// 1. the `reason` field of the JSON result object in stdout,
/// 2. [`DLASCL_REASON`] if stderr mentions [`DLASCL_MARKER`],
/// 3. trimmed stderr if it is not blank,
/// 4. `"Process exited with code {code}"`.
#[must_use]
pub fn classify_failure(exit_code: i32, stdout: &str, stderr: &str) -> String {
    if let Some(reason) = find_result_object(stdout).and_then(|obj| obj.get("reason").and_then(reason_text)) {
        return reason;
    }
    if stderr.contains(DLASCL_MARKER) {
        return DLASCL_REASON.to_string();
    }
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    format!("Process exited with code {exit_code}")
}

/// String reasons are used verbatim; other JSON values as their JSON text.
/// A `null` reason counts as absent.
fn reason_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_reason_has_priority() {
        let reason = classify_failure(
            137,
            r#"{"result":"error","reason":"bad input"}"#,
            "DLASCL parameter number 4 had an illegal value",
        );
        assert_eq!(reason, "bad input");
    }

    #[test]
    fn test_dlascl_marker() {
        let reason = classify_failure(1, "", "** On entry to DLASCL parameter number 4 had an illegal value");
        assert_eq!(reason, DLASCL_REASON);
    }

    #[test]
    fn test_trimmed_stderr() {
        assert_eq!(classify_failure(2, "progress\n", "\n  Traceback: boom  \n"), "Traceback: boom");
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(classify_failure(1, "", ""), "Process exited with code 1");
        assert_eq!(classify_failure(3, "", "  \n\t"), "Process exited with code 3");
    }

    #[test]
    fn test_result_without_reason_falls_through() {
        let reason = classify_failure(1, r#"{"result":"error"}"#, "stderr text");
        assert_eq!(reason, "stderr text");

        let reason = classify_failure(1, r#"{"result":"error","reason":null}"#, "");
        assert_eq!(reason, "Process exited with code 1");
    }

    #[test]
    fn test_non_string_reason_is_rendered_as_json() {
        let reason = classify_failure(1, r#"{"result":"error","reason":{"stage":"warp"}}"#, "");
        assert_eq!(reason, r#"{"stage":"warp"}"#);
    }
}
