//! Filename handling for staged uploads.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern is valid"));

/// Fallback used when a client sends no usable filename.
const FALLBACK_NAME: &str = "upload";

/// Reduces a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped, runs of characters outside
/// `[A-Za-z0-9._-]` collapse into `_`, and leading dots are stripped so the
/// result can never be `.`/`..` or a hidden file.
#[must_use]
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the on-disk name for an uploaded file: `<unix-millis>-<name>`.
#[must_use]
pub fn staged_file_name(millis: i64, original: &str) -> String {
    format!("{millis}-{}", sanitize_file_name(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_name_is_kept() {
        assert_eq!(sanitize_file_name("IMG_0001.jpg"), "IMG_0001.jpg");
    }

    #[test]
    fn test_directories_are_stripped() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(r"C:\Users\me\photo.JPG"), "photo.JPG");
    }

    #[test]
    fn test_unsafe_characters_collapse() {
        assert_eq!(sanitize_file_name("my photo (1).jpg"), "my_photo_1_.jpg");
    }

    #[test]
    fn test_hidden_and_empty_names_fall_back() {
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("dir/"), "upload");
        assert_eq!(sanitize_file_name(".bashrc"), "bashrc");
    }

    #[test]
    fn test_staged_name_prefix() {
        assert_eq!(staged_file_name(1_700_000_000_123, "a b.jpg"), "1700000000123-a_b.jpg");
    }
}
