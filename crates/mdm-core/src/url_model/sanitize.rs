//! Portable filename sanitization.

/// Maximum length (in characters) of a sanitized filename.
pub const MAX_FILENAME_CHARS: usize = 100;

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replaces `<>:"/\|?*` and control characters (NUL included) with `_`, then
/// truncates to [`MAX_FILENAME_CHARS`] characters.
///
/// Spaces, dots and everything else pass through untouched, so a title reads
/// the same on disk as it did on the page. Callers decide what an empty or
/// blank result falls back to.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect()
}
