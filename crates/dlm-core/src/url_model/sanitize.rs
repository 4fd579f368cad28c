//! Portable filename sanitization.

/// Longest name most filesystems accept (bytes).
const NAME_MAX: usize = 255;

/// Makes `name` safe to use as a single path component.
///
/// Path separators, NUL, control characters and characters reserved on
/// common filesystems become `_` (runs collapsed); leading/trailing dots,
/// spaces and underscores are trimmed; the result is cut to 255 bytes on a
/// char boundary. Returns an empty string when nothing usable remains.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let bad = c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if bad {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
