//! Target URL validation and filename derivation.
//!
//! A download's final name comes from, in order: the caller's explicit
//! filename, the engine's suggestion (Content-Disposition), the last URL path
//! segment, and finally [`DEFAULT_FILENAME`]. Every candidate is sanitized
//! before use.

mod content_disposition;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Used when nothing else yields a usable name.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Why a target string is not a downloadable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetProblem {
    Empty,
    Unparseable(String),
    UnsupportedScheme(String),
    MissingHost,
}

impl std::fmt::Display for TargetProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetProblem::Empty => write!(f, "target is empty"),
            TargetProblem::Unparseable(e) => write!(f, "not a valid URL ({})", e),
            TargetProblem::UnsupportedScheme(s) => write!(f, "unsupported scheme `{}`", s),
            TargetProblem::MissingHost => write!(f, "URL has no host"),
        }
    }
}

/// Checks that `target` is an absolute http(s) URL with a host.
pub fn validate_target(target: &str) -> Result<url::Url, TargetProblem> {
    if target.trim().is_empty() {
        return Err(TargetProblem::Empty);
    }
    let parsed = url::Url::parse(target).map_err(|e| TargetProblem::Unparseable(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(TargetProblem::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(TargetProblem::MissingHost);
    }
    Ok(parsed)
}

/// Picks the final filename for a download.
pub fn resolve_filename(explicit: Option<&str>, suggested: Option<&str>, url: &str) -> String {
    let from_url = filename_from_url_path(url);
    let name = [explicit, suggested, from_url.as_deref()]
        .into_iter()
        .flatten()
        .map(sanitize_filename)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    name
}
