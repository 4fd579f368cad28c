//! Candidate names for collision avoidance.

use super::MAX_COLLISION_CANDIDATES;

/// Compound extensions kept together when numbering (`a.tar.gz` -> `a (1).tar.gz`).
const COMPOUND_INNER: &[&str] = &["tar"];

/// Splits `name` into stem and extension (with its dot).
///
/// A leading dot does not start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let Some(dot) = name.rfind('.').filter(|&i| i > 0) else {
        return (name, "");
    };
    let (stem, ext) = name.split_at(dot);
    if let Some(inner) = stem.rfind('.').filter(|&i| i > 0) {
        if COMPOUND_INNER
            .iter()
            .any(|c| stem[inner + 1..].eq_ignore_ascii_case(c))
        {
            return name.split_at(inner);
        }
    }
    (stem, ext)
}

/// `name`, then `stem (1).ext`, `stem (2).ext`, ...
pub fn candidate_names(name: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_extension(name);
    std::iter::once(name.to_string())
        .chain((1..MAX_COLLISION_CANDIDATES).map(move |n| format!("{} ({}){}", stem, n, ext)))
}
