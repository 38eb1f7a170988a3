//! Matching model-requested column names against the dataset's real headers

use std::collections::HashSet;

/// Resolve requested column names to actual headers.
///
/// Matching is case-insensitive; the result uses the actual header casing and
/// the requested order. Unknown names are dropped and repeats collapse to the
/// first occurrence. When nothing matches (or nothing was requested) every
/// actual header is kept.
pub fn resolve(requested: &[String], actual: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let resolved: Vec<String> = requested
        .iter()
        .filter_map(|name| {
            let wanted = name.to_lowercase();
            actual.iter().find(|header| header.to_lowercase() == wanted)
        })
        .filter(|header| seen.insert(header.as_str()))
        .cloned()
        .collect();

    if resolved.is_empty() {
        if !requested.is_empty() {
            log::debug!("No requested column matched {requested:?}; keeping all headers");
        }
        return actual.to_vec();
    }
    resolved
}
