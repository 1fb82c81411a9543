// src/analysis/loop_guard.rs
// Keeps the service from analyzing its own output

/// Title markers that identify content this service wrote itself.
/// Matched case-insensitively anywhere in the title.
const TITLE_MARKERS: [&str; 2] = ["[vigil]", "automated tests for"];

/// Branch prefixes reserved for companion changes we create
const BRANCH_PREFIXES: [&str; 2] = ["vigil/", "vigil-tests/"];

/// True when the change was generated by this service. Must be evaluated
/// before any side effect; a true result ends the run successfully.
pub fn is_self_generated(title: &str, branch: &str) -> bool {
    let title = title.to_lowercase();
    if TITLE_MARKERS.iter().any(|marker| title.contains(marker)) {
        return true;
    }
    BRANCH_PREFIXES
        .iter()
        .any(|prefix| branch.starts_with(prefix))
}
