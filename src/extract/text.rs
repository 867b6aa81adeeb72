//! Text cleanup for extracted DOM fields.
//!
//! Biography text keeps its internal line structure and only loses the
//! leading heading echo and trailing "see more" artifacts; contact values
//! are single-line facts and get their whitespace runs collapsed.

/// Collapse internal whitespace runs (spaces, newlines, tabs) to single
/// spaces and trim the ends. `"  New\n York  "` becomes `"New York"`.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a redundant leading heading echo. Section text content usually
/// starts with the section's own heading repeated.
pub fn strip_heading_echo<'a>(text: &'a str, heading: &str) -> &'a str {
    let text = text.trim_start();
    match text.strip_prefix(heading) {
        Some(rest) => rest.trim_start(),
        None => text,
    }
}

/// Remove the "see more" expansion artifacts the page leaves inside section
/// text even after the control has been activated.
pub fn strip_see_more(text: &str) -> String {
    text.replace("...see more", "").replace("see more", "")
}
