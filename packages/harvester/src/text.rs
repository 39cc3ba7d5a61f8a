//! Text normalization shared by all sources.

use regex::Regex;
use std::sync::LazyLock;

/// Matches runs of whitespace.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trim and collapse internal whitespace runs to single spaces.
///
/// # Examples
/// ```
/// use course_harvester::text::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  COMPSCI   101 "), "COMPSCI 101");
/// ```
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Build the canonical "DEPT NNN" course number from its two parts.
///
/// # Examples
/// ```
/// use course_harvester::text::normalize_course_number;
///
/// assert_eq!(normalize_course_number(" CS ", " 101L"), "CS 101L");
/// ```
#[must_use]
pub fn normalize_course_number(subject: &str, catalog_nbr: &str) -> String {
    let subject = collapse_whitespace(subject);
    let catalog_nbr = collapse_whitespace(catalog_nbr);
    if catalog_nbr.is_empty() {
        return subject;
    }
    format!("{subject} {catalog_nbr}")
}

/// Derive the downstream document id from a university id and course number.
///
/// # Examples
/// ```
/// use course_harvester::text::course_document_id;
///
/// assert_eq!(course_document_id("duke", "CS 101"), "duke-cs_101");
/// assert_eq!(course_document_id("duke", "ARTS-HIST 90S"), "duke-arts_hist_90s");
/// ```
#[must_use]
pub fn course_document_id(university_id: &str, number: &str) -> String {
    let slug = collapse_whitespace(number)
        .replace('-', "_")
        .to_lowercase()
        .split(' ')
        .collect::<Vec<_>>()
        .join("_");
    format!("{university_id}-{slug}")
}
