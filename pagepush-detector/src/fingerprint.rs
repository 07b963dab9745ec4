//! Structured fingerprint of a generated listing page.
//!
//! The listing markup emits one `<div class="title">` per entry, followed by
//! `<div class="schedule">` and `<div class="description">`. Titles are
//! compared as an order-independent multiset; schedule and description are
//! compared per entry in document order.

use std::sync::OnceLock;

use regex::Regex;

use crate::DetectError;

const TITLE_PATTERN: &str = r#"<div class="title">([^<]+?)(?:<span|</div>)"#;
const SCHEDULE_PATTERN: &str = r#"<div class="schedule">([^<]*)</div>"#;
const DESCRIPTION_PATTERN: &str = r#"<div class="description">([^<]*)</div>"#;

/// Per-entry details in positional order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDetails {
    pub schedule: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    /// Sorted entry titles.
    pub titles: Vec<String>,
    pub entries: Vec<EntryDetails>,
}

impl Fingerprint {
    pub fn extract(html: &str) -> Result<Self, DetectError> {
        let mut titles: Vec<String> = captures(title_regex()?, html)
            .filter(|title| !title.is_empty())
            .collect();
        titles.sort();

        let mut entries: Vec<EntryDetails> = captures(schedule_regex()?, html)
            .map(|schedule| EntryDetails {
                schedule,
                description: None,
            })
            .collect();

        // Descriptions attach by position; extras without a schedule are dropped.
        for (entry, description) in entries
            .iter_mut()
            .zip(captures(description_regex()?, html))
        {
            entry.description = Some(description);
        }

        Ok(Self { titles, entries })
    }
}

fn captures<'a>(re: &'a Regex, html: &'a str) -> impl Iterator<Item = String> + 'a {
    re.captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn title_regex() -> Result<&'static Regex, DetectError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, TITLE_PATTERN)
}

fn schedule_regex() -> Result<&'static Regex, DetectError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, SCHEDULE_PATTERN)
}

fn description_regex() -> Result<&'static Regex, DetectError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, DESCRIPTION_PATTERN)
}

fn cached(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, DetectError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|err| DetectError::Pattern(err.clone()))
}
