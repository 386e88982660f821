//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a natural-language rule description
pub const MAX_QUERY_LEN: usize = 1000;

/// Regex for validating backend segment identifiers
static SEGMENT_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("segment id regex is valid")
});

/// Validate a segment identifier before it is placed in a URL
pub fn validate_segment_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && SEGMENT_ID_REGEX.is_match(id)
}

/// Validate a natural-language description sent to the rule generator
pub fn validate_generation_query(query: &str) -> bool {
    let trimmed = query.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_QUERY_LEN
}
