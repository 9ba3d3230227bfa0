// src/models/mod.rs

use std::sync::LazyLock;

use regex::Regex;

pub mod actor;
pub mod audit;
pub mod exam;
pub mod request;
pub mod session;

/// Department tags are short machine identifiers ("moderation", "support",
/// "event_team"), not display names. Lowercase, no spaces.
static DEPARTMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,31}$").expect("department regex"));

pub(crate) fn is_valid_department(tag: &str) -> bool {
    DEPARTMENT_RE.is_match(tag)
}

/// Validates a single department tag (used by exam DTOs).
pub(crate) fn validate_department(tag: &str) -> Result<(), validator::ValidationError> {
    if !is_valid_department(tag) {
        return Err(validator::ValidationError::new("invalid_department"));
    }
    Ok(())
}

/// Validates a set of department tags (used by actor DTOs).
pub(crate) fn validate_departments(tags: &[String]) -> Result<(), validator::ValidationError> {
    if tags.len() > 8 {
        return Err(validator::ValidationError::new("too_many_departments"));
    }
    for tag in tags {
        if !is_valid_department(tag) {
            return Err(validator::ValidationError::new("invalid_department"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_tags_are_lowercase_identifiers() {
        assert!(is_valid_department("moderation"));
        assert!(is_valid_department("event_team"));
        assert!(is_valid_department("a"));
        assert!(!is_valid_department("Moderation"));
        assert!(!is_valid_department("mod team"));
        assert!(!is_valid_department(""));
        assert!(!is_valid_department("_support"));
    }
}
