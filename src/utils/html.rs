// src/utils/html.rs

use ammonia;

/// Clean free-text content using the ammonia library.
///
/// Descriptions, notes and responses are rendered in the portal UI, so they
/// are sanitized on write with a whitelist strategy: safe tags survive,
/// <script>/<iframe> and event-handler attributes do not. This is the
/// fail-safe against stored XSS in the dashboard.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags() {
        let cleaned = clean_html("hello <script>alert(1)</script><b>world</b>");
        assert!(!cleaned.contains("script"));
        assert!(cleaned.contains("<b>world</b>"));
    }
}
