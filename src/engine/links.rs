//! Link detection and allowlist matching for the Links detector.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// Compiled once at first use, never per message.
static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://)?(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}(?::\d{1,5})?(?:/[^\s]*)?",
    )
    .expect("link pattern is valid")
});

/// Scan `text` for URL-like substrings and reduce each match to its
/// comparison value: the substring from the first `?` onward when a
/// query is present, otherwise the whole match.
pub fn find_link_candidates(text: &str) -> Vec<String> {
    LINK_PATTERN
        .find_iter(text)
        .map(|m| comparison_value(m.as_str()).to_string())
        .collect()
}

fn comparison_value(link: &str) -> &str {
    match link.find('?') {
        Some(idx) => &link[idx..],
        None => link,
    }
}

/// Pure allowlist check: the subset of `candidates` not covered by the
/// channel allowlist. `allowlist` entries must already be lowercased;
/// candidates are compared case-insensitively.
pub fn uncovered_candidates(candidates: &[String], allowlist: &HashSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|candidate| !allowlist.contains(&candidate.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist(entries: &[&str]) -> HashSet<String> {
        entries.iter().map(|e| e.to_lowercase()).collect()
    }

    #[test]
    fn detects_bare_domains_and_full_urls() {
        assert_eq!(find_link_candidates("go to google.com now"), vec!["google.com"]);
        assert_eq!(
            find_link_candidates("see https://example.org/page"),
            vec!["https://example.org/page"]
        );
    }

    #[test]
    fn plain_text_has_no_candidates() {
        assert!(find_link_candidates("just chatting about rust").is_empty());
    }

    #[test]
    fn query_string_becomes_the_comparison_value() {
        let candidates = find_link_candidates("example.com/watch?v=abc");
        assert_eq!(candidates, vec!["?v=abc"]);
    }

    #[test]
    fn allowlisted_link_is_covered() {
        let candidates = find_link_candidates("google.com");
        assert!(uncovered_candidates(&candidates, &allowlist(&["google.com"])).is_empty());
    }

    #[test]
    fn allowlist_comparison_is_case_insensitive() {
        let candidates = find_link_candidates("GOOGLE.COM");
        assert!(uncovered_candidates(&candidates, &allowlist(&["google.com"])).is_empty());
    }

    #[test]
    fn uncovered_link_among_covered_ones_is_reported() {
        let candidates = find_link_candidates("google.com evil.com");
        let uncovered = uncovered_candidates(&candidates, &allowlist(&["google.com"]));
        assert_eq!(uncovered, vec!["evil.com"]);
    }
}
