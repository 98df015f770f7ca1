//! Sensitive-pattern detection and redaction
//!
//! The filter applies an ordered set of independent regex detectors. Each
//! detector that matches replaces all of its occurrences with a fixed
//! placeholder and records its name. The token heuristic (any contiguous
//! alphanumeric/dash/underscore run of 20+ characters) trades false
//! positives for never persisting a raw credential.

use crate::error::{Error, Result};
use regex::Regex;

/// Result of scrubbing a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubOutcome {
    /// Text with all detected spans replaced by placeholders
    pub text: String,
    /// Whether any detector fired
    pub has_pii: bool,
    /// Names of the detectors that fired, in detector order
    pub triggered: Vec<String>,
}

struct Detector {
    name: &'static str,
    pattern: Regex,
    placeholder: &'static str,
}

/// Stateless scrubber for sensitive content
pub struct PrivacyFilter {
    detectors: Vec<Detector>,
}

impl PrivacyFilter {
    /// Create a filter with the default detector set
    pub fn new() -> Result<Self> {
        let specs: [(&'static str, &'static str, &'static str); 6] = [
            (
                "email",
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                "[EMAIL]",
            ),
            (
                "phone",
                r"(?:\+\d{1,2}\s)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
                "[PHONE]",
            ),
            ("national_id", r"\b\d{3}-\d{2}-\d{4}\b", "[NATIONAL_ID]"),
            (
                "card_number",
                r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
                "[CARD_NUMBER]",
            ),
            ("ipv4", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "[IP_ADDRESS]"),
            ("secret_token", r"[A-Za-z0-9_-]{20,}", "[TOKEN]"),
        ];

        let detectors = specs
            .into_iter()
            .map(|(name, pattern, placeholder)| {
                let pattern = Regex::new(pattern).map_err(|e| {
                    Error::Privacy(format!("Invalid pattern for detector '{}': {}", name, e))
                })?;
                Ok(Detector {
                    name,
                    pattern,
                    placeholder,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { detectors })
    }

    /// Scrub text, replacing every detected span with its placeholder.
    ///
    /// Detectors are independent: multiple may fire on the same input, and
    /// each runs against the text as redacted by its predecessors.
    pub fn scrub(&self, text: &str) -> ScrubOutcome {
        let mut result = text.to_string();
        let mut triggered = Vec::new();

        for detector in &self.detectors {
            if detector.pattern.is_match(&result) {
                result = detector
                    .pattern
                    .replace_all(&result, detector.placeholder)
                    .into_owned();
                triggered.push(detector.name.to_string());
            }
        }

        ScrubOutcome {
            has_pii: !triggered.is_empty(),
            text: result,
            triggered,
        }
    }

    /// Check whether text contains any sensitive span
    pub fn contains_sensitive(&self, text: &str) -> bool {
        self.detectors.iter().any(|d| d.pattern.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PrivacyFilter {
        PrivacyFilter::new().unwrap()
    }

    #[test]
    fn test_clean_text_untouched() {
        let outcome = filter().scrub("User prefers dark mode in the editor");
        assert!(!outcome.has_pii);
        assert!(outcome.triggered.is_empty());
        assert_eq!(outcome.text, "User prefers dark mode in the editor");
    }

    #[test]
    fn test_email_redacted() {
        let outcome = filter().scrub("Reach me at sam@example.com anytime");
        assert!(outcome.has_pii);
        assert_eq!(outcome.triggered, vec!["email"]);
        assert_eq!(outcome.text, "Reach me at [EMAIL] anytime");
    }

    #[test]
    fn test_phone_redacted() {
        let outcome = filter().scrub("Call 555-123-4567 after lunch");
        assert_eq!(outcome.triggered, vec!["phone"]);
        assert!(outcome.text.contains("[PHONE]"));
        assert!(!outcome.text.contains("555-123-4567"));
    }

    #[test]
    fn test_national_id_redacted() {
        let outcome = filter().scrub("SSN 123-45-6789 on file");
        assert_eq!(outcome.triggered, vec!["national_id"]);
        assert_eq!(outcome.text, "SSN [NATIONAL_ID] on file");
    }

    #[test]
    fn test_card_number_redacted() {
        let outcome = filter().scrub("card 4111-1111-1111-1111 expires soon");
        assert!(outcome.triggered.contains(&"card_number".to_string()));
        assert!(outcome.text.contains("[CARD_NUMBER]"));
        assert!(!outcome.text.contains("4111"));
    }

    #[test]
    fn test_ipv4_redacted() {
        let outcome = filter().scrub("server at 192.168.0.10 is down");
        assert_eq!(outcome.triggered, vec!["ipv4"]);
        assert_eq!(outcome.text, "server at [IP_ADDRESS] is down");
    }

    #[test]
    fn test_long_token_redacted() {
        let outcome = filter().scrub("api key sk_live_abcdefghij1234567890 leaked");
        assert_eq!(outcome.triggered, vec!["secret_token"]);
        assert!(outcome.text.contains("[TOKEN]"));
    }

    #[test]
    fn test_multiple_detectors_fire_independently() {
        let outcome = filter().scrub("mail sam@example.com, ip 10.0.0.1");
        assert_eq!(outcome.triggered, vec!["email", "ipv4"]);
        assert!(outcome.text.contains("[EMAIL]"));
        assert!(outcome.text.contains("[IP_ADDRESS]"));
    }

    #[test]
    fn test_all_occurrences_replaced() {
        let outcome = filter().scrub("a@b.io wrote to c@d.io");
        assert_eq!(outcome.triggered, vec!["email"]);
        assert_eq!(outcome.text, "[EMAIL] wrote to [EMAIL]");
    }

    #[test]
    fn test_deterministic() {
        let input = "Email sam@example.com, card 4111 1111 1111 1111";
        let first = filter().scrub(input);
        let second = filter().scrub(input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_contains_sensitive() {
        let f = filter();
        assert!(f.contains_sensitive("ping 10.0.0.1"));
        assert!(!f.contains_sensitive("nothing to see"));
    }
}
