//! Rule-based extraction of memory candidates from interaction text
//!
//! Extraction is an ordered list of matcher+handler pairs, deterministic
//! and regex-driven (no LLM). New rules are added here without touching
//! the store: the extractor only produces [`MemoryCandidate`]s, which
//! callers feed to `remember`.

use crate::error::{Error, Result};
use crate::memory::record::{MemoryCandidate, MemoryKind};
use regex::Regex;

/// One matcher+handler pair
struct ExtractionRule {
    name: &'static str,
    pattern: Regex,
    kind: MemoryKind,
    category: &'static str,
    confidence: f32,
    /// Turns the captured payload into memory content
    handler: fn(&str) -> String,
}

/// Ordered, pluggable extraction rule set
pub struct Extractor {
    rules: Vec<ExtractionRule>,
}

impl Extractor {
    /// Create an extractor with the default rule set
    pub fn new() -> Result<Self> {
        let specs: Vec<(
            &'static str,
            &'static str,
            MemoryKind,
            &'static str,
            f32,
            fn(&str) -> String,
        )> = vec![
            (
                "stated_name",
                r"(?i)\bmy name is\s+([A-Za-z][A-Za-z '-]{0,40}?)(?:[.,!\n]|$)",
                MemoryKind::Fact,
                "identity",
                0.9,
                |payload| format!("User's name is {}", payload),
            ),
            (
                "stated_preference",
                r"(?i)\bi (?:prefer|like|love)\s+([^.,!\n]{3,80})",
                MemoryKind::Preference,
                "preference",
                0.7,
                |payload| format!("User prefers {}", payload),
            ),
            (
                "stated_dislike",
                r"(?i)\bi (?:dislike|hate|can't stand)\s+([^.,!\n]{3,80})",
                MemoryKind::Preference,
                "preference",
                0.7,
                |payload| format!("User dislikes {}", payload),
            ),
            (
                "explicit_note",
                r"(?i)\bremember that\s+([^.!\n]{3,120})",
                MemoryKind::Fact,
                "note",
                0.8,
                |payload| payload.to_string(),
            ),
            (
                "standing_rule",
                r"(?i)\b(?:always|never)\s+([^.,!\n]{3,80})",
                MemoryKind::Correction,
                "behavior",
                0.8,
                |payload| format!("Standing instruction: {}", payload),
            ),
        ];

        let rules = specs
            .into_iter()
            .map(|(name, pattern, kind, category, confidence, handler)| {
                let pattern = Regex::new(pattern).map_err(|e| {
                    Error::Memory(format!("Invalid pattern for rule '{}': {}", name, e))
                })?;
                Ok(ExtractionRule {
                    name,
                    pattern,
                    kind,
                    category,
                    confidence,
                    handler,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Run every rule against the text, in order.
    ///
    /// Rules are independent; one piece of text can yield several
    /// candidates. Candidates carry the rule name as a tag.
    pub fn extract(&self, text: &str) -> Vec<MemoryCandidate> {
        let mut candidates = Vec::new();

        for rule in &self.rules {
            for captures in rule.pattern.captures_iter(text) {
                let Some(payload) = captures.get(1) else {
                    continue;
                };
                let payload = payload.as_str().trim();
                if payload.is_empty() {
                    continue;
                }

                candidates.push(
                    MemoryCandidate::new(rule.kind, rule.category, (rule.handler)(payload))
                        .confidence(rule.confidence)
                        .tag(rule.name),
                );
            }
        }

        candidates
    }
}
