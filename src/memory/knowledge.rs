//! Structured knowledge types: preferences, patterns, task knowledge and
//! reflections
//!
//! These live in their own durable collections next to the main memory
//! records and follow dedicated merge rules instead of the generic
//! near-duplicate merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A learned user preference, one entry per key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    /// Unique preference key
    pub key: String,
    /// Opaque structured value, replaced wholesale on conflicting evidence
    pub value: serde_json::Value,
    /// Free-text context the preference was learned from
    pub learned_from: String,
    /// How trusted the preference is (0.0-1.0)
    pub confidence: f32,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A learned trigger-response pattern, fuzzy-keyed by trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// Normalized trigger text, acts as the lookup key
    pub trigger: String,
    /// Response associated with the trigger
    pub response: String,
    /// Ordered, deduplicated example utterances
    pub examples: Vec<String>,
    /// Times the pattern led to success
    pub success_count: u32,
    /// Times the pattern led to failure
    pub fail_count: u32,
    /// Last time the pattern was reinforced
    pub last_used: DateTime<Utc>,
}

/// Accumulated knowledge about one task type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskKnowledge {
    /// Task type, one record per type
    pub task_type: String,
    /// Human description of the task
    pub description: String,
    /// The approach that last succeeded
    pub successful_approach: String,
    /// Union of tools that have been used successfully
    pub tools: Vec<String>,
    /// Latest successful step sequence (not a history)
    pub steps: Vec<String>,
    /// Known error types and their remedies
    pub error_fixes: HashMap<String, String>,
    /// Number of recorded successes
    pub success_count: u32,
    /// Running average duration in seconds
    pub avg_duration_secs: f64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A completed-task report used to create or update [`TaskKnowledge`]
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub description: String,
    pub approach: String,
    pub tools: Vec<String>,
    pub steps: Vec<String>,
    pub error_fixes: HashMap<String, String>,
    pub duration_secs: f64,
}

/// Outcome of a reflected-on interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionOutcome {
    Success,
    Failure,
    Partial,
}

/// Post-interaction self-analysis supplied with `reflect`
#[derive(Debug, Clone, Default)]
pub struct ReflectionAnalysis {
    /// What went well
    pub what_worked: Vec<String>,
    /// What went poorly
    pub what_failed: Vec<String>,
    /// Concrete improvement for next time
    pub improvement: Option<String>,
}

/// A single bounded-history reflection entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// The interaction text reflected on
    pub interaction: String,
    /// How the interaction went
    pub outcome: ReflectionOutcome,
    /// What went well
    pub what_worked: Vec<String>,
    /// What went poorly
    pub what_failed: Vec<String>,
    /// Improvement note, if any
    pub improvement: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
