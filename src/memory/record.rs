//! Memory record types
//!
//! A [`MemoryRecord`] is a single stored unit of knowledge. Callers describe
//! new knowledge with a [`MemoryCandidate`]; the store runs it through the
//! privacy filter and either merges it into a near-duplicate or persists it
//! as a fresh record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of knowledge a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A standalone fact about the user or the world
    Fact,
    /// A user preference
    Preference,
    /// Knowledge the agent derived from its own experience
    Learning,
    /// A recognized interaction pattern
    Pattern,
    /// A correction to earlier behavior
    Correction,
    /// A note about an agent capability
    Skill,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Preference => write!(f, "preference"),
            Self::Learning => write!(f, "learning"),
            Self::Pattern => write!(f, "pattern"),
            Self::Correction => write!(f, "correction"),
            Self::Skill => write!(f, "skill"),
        }
    }
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Stated directly by the user
    User,
    /// Generated by the agent itself (reflection, consolidation)
    #[serde(rename = "self")]
    SelfGenerated,
    /// Observed during an interaction
    Interaction,
}

/// Sensitivity classification of stored content
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    /// Safe to surface anywhere
    #[default]
    Public,
    /// Internal to the assistant
    Internal,
    /// Redacted content that originally carried sensitive spans
    Confidential,
}

/// A single stored unit of knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record identifier
    pub id: Uuid,
    /// Kind of knowledge
    pub kind: MemoryKind,
    /// Free-form grouping label
    pub category: String,
    /// Redacted content
    pub content: String,
    /// Optional context the knowledge was captured in
    pub context: Option<String>,
    /// How trusted this record is (0.0-1.0)
    pub confidence: f32,
    /// How many times recall returned this record
    pub use_count: u32,
    /// Success rate of actions taken on this record (0.0-1.0)
    pub success_rate: f32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Last time recall returned this record
    pub last_used_at: Option<DateTime<Utc>>,
    /// Searchable tags
    pub tags: Vec<String>,
    /// Provenance of the record
    pub source: MemorySource,
    /// Optional expiry; the TTL sweep removes records past this instant
    pub expires_at: Option<DateTime<Utc>>,
    /// Sensitivity classification
    pub sensitivity: SensitivityLevel,
    /// Optional id of the interaction this record originated from
    pub origin_id: Option<String>,
    /// Optional reliability score of the source
    pub reliability: Option<f32>,
    /// Whether the privacy filter redacted anything in this content
    pub has_pii: bool,
}

impl MemoryRecord {
    /// Strengthen this record after a near-duplicate `remember` call:
    /// confidence +0.1 capped at 1.0, one more use, refreshed timestamp.
    pub fn strengthen(&mut self) {
        self.confidence = (self.confidence + 0.1).min(1.0);
        self.use_count += 1;
        self.updated_at = Utc::now();
    }

    /// Record that recall returned this record
    pub fn record_use(&mut self) {
        self.use_count += 1;
        self.last_used_at = Some(Utc::now());
    }

    /// Whether the record's TTL has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }

    /// Add a tag if not already present
    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
            self.updated_at = Utc::now();
        }
    }

    /// Whether the record carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Caller-facing description of knowledge to remember
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub kind: MemoryKind,
    pub category: String,
    pub content: String,
    pub context: Option<String>,
    pub confidence: f32,
    pub tags: Vec<String>,
    pub source: MemorySource,
    pub expires_at: Option<DateTime<Utc>>,
    pub sensitivity: SensitivityLevel,
    pub origin_id: Option<String>,
    pub reliability: Option<f32>,
}

impl MemoryCandidate {
    /// Create a candidate with defaulted fields
    pub fn new(kind: MemoryKind, category: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            category: category.into(),
            content: content.into(),
            context: None,
            confidence: 0.7,
            tags: Vec::new(),
            source: MemorySource::Interaction,
            expires_at: None,
            sensitivity: SensitivityLevel::Public,
            origin_id: None,
            reliability: Some(0.7),
        }
    }

    /// Set the confidence score (clamped to 0.0-1.0)
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the capture context
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the source
    pub fn source(mut self, source: MemorySource) -> Self {
        self.source = source;
        self
    }

    /// Set an expiry timestamp
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the sensitivity level
    pub fn sensitivity(mut self, level: SensitivityLevel) -> Self {
        self.sensitivity = level;
        self
    }

    /// Set the originating interaction id
    pub fn origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = Some(origin_id.into());
        self
    }

    /// Build the durable record from the scrubbed content
    pub(crate) fn into_record(self, redacted_content: String, has_pii: bool) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: Uuid::new_v4(),
            kind: self.kind,
            category: self.category,
            content: redacted_content,
            context: self.context,
            confidence: self.confidence.clamp(0.0, 1.0),
            use_count: 0,
            success_rate: 1.0,
            created_at: now,
            updated_at: now,
            last_used_at: None,
            tags: self.tags,
            source: self.source,
            expires_at: self.expires_at,
            sensitivity: self.sensitivity,
            origin_id: self.origin_id,
            reliability: self.reliability.map(|r| r.clamp(0.0, 1.0)),
            has_pii,
        }
    }
}
