//! Skill progression data types
//!
//! Levels are a pure function of cumulative XP against a fixed threshold
//! table. There is no independently stored level that can drift: every XP
//! mutation goes through [`SkillProgress::apply_total_xp`], which recomputes
//! level, within-level XP and XP-to-next in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discrete competence levels, in ascending order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Master,
}

/// Cumulative-XP thresholds, one per level in ascending order
const LEVEL_THRESHOLDS: [(SkillLevel, u64); 5] = [
    (SkillLevel::Beginner, 0),
    (SkillLevel::Intermediate, 100),
    (SkillLevel::Advanced, 350),
    (SkillLevel::Expert, 850),
    (SkillLevel::Master, 1850),
];

impl SkillLevel {
    /// Ordinal rank, 0 (beginner) through 4 (master)
    pub fn rank(self) -> u8 {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => 1,
            Self::Advanced => 2,
            Self::Expert => 3,
            Self::Master => 4,
        }
    }

    /// The cumulative XP at which this level starts
    pub fn threshold(self) -> u64 {
        LEVEL_THRESHOLDS[self.rank() as usize].1
    }

    /// The level a cumulative XP total maps to
    pub fn for_total_xp(total_xp: u64) -> Self {
        LEVEL_THRESHOLDS
            .iter()
            .rev()
            .find(|(_, threshold)| total_xp >= *threshold)
            .map(|(level, _)| *level)
            .unwrap_or(Self::Beginner)
    }

    /// The next level up, if any (master is terminal)
    pub fn next(self) -> Option<Self> {
        LEVEL_THRESHOLDS
            .get(self.rank() as usize + 1)
            .map(|(level, _)| *level)
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
            Self::Expert => write!(f, "expert"),
            Self::Master => write!(f, "master"),
        }
    }
}

/// Per-skill progression state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillProgress {
    /// Name of the skill
    pub skill_name: String,
    /// Current level, always derived from `total_xp`
    pub level: SkillLevel,
    /// XP accumulated within the current level
    pub current_xp: u64,
    /// Cumulative XP
    pub total_xp: u64,
    /// XP remaining to the next level (0 at master)
    pub xp_to_next_level: u64,
    /// Tasks completed with this skill
    pub tasks_completed: u64,
    /// Last time the skill earned XP
    pub last_used: DateTime<Utc>,
    /// First time the skill earned XP
    pub first_used: DateTime<Utc>,
}

impl SkillProgress {
    /// A fresh beginner-level skill
    pub fn new(skill_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut progress = Self {
            skill_name: skill_name.into(),
            level: SkillLevel::Beginner,
            current_xp: 0,
            total_xp: 0,
            xp_to_next_level: 0,
            tasks_completed: 0,
            last_used: now,
            first_used: now,
        };
        progress.apply_total_xp(0);
        progress
    }

    /// Set cumulative XP and recompute level, within-level XP and
    /// XP-to-next. The only mutation path for XP, so the level invariant
    /// cannot drift.
    pub fn apply_total_xp(&mut self, total_xp: u64) {
        self.total_xp = total_xp;
        self.level = SkillLevel::for_total_xp(total_xp);
        self.current_xp = total_xp - self.level.threshold();
        self.xp_to_next_level = match self.level.next() {
            Some(next) => next.threshold() - total_xp,
            None => 0,
        };
    }
}

/// One-time milestone unlocked when its predicate over a profile holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable identifier, unique per profile
    pub id: String,
    /// Display name
    pub name: String,
    /// What was achieved
    pub description: String,
    /// Grouping label
    pub category: String,
    /// When it was unlocked
    pub unlocked_at: DateTime<Utc>,
}

/// Per-agent skill profile, created lazily on first award
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkillProfile {
    /// Agent identifier
    pub agent_id: String,
    /// Agent display name
    pub agent_name: String,
    /// Progress per skill name
    pub skills: HashMap<String, SkillProgress>,
    /// Unlocked achievements
    pub achievements: Vec<Achievement>,
    /// Sum of cumulative XP across skills
    pub total_xp: u64,
    /// Total tasks completed across skills
    pub total_tasks_completed: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl AgentSkillProfile {
    /// A fresh profile with no skills
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            skills: HashMap::new(),
            achievements: Vec::new(),
            total_xp: 0,
            total_tasks_completed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an achievement id is already unlocked
    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }
}

/// A prerequisite edge: `skill` cannot earn XP until the agent holds
/// `requires` at `required_level` or above. Flat table, no cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDependency {
    /// The gated skill
    pub skill: String,
    /// The prerequisite skill
    pub requires: String,
    /// Minimum level of the prerequisite
    pub required_level: SkillLevel,
}
