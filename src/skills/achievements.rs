//! Declarative achievement catalog
//!
//! Each definition is an id plus a pure predicate over a full skill
//! profile. Evaluation is idempotent: an id already unlocked on the profile
//! is never emitted again.

use super::profile::{Achievement, AgentSkillProfile, SkillLevel};
use chrono::Utc;

/// A declarative achievement definition
pub struct AchievementDef {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    /// Pure predicate over the profile
    pub predicate: fn(&AgentSkillProfile) -> bool,
}

static CATALOG: [AchievementDef; 7] = [
    AchievementDef {
        id: "first-xp",
        name: "First Steps",
        description: "Earned experience for the first time",
        category: "milestone",
        predicate: earned_first_xp,
    },
    AchievementDef {
        id: "five-skills",
        name: "Versatile",
        description: "Earned experience in five distinct skills",
        category: "breadth",
        predicate: has_five_skills,
    },
    AchievementDef {
        id: "advanced-skill",
        name: "Practitioner",
        description: "Reached advanced level in a skill",
        category: "depth",
        predicate: any_advanced,
    },
    AchievementDef {
        id: "expert-skill",
        name: "Specialist",
        description: "Reached expert level in a skill",
        category: "depth",
        predicate: any_expert,
    },
    AchievementDef {
        id: "master-skill",
        name: "Master of One",
        description: "Reached master level in a skill",
        category: "depth",
        predicate: any_master,
    },
    AchievementDef {
        id: "fifty-tasks",
        name: "Dedicated",
        description: "Completed fifty tasks",
        category: "milestone",
        predicate: fifty_tasks,
    },
    AchievementDef {
        id: "veteran",
        name: "Veteran",
        description: "Accumulated five thousand total XP",
        category: "milestone",
        predicate: veteran_xp,
    },
];

/// The fixed, ordered catalog
pub fn definitions() -> &'static [AchievementDef] {
    &CATALOG
}

fn earned_first_xp(p: &AgentSkillProfile) -> bool {
    p.total_tasks_completed >= 1
}

fn has_five_skills(p: &AgentSkillProfile) -> bool {
    p.skills.len() >= 5
}

fn any_advanced(p: &AgentSkillProfile) -> bool {
    any_at_or_above(p, SkillLevel::Advanced)
}

fn any_expert(p: &AgentSkillProfile) -> bool {
    any_at_or_above(p, SkillLevel::Expert)
}

fn any_master(p: &AgentSkillProfile) -> bool {
    any_at_or_above(p, SkillLevel::Master)
}

fn fifty_tasks(p: &AgentSkillProfile) -> bool {
    p.total_tasks_completed >= 50
}

fn veteran_xp(p: &AgentSkillProfile) -> bool {
    p.total_xp >= 5000
}

fn any_at_or_above(profile: &AgentSkillProfile, level: SkillLevel) -> bool {
    profile
        .skills
        .values()
        .any(|s| s.level.rank() >= level.rank())
}

/// Return achievements whose predicates are newly satisfied and whose ids
/// are not yet on the profile.
pub fn check_achievements(profile: &AgentSkillProfile) -> Vec<Achievement> {
    definitions()
        .iter()
        .filter(|def| !profile.has_achievement(def.id) && (def.predicate)(profile))
        .map(|def| Achievement {
            id: def.id.to_string(),
            name: def.name.to_string(),
            description: def.description.to_string(),
            category: def.category.to_string(),
            unlocked_at: Utc::now(),
        })
        .collect()
}
