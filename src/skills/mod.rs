//! Skill progression, decay and achievements

mod achievements;
mod engine;
mod profile;

pub use achievements::{check_achievements, definitions, AchievementDef};
pub use engine::{DecayReport, SkillEngine, XpAward};
pub use profile::{Achievement, AgentSkillProfile, SkillDependency, SkillLevel, SkillProgress};
