//! Skill progression state machine
//!
//! Tracks experience, levels, idle decay and prerequisite gating per
//! (agent, skill) pair. Profiles persist as one snapshot keyed by agent id,
//! rewritten on every mutation while the write guard is held. Level changes,
//! decay and achievement unlocks are published on the engine event bus.

use crate::config::DecayConfig;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus};
use crate::skills::achievements::check_achievements;
use crate::skills::profile::{
    Achievement, AgentSkillProfile, SkillDependency, SkillLevel, SkillProgress,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of an `award_xp` call
#[derive(Debug, Clone)]
pub struct XpAward {
    /// XP actually credited (0 when gated)
    pub awarded: u64,
    /// The skill's level after the award
    pub level: SkillLevel,
    /// Whether the award crossed a level threshold
    pub leveled_up: bool,
    /// Unmet-prerequisite explanation; `Some` means nothing was mutated
    pub blocked_on: Option<String>,
    /// Achievements newly unlocked by this award
    pub unlocked: Vec<Achievement>,
}

/// Outcome of one idle-decay sweep
#[derive(Debug, Clone, Default)]
pub struct DecayReport {
    /// Skills that lost XP
    pub skills_decayed: usize,
    /// Skills that dropped a level
    pub levels_dropped: usize,
    /// Total XP removed across all profiles
    pub total_xp_lost: u64,
}

/// Experience, leveling, decay and dependency gating per (agent, skill)
pub struct SkillEngine {
    snapshot_path: PathBuf,
    decay: DecayConfig,
    dependencies: Arc<RwLock<Vec<SkillDependency>>>,
    profiles: Arc<RwLock<HashMap<String, AgentSkillProfile>>>,
    bus: EventBus,
}

impl SkillEngine {
    /// Open the engine, loading the profile snapshot fail-open.
    pub async fn new(
        snapshot_path: PathBuf,
        decay: DecayConfig,
        dependencies: Vec<SkillDependency>,
        bus: EventBus,
    ) -> Result<Self> {
        if let Some(parent) = snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let profiles = match std::fs::read_to_string(&snapshot_path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(profiles) => profiles,
                Err(e) => {
                    tracing::warn!(
                        path = %snapshot_path.display(),
                        error = %e,
                        "Corrupt skill profile snapshot, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            snapshot_path,
            decay,
            dependencies: Arc::new(RwLock::new(dependencies)),
            profiles: Arc::new(RwLock::new(profiles)),
            bus,
        })
    }

    /// Add a prerequisite edge at runtime
    pub async fn add_dependency(&self, dependency: SkillDependency) {
        self.dependencies.write().await.push(dependency);
    }

    /// Award XP to an agent's skill.
    ///
    /// When a prerequisite edge is unmet the call is a pure no-op carrying
    /// the reason — a normal result, not an error. Otherwise the profile and
    /// skill are created lazily, XP and counters are updated, the level is
    /// recomputed, achievements are re-evaluated and the snapshot persisted.
    pub async fn award_xp(
        &self,
        agent_id: &str,
        agent_name: &str,
        skill_name: &str,
        amount: u64,
        reason: &str,
    ) -> Result<XpAward> {
        let edges: Vec<SkillDependency> = self
            .dependencies
            .read()
            .await
            .iter()
            .filter(|d| d.skill == skill_name)
            .cloned()
            .collect();

        let mut profiles = self.profiles.write().await;

        // Dependency gate: every edge must already be satisfied
        for edge in &edges {
            let satisfied = profiles
                .get(agent_id)
                .and_then(|p| p.skills.get(&edge.requires))
                .map(|s| s.level.rank() >= edge.required_level.rank())
                .unwrap_or(false);
            if !satisfied {
                let current_level = profiles
                    .get(agent_id)
                    .and_then(|p| p.skills.get(skill_name))
                    .map(|s| s.level)
                    .unwrap_or(SkillLevel::Beginner);
                tracing::debug!(
                    agent = agent_id,
                    skill = skill_name,
                    requires = %edge.requires,
                    "XP award blocked by unmet prerequisite"
                );
                return Ok(XpAward {
                    awarded: 0,
                    level: current_level,
                    leveled_up: false,
                    blocked_on: Some(format!(
                        "requires {} at {} or above",
                        edge.requires, edge.required_level
                    )),
                    unlocked: Vec::new(),
                });
            }
        }

        let now = Utc::now();
        let profile = profiles
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentSkillProfile::new(agent_id, agent_name));
        let progress = profile
            .skills
            .entry(skill_name.to_string())
            .or_insert_with(|| SkillProgress::new(skill_name));

        let old_level = progress.level;
        let new_total = progress.total_xp + amount;
        progress.apply_total_xp(new_total);
        progress.tasks_completed += 1;
        progress.last_used = now;
        let new_level = progress.level;
        let skill_total = progress.total_xp;

        profile.total_xp += amount;
        profile.total_tasks_completed += 1;
        profile.updated_at = now;

        tracing::debug!(
            agent = agent_id,
            skill = skill_name,
            amount,
            reason,
            "XP awarded"
        );
        self.bus.publish(EngineEvent::XpAwarded {
            agent_id: agent_id.to_string(),
            skill: skill_name.to_string(),
            amount,
            total_xp: skill_total,
        });

        let leveled_up = new_level != old_level;
        if leveled_up {
            self.bus.publish(EngineEvent::LevelUp {
                agent_id: agent_id.to_string(),
                skill: skill_name.to_string(),
                from: old_level,
                to: new_level,
            });
        }

        let unlocked = check_achievements(profile);
        for achievement in &unlocked {
            profile.achievements.push(achievement.clone());
            self.bus.publish(EngineEvent::AchievementUnlocked {
                agent_id: agent_id.to_string(),
                achievement: achievement.clone(),
            });
        }

        self.persist(&profiles).await?;

        Ok(XpAward {
            awarded: amount,
            level: new_level,
            leveled_up,
            blocked_on: None,
            unlocked,
        })
    }

    /// Apply idle decay across all profiles.
    ///
    /// A skill idle longer than the configured threshold loses
    /// `(idle_days - threshold) * rate_per_day` XP, floored at the XP
    /// threshold of the configured floor level; a skill already below the
    /// floor never changes. Persists once per sweep, only when something
    /// decayed. Safe to run repeatedly.
    pub async fn trigger_decay(&self) -> Result<DecayReport> {
        let now = Utc::now();
        let floor_threshold = self.decay.floor_level.threshold();
        let mut report = DecayReport::default();
        let mut events = Vec::new();

        let mut profiles = self.profiles.write().await;
        for profile in profiles.values_mut() {
            let agent_id = profile.agent_id.clone();
            let mut profile_lost: u64 = 0;

            for progress in profile.skills.values_mut() {
                let idle_days = (now - progress.last_used).num_days();
                if idle_days <= self.decay.idle_threshold_days {
                    continue;
                }

                let decay_amount =
                    ((idle_days - self.decay.idle_threshold_days) as f64 * self.decay.rate_per_day)
                        as u64;
                if decay_amount == 0 {
                    continue;
                }

                // The floor never raises a skill that is already below it
                let floor = floor_threshold.min(progress.total_xp);
                let new_total = progress.total_xp.saturating_sub(decay_amount).max(floor);
                let lost = progress.total_xp - new_total;
                if lost == 0 {
                    continue;
                }

                let old_level = progress.level;
                progress.apply_total_xp(new_total);
                profile_lost += lost;

                report.skills_decayed += 1;
                report.total_xp_lost += lost;

                if progress.level != old_level {
                    report.levels_dropped += 1;
                    events.push(EngineEvent::SkillDecayed {
                        agent_id: agent_id.clone(),
                        skill: progress.skill_name.clone(),
                        lost_xp: lost,
                        from: old_level,
                        to: progress.level,
                    });
                }
            }

            if profile_lost > 0 {
                profile.total_xp -= profile_lost;
                profile.updated_at = now;
            }
        }

        if report.skills_decayed > 0 {
            self.persist(&profiles).await?;
            tracing::info!(
                skills = report.skills_decayed,
                xp_lost = report.total_xp_lost,
                "Idle decay applied"
            );
        }
        drop(profiles);

        for event in events {
            self.bus.publish(event);
        }
        Ok(report)
    }

    /// Fetch an agent's full profile
    pub async fn get_agent_profile(&self, agent_id: &str) -> Option<AgentSkillProfile> {
        self.profiles.read().await.get(agent_id).cloned()
    }

    /// Fetch one skill's progress for an agent
    pub async fn get_skill_progress(
        &self,
        agent_id: &str,
        skill_name: &str,
    ) -> Option<SkillProgress> {
        self.profiles
            .read()
            .await
            .get(agent_id)
            .and_then(|p| p.skills.get(skill_name))
            .cloned()
    }

    /// An agent's top skills by cumulative XP, highest first
    pub async fn get_top_skills(&self, agent_id: &str, limit: usize) -> Vec<SkillProgress> {
        let profiles = self.profiles.read().await;
        let Some(profile) = profiles.get(agent_id) else {
            return Vec::new();
        };
        let mut skills: Vec<SkillProgress> = profile.skills.values().cloned().collect();
        skills.sort_by(|a, b| {
            b.total_xp
                .cmp(&a.total_xp)
                .then_with(|| a.skill_name.cmp(&b.skill_name))
        });
        skills.truncate(limit);
        skills
    }

    /// Write the full profile snapshot. Called with the write guard held.
    async fn persist(&self, profiles: &HashMap<String, AgentSkillProfile>) -> Result<()> {
        let json = serde_json::to_string_pretty(profiles)
            .map_err(|e| Error::Persistence(format!("Failed to serialize profiles: {}", e)))?;
        tokio::fs::write(&self.snapshot_path, json).await.map_err(|e| {
            Error::Persistence(format!(
                "Failed to write {}: {}",
                self.snapshot_path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
