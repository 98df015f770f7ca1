//! Domain events emitted by the engine
//!
//! Level changes, decay, achievement unlocks and consolidation results are
//! published on a `tokio::sync::broadcast` bus for notification/UI
//! collaborators outside this core. Sending never blocks; events fired with
//! no subscribers are dropped.

use crate::skills::{Achievement, SkillLevel};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A domain event emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// XP was credited to a skill
    XpAwarded {
        agent_id: String,
        skill: String,
        amount: u64,
        total_xp: u64,
    },
    /// A skill crossed a level threshold upward
    LevelUp {
        agent_id: String,
        skill: String,
        from: SkillLevel,
        to: SkillLevel,
    },
    /// Idle decay dropped a skill below a level threshold
    SkillDecayed {
        agent_id: String,
        skill: String,
        lost_xp: u64,
        from: SkillLevel,
        to: SkillLevel,
    },
    /// An achievement predicate became true for a profile
    AchievementUnlocked {
        agent_id: String,
        achievement: Achievement,
    },
    /// A consolidation pass replaced a cluster with a summary record
    MemoriesConsolidated {
        category: String,
        cluster_size: usize,
        summary_id: Uuid,
    },
}

/// Broadcast bus for engine events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no live subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
