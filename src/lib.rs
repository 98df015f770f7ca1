//! MindVault - persistent memory and skill progression for AI agents
//!
//! MindVault is the knowledge layer an agent assistant accumulates over
//! time: facts, preferences, behavioral patterns and successful task
//! approaches, plus a per-agent competence model with experience, levels,
//! idle decay and prerequisite gating.
//!
//! ## Architecture
//!
//! ```text
//! raw text ──► PrivacyFilter ──► MemoryStore.remember
//!                                    │ dedup-merge, persist
//!                                    └─► SemanticIndex (background, tolerant)
//!
//! MemoryStore.recall = keyword scan ⊕ SemanticIndex.query
//!
//! Consolidator (weekly) ──► summary records, `superseded` tags
//! SkillEngine.award_xp ──► dependency gate ─► XP/level ─► achievements
//! Background sweeps: TTL expiry, idle decay, consolidation
//! ```
//!
//! The orchestration layer constructs one [`KnowledgeEngine`] at startup
//! and consumes [`events::EngineEvent`]s for notification surfaces.
//! Durable state lives in whole-collection JSON snapshots that load
//! fail-open; a slow or unavailable embedding backend degrades recall to
//! keyword-only but never blocks writes.
//!
//! ## Modules
//!
//! - [`memory`]: record store, hybrid recall, consolidation, extraction
//! - [`index`]: cosine-similarity semantic index
//! - [`embedding`]: swappable embedding provider capability
//! - [`privacy`]: sensitive-pattern redaction
//! - [`skills`]: experience, levels, decay, dependencies, achievements
//! - [`events`]: domain event bus
//! - [`config`]: engine configuration
//! - [`engine`]: the composition root

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod memory;
pub mod privacy;
pub mod skills;

pub use config::EngineConfig;
pub use engine::KnowledgeEngine;
pub use error::{Error, Result};
