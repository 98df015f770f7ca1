//! Memory store, consolidation and extraction

mod consolidator;
mod extractor;
mod knowledge;
mod record;
mod store;

pub use consolidator::{
    ConsolidationReport, Consolidator, TAG_AUTO_GENERATED, TAG_SUMMARY, TAG_SUPERSEDED,
};
pub use extractor::Extractor;
pub use knowledge::{
    LearnedPattern, Preference, Reflection, ReflectionAnalysis, ReflectionOutcome, TaskKnowledge,
    TaskOutcome,
};
pub use record::{MemoryCandidate, MemoryKind, MemoryRecord, MemorySource, SensitivityLevel};
pub use store::{MemoryStore, RecallOptions};
