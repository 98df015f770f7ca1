//! Record-of-truth for agent knowledge
//!
//! The store owns five durable collections — memories, preferences,
//! patterns, task knowledge and reflections — each persisted as a
//! whole-collection JSON snapshot under the data directory. Every mutating
//! call performs its read-modify-write and snapshot write while holding the
//! collection's write guard, so writers to one collection are serialized.
//!
//! `remember` runs content through the privacy filter, merges
//! near-duplicates instead of storing twins, and hands the redacted content
//! to the semantic index in a tracked background task: a slow or failing
//! embedding backend degrades recall to keyword-only but never blocks a
//! write.

use crate::config::RecallConfig;
use crate::error::{Error, Result};
use crate::index::SemanticIndex;
use crate::memory::knowledge::{
    LearnedPattern, Preference, Reflection, ReflectionAnalysis, ReflectionOutcome, TaskKnowledge,
    TaskOutcome,
};
use crate::memory::record::{MemoryCandidate, MemoryKind, MemoryRecord, MemorySource};
use crate::privacy::PrivacyFilter;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Full-query substring bonus
const SCORE_EXACT_SUBSTRING: f32 = 10.0;
/// Per-token content match bonus
const SCORE_TOKEN_CONTENT: f32 = 2.0;
/// Per-token tag match bonus
const SCORE_TOKEN_TAG: f32 = 3.0;
/// Bonus for a semantic hit that already scored in the keyword phase
const SCORE_SEMANTIC_BONUS: f32 = 15.0;
/// Baseline score for a semantic-only hit
const SCORE_SEMANTIC_BASELINE: f32 = 10.0;

/// Token-overlap ratio above which two contents count as near-duplicates
const DUPLICATE_OVERLAP_THRESHOLD: f32 = 0.8;

/// Reflections are bounded to this many most-recent entries
const MAX_REFLECTIONS: usize = 100;

/// Filter and limit options for `recall`
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Restrict results to one kind
    pub kind: Option<MemoryKind>,
    /// Restrict results to one category
    pub category: Option<String>,
    /// Maximum results; falls back to the configured default
    pub limit: Option<usize>,
}

/// Durable knowledge store with hybrid keyword + semantic recall
pub struct MemoryStore {
    data_dir: PathBuf,
    filter: PrivacyFilter,
    index: Arc<SemanticIndex>,
    recall_config: RecallConfig,
    memories: Arc<RwLock<Vec<MemoryRecord>>>,
    preferences: Arc<RwLock<Vec<Preference>>>,
    patterns: Arc<RwLock<Vec<LearnedPattern>>>,
    tasks: Arc<RwLock<Vec<TaskKnowledge>>>,
    reflections: Arc<RwLock<Vec<Reflection>>>,
    indexing_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Open a store rooted at `data_dir`, loading all collection snapshots.
    ///
    /// Missing or corrupt snapshots load as empty collections.
    pub async fn new(
        data_dir: PathBuf,
        filter: PrivacyFilter,
        index: Arc<SemanticIndex>,
        recall_config: RecallConfig,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let memories = load_collection(&data_dir.join("memories.json"));
        let preferences = load_collection(&data_dir.join("preferences.json"));
        let patterns = load_collection(&data_dir.join("patterns.json"));
        let tasks = load_collection(&data_dir.join("task_knowledge.json"));
        let reflections = load_collection(&data_dir.join("reflections.json"));

        Ok(Self {
            data_dir,
            filter,
            index,
            recall_config,
            memories: Arc::new(RwLock::new(memories)),
            preferences: Arc::new(RwLock::new(preferences)),
            patterns: Arc::new(RwLock::new(patterns)),
            tasks: Arc::new(RwLock::new(tasks)),
            reflections: Arc::new(RwLock::new(reflections)),
            indexing_tasks: Mutex::new(Vec::new()),
        })
    }

    // ------------------------------------------------------------------
    // Memories
    // ------------------------------------------------------------------

    /// Store a piece of knowledge.
    ///
    /// Content is scrubbed first. A near-duplicate of an existing record
    /// strengthens that record (confidence +0.1 capped at 1.0, use count +1)
    /// and returns it with unchanged identity. A genuinely new record is
    /// persisted, then indexed semantically in the background; indexing
    /// failures are logged and swallowed.
    pub async fn remember(&self, candidate: MemoryCandidate) -> Result<MemoryRecord> {
        let scrubbed = self.filter.scrub(&candidate.content);

        let mut memories = self.memories.write().await;

        if let Some(existing) = memories
            .iter_mut()
            .find(|r| is_near_duplicate(&r.content, &scrubbed.text))
        {
            existing.strengthen();
            let merged = existing.clone();
            self.persist(&self.data_dir.join("memories.json"), &memories)
                .await?;
            tracing::debug!(id = %merged.id, "Merged near-duplicate memory");
            return Ok(merged);
        }

        let record = candidate.into_record(scrubbed.text, scrubbed.has_pii);
        memories.push(record.clone());

        if let Err(e) = self
            .persist(&self.data_dir.join("memories.json"), &memories)
            .await
        {
            // Roll back the in-memory addition so state matches disk
            memories.pop();
            return Err(e);
        }
        drop(memories);

        self.spawn_indexing(&record).await;
        Ok(record)
    }

    /// Queue background semantic indexing for a record
    async fn spawn_indexing(&self, record: &MemoryRecord) {
        let index = self.index.clone();
        let id = record.id;
        let content = record.content.clone();
        let mut metadata = HashMap::new();
        metadata.insert("memory_id".to_string(), id.to_string());
        metadata.insert("kind".to_string(), record.kind.to_string());
        metadata.insert("category".to_string(), record.category.clone());

        let handle = tokio::spawn(async move {
            if index.index(id, &content, metadata).await.is_none() {
                tracing::warn!(id = %id, "Memory not semantically indexed, keyword recall only");
            }
        });
        self.indexing_tasks.lock().await.push(handle);
    }

    /// Wait for all queued background indexing tasks to finish.
    ///
    /// `remember` returns as soon as the record is durable; tests and
    /// shutdown paths use this to observe indexing deterministically.
    pub async fn flush_indexing(&self) {
        let handles: Vec<_> = self.indexing_tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Indexing task panicked");
            }
        }
    }

    /// Hybrid recall: keyword scoring fused with semantic similarity.
    ///
    /// Returned records have their usage counters refreshed — usage is
    /// itself a retrieval signal for future ranking.
    pub async fn recall(&self, query: &str, options: RecallOptions) -> Vec<MemoryRecord> {
        let limit = options.limit.unwrap_or(self.recall_config.default_limit);
        let query_lower = query.to_lowercase();
        let tokens: Vec<&str> = query_lower.split_whitespace().collect();

        // Phase A: keyword scan over filtered records
        let mut scored: HashMap<Uuid, (MemoryRecord, f32)> = HashMap::new();
        {
            let memories = self.memories.read().await;
            for record in memories.iter() {
                if !passes_filter(record, &options) {
                    continue;
                }
                let score = keyword_score(record, &query_lower, &tokens);
                if score > 0.0 {
                    scored.insert(record.id, (record.clone(), score));
                }
            }
        }

        // Phase B: semantic hits boost keyword matches or join fresh
        let hits = self
            .index
            .query(
                query,
                self.recall_config.semantic_limit,
                self.index.similarity_threshold(),
            )
            .await;

        let mut results = {
            let memories = self.memories.read().await;
            for hit in hits {
                let memory_id = hit
                    .metadata
                    .get("memory_id")
                    .and_then(|s| s.parse::<Uuid>().ok())
                    .unwrap_or(hit.id);

                if let Some((_, score)) = scored.get_mut(&memory_id) {
                    *score += SCORE_SEMANTIC_BONUS;
                } else if let Some(record) = memories.iter().find(|r| r.id == memory_id) {
                    if passes_filter(record, &options) {
                        scored.insert(memory_id, (record.clone(), SCORE_SEMANTIC_BASELINE));
                    }
                }
            }

            let mut results: Vec<(MemoryRecord, f32)> = scored.into_values().collect();
            // Stable total order: ties broken by age then id, so a fixed
            // query against a fixed store always returns the same ranking
            results.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.created_at.cmp(&b.0.created_at))
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            results.truncate(limit);
            results
        };

        // Usage tracking: recall reinforces future ranking
        {
            let mut memories = self.memories.write().await;
            for (record, _) in results.iter_mut() {
                if let Some(stored) = memories.iter_mut().find(|r| r.id == record.id) {
                    stored.record_use();
                    *record = stored.clone();
                }
            }
            if let Err(e) = self
                .persist(&self.data_dir.join("memories.json"), &memories)
                .await
            {
                tracing::warn!(error = %e, "Failed to persist recall usage tracking");
            }
        }

        results.into_iter().map(|(record, _)| record).collect()
    }

    /// Remove a record by id; returns whether it existed.
    ///
    /// The record's semantic index entry is removed best-effort.
    pub async fn forget(&self, id: &Uuid) -> Result<bool> {
        let mut memories = self.memories.write().await;
        let before = memories.len();
        memories.retain(|r| r.id != *id);
        let removed = memories.len() != before;

        if removed {
            self.persist(&self.data_dir.join("memories.json"), &memories)
                .await?;
        }
        drop(memories);

        if removed {
            self.index.remove(id).await;
        }
        Ok(removed)
    }

    /// Fetch a record by id without touching usage counters
    pub async fn get_memory(&self, id: &Uuid) -> Option<MemoryRecord> {
        self.memories.read().await.iter().find(|r| r.id == *id).cloned()
    }

    /// Snapshot of all records, for background passes that must not iterate
    /// live state
    pub async fn snapshot_memories(&self) -> Vec<MemoryRecord> {
        self.memories.read().await.clone()
    }

    /// Number of stored records
    pub async fn memory_count(&self) -> usize {
        self.memories.read().await.len()
    }

    /// Add a tag to each of the given records, persisting once.
    pub(crate) async fn tag_records(&self, ids: &[Uuid], tag: &str) -> Result<usize> {
        let mut memories = self.memories.write().await;
        let mut tagged = 0;
        for record in memories.iter_mut() {
            if ids.contains(&record.id) && !record.has_tag(tag) {
                record.add_tag(tag);
                tagged += 1;
            }
        }
        if tagged > 0 {
            self.persist(&self.data_dir.join("memories.json"), &memories)
                .await?;
        }
        Ok(tagged)
    }

    /// Insert a record without the near-duplicate merge.
    ///
    /// Used by the consolidator: a cluster summary is built from member
    /// contents and would otherwise fuzzy-merge straight back into one of
    /// the members it summarizes.
    pub(crate) async fn insert_unmerged(&self, candidate: MemoryCandidate) -> Result<MemoryRecord> {
        let scrubbed = self.filter.scrub(&candidate.content);
        let record = candidate.into_record(scrubbed.text, scrubbed.has_pii);

        let mut memories = self.memories.write().await;
        memories.push(record.clone());
        if let Err(e) = self
            .persist(&self.data_dir.join("memories.json"), &memories)
            .await
        {
            memories.pop();
            return Err(e);
        }
        drop(memories);

        self.spawn_indexing(&record).await;
        Ok(record)
    }

    /// Remove every record whose expiry has passed; persists only when at
    /// least one was removed. Safe to run repeatedly.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut memories = self.memories.write().await;
        let before = memories.len();
        memories.retain(|r| !r.is_expired(now));
        let removed = before - memories.len();

        if removed > 0 {
            self.persist(&self.data_dir.join("memories.json"), &memories)
                .await?;
            tracing::info!(removed, "Expired memories swept");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    /// Learn or reinforce a preference.
    ///
    /// Identical evidence strengthens confidence (+0.15 capped at 1.0);
    /// conflicting evidence replaces the value and resets confidence to 0.6.
    pub async fn learn_preference(
        &self,
        key: &str,
        value: serde_json::Value,
        learned_from: &str,
    ) -> Result<Preference> {
        let mut preferences = self.preferences.write().await;

        let updated = match preferences.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                if existing.value == value {
                    existing.confidence = (existing.confidence + 0.15).min(1.0);
                } else {
                    existing.value = value;
                    existing.confidence = 0.6;
                }
                existing.learned_from = learned_from.to_string();
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let preference = Preference {
                    key: key.to_string(),
                    value,
                    learned_from: learned_from.to_string(),
                    confidence: 0.7,
                    updated_at: Utc::now(),
                };
                preferences.push(preference.clone());
                preference
            }
        };

        self.persist(&self.data_dir.join("preferences.json"), &preferences)
            .await?;
        Ok(updated)
    }

    /// Fetch a preference; low-confidence entries (≤ 0.5) stay hidden even
    /// though a value exists.
    pub async fn get_preference(&self, key: &str) -> Option<Preference> {
        self.preferences
            .read()
            .await
            .iter()
            .find(|p| p.key == key && p.confidence > 0.5)
            .cloned()
    }

    /// All preferences above the given confidence, highest first
    pub async fn preferences_above(&self, confidence: f32) -> Vec<Preference> {
        let mut prefs: Vec<Preference> = self
            .preferences
            .read()
            .await
            .iter()
            .filter(|p| p.confidence > confidence)
            .cloned()
            .collect();
        prefs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        prefs
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    /// Learn or reinforce a trigger-response pattern.
    ///
    /// The trigger is normalized and fuzzy-matched against existing keys by
    /// bidirectional substring; the first match wins. A match merges the
    /// example (deduplicated) and counts a success; otherwise a new pattern
    /// is created.
    pub async fn learn_pattern(
        &self,
        trigger: &str,
        response: &str,
        example: &str,
    ) -> Result<LearnedPattern> {
        let normalized = normalize_trigger(trigger);
        let mut patterns = self.patterns.write().await;

        let updated = match patterns.iter_mut().find(|p| fuzzy_trigger_match(&p.trigger, &normalized))
        {
            Some(existing) => {
                existing.response = response.to_string();
                if !existing.examples.iter().any(|e| e == example) {
                    existing.examples.push(example.to_string());
                }
                existing.success_count += 1;
                existing.last_used = Utc::now();
                existing.clone()
            }
            None => {
                let pattern = LearnedPattern {
                    trigger: normalized,
                    response: response.to_string(),
                    examples: vec![example.to_string()],
                    success_count: 1,
                    fail_count: 0,
                    last_used: Utc::now(),
                };
                patterns.push(pattern.clone());
                pattern
            }
        };

        self.persist(&self.data_dir.join("patterns.json"), &patterns)
            .await?;
        Ok(updated)
    }

    /// Find a pattern by fuzzy trigger match (first match, not best match)
    pub async fn find_pattern(&self, trigger: &str) -> Option<LearnedPattern> {
        let normalized = normalize_trigger(trigger);
        self.patterns
            .read()
            .await
            .iter()
            .find(|p| fuzzy_trigger_match(&p.trigger, &normalized))
            .cloned()
    }

    /// Count a failure against a pattern; returns whether one matched
    pub async fn record_pattern_failure(&self, trigger: &str) -> Result<bool> {
        let normalized = normalize_trigger(trigger);
        let mut patterns = self.patterns.write().await;

        let matched = match patterns
            .iter_mut()
            .find(|p| fuzzy_trigger_match(&p.trigger, &normalized))
        {
            Some(existing) => {
                existing.fail_count += 1;
                true
            }
            None => false,
        };

        if matched {
            self.persist(&self.data_dir.join("patterns.json"), &patterns)
                .await?;
        }
        Ok(matched)
    }

    // ------------------------------------------------------------------
    // Task knowledge
    // ------------------------------------------------------------------

    /// Record a successful task run, merging into the per-type record:
    /// tools are unioned, steps replaced with the latest successful
    /// sequence, error remedies unioned, and the average duration updated.
    pub async fn learn_task(&self, task_type: &str, outcome: TaskOutcome) -> Result<TaskKnowledge> {
        let mut tasks = self.tasks.write().await;

        let updated = match tasks.iter_mut().find(|t| t.task_type == task_type) {
            Some(existing) => {
                existing.description = outcome.description;
                existing.successful_approach = outcome.approach;
                for tool in outcome.tools {
                    if !existing.tools.iter().any(|t| *t == tool) {
                        existing.tools.push(tool);
                    }
                }
                existing.steps = outcome.steps;
                existing.error_fixes.extend(outcome.error_fixes);
                existing.success_count += 1;
                let n = existing.success_count as f64;
                existing.avg_duration_secs =
                    (existing.avg_duration_secs * (n - 1.0) + outcome.duration_secs) / n;
                existing.clone()
            }
            None => {
                let task = TaskKnowledge {
                    task_type: task_type.to_string(),
                    description: outcome.description,
                    successful_approach: outcome.approach,
                    tools: outcome.tools,
                    steps: outcome.steps,
                    error_fixes: outcome.error_fixes,
                    success_count: 1,
                    avg_duration_secs: outcome.duration_secs,
                    created_at: Utc::now(),
                };
                tasks.push(task.clone());
                task
            }
        };

        self.persist(&self.data_dir.join("task_knowledge.json"), &tasks)
            .await?;
        Ok(updated)
    }

    /// Fetch accumulated knowledge about one task type
    pub async fn get_task_knowledge(&self, task_type: &str) -> Option<TaskKnowledge> {
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| t.task_type == task_type)
            .cloned()
    }

    // ------------------------------------------------------------------
    // Reflections
    // ------------------------------------------------------------------

    /// Append a reflection (bounded to the most recent 100).
    ///
    /// A successful interaction turns each `what_worked` item into a
    /// Learning memory; a failed one with an improvement note becomes a
    /// Correction memory.
    pub async fn reflect(
        &self,
        interaction: &str,
        outcome: ReflectionOutcome,
        analysis: ReflectionAnalysis,
    ) -> Result<Reflection> {
        let reflection = Reflection {
            interaction: interaction.to_string(),
            outcome,
            what_worked: analysis.what_worked.clone(),
            what_failed: analysis.what_failed,
            improvement: analysis.improvement.clone(),
            created_at: Utc::now(),
        };

        {
            let mut reflections = self.reflections.write().await;
            reflections.push(reflection.clone());
            let excess = reflections.len().saturating_sub(MAX_REFLECTIONS);
            if excess > 0 {
                reflections.drain(..excess);
            }
            self.persist(&self.data_dir.join("reflections.json"), &reflections)
                .await?;
        }

        match outcome {
            ReflectionOutcome::Success => {
                for item in analysis.what_worked {
                    self.remember(
                        MemoryCandidate::new(MemoryKind::Learning, "reflection", item)
                            .confidence(0.8)
                            .source(MemorySource::SelfGenerated),
                    )
                    .await?;
                }
            }
            ReflectionOutcome::Failure => {
                if let Some(improvement) = analysis.improvement {
                    self.remember(
                        MemoryCandidate::new(MemoryKind::Correction, "reflection", improvement)
                            .confidence(0.9)
                            .source(MemorySource::SelfGenerated),
                    )
                    .await?;
                }
            }
            ReflectionOutcome::Partial => {}
        }

        Ok(reflection)
    }

    /// The `n` most recent reflections, newest first
    pub async fn recent_reflections(&self, n: usize) -> Vec<Reflection> {
        let reflections = self.reflections.read().await;
        reflections.iter().rev().take(n).cloned().collect()
    }

    // ------------------------------------------------------------------
    // Context assembly
    // ------------------------------------------------------------------

    /// Assemble a human-readable grounding digest for the LLM layer: top
    /// recalled memories, relevant task knowledge, confident preferences
    /// and recent reflections. Formatting only.
    pub async fn build_context(&self, query: &str) -> String {
        let mut context = String::new();

        let memories = self
            .recall(
                query,
                RecallOptions {
                    limit: Some(5),
                    ..Default::default()
                },
            )
            .await;
        if !memories.is_empty() {
            context.push_str("## Relevant memories\n");
            for record in &memories {
                let _ = writeln!(
                    context,
                    "- [{}/{}] {} (confidence {:.2})",
                    record.kind, record.category, record.content, record.confidence
                );
            }
        }

        let query_lower = query.to_lowercase();
        let query_tokens: Vec<&str> = query_lower.split_whitespace().collect();
        let tasks: Vec<TaskKnowledge> = self
            .tasks
            .read()
            .await
            .iter()
            .filter(|t| {
                let haystack = format!("{} {}", t.task_type, t.description).to_lowercase();
                query_tokens.iter().any(|token| haystack.contains(token))
            })
            .take(3)
            .cloned()
            .collect();
        if !tasks.is_empty() {
            context.push_str("\n## Task knowledge\n");
            for task in &tasks {
                let _ = writeln!(
                    context,
                    "- {}: {} (succeeded {} times, ~{:.0}s)",
                    task.task_type, task.successful_approach, task.success_count,
                    task.avg_duration_secs
                );
            }
        }

        let preferences = self.preferences_above(0.6).await;
        if !preferences.is_empty() {
            context.push_str("\n## Preferences\n");
            for preference in preferences.iter().take(5) {
                let _ = writeln!(
                    context,
                    "- {} = {} (confidence {:.2})",
                    preference.key, preference.value, preference.confidence
                );
            }
        }

        let reflections = self.recent_reflections(3).await;
        if !reflections.is_empty() {
            context.push_str("\n## Recent reflections\n");
            for reflection in &reflections {
                let _ = writeln!(
                    context,
                    "- {:?}: {}",
                    reflection.outcome, reflection.interaction
                );
            }
        }

        context
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write one collection snapshot. Callers hold the collection's write
    /// guard, so snapshots cannot interleave.
    async fn persist<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| Error::Persistence(format!("Failed to serialize collection: {}", e)))?;
        tokio::fs::write(path, json).await.map_err(|e| {
            Error::Persistence(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

/// Load one collection snapshot, fail-open
fn load_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt collection snapshot, starting empty"
                );
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Whether `record` passes the caller's kind/category filter
fn passes_filter(record: &MemoryRecord, options: &RecallOptions) -> bool {
    if let Some(kind) = options.kind {
        if record.kind != kind {
            return false;
        }
    }
    if let Some(ref category) = options.category {
        if record.category != *category {
            return false;
        }
    }
    true
}

/// Keyword phase score for one record
fn keyword_score(record: &MemoryRecord, query_lower: &str, tokens: &[&str]) -> f32 {
    let content_lower = record.content.to_lowercase();
    let mut score = 0.0;

    if content_lower.contains(query_lower) {
        score += SCORE_EXACT_SUBSTRING;
    }
    for token in tokens {
        if content_lower.contains(token) {
            score += SCORE_TOKEN_CONTENT;
        }
        if record
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(token))
        {
            score += SCORE_TOKEN_TAG;
        }
    }

    score * record.confidence * record.success_rate
}

/// Exact case-insensitive match, or token overlap-over-union above the
/// duplicate threshold
fn is_near_duplicate(a: &str, b: &str) -> bool {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    if a_lower == b_lower {
        return true;
    }
    token_overlap(&a_lower, &b_lower) > DUPLICATE_OVERLAP_THRESHOLD
}

/// Symmetric overlap-over-union over whitespace tokens
fn token_overlap(a: &str, b: &str) -> f32 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f32;
    let union = tokens_a.union(&tokens_b).count() as f32;
    intersection / union
}

fn normalize_trigger(trigger: &str) -> String {
    trigger.trim().to_lowercase()
}

/// Bidirectional substring match on normalized triggers
fn fuzzy_trigger_match(existing: &str, incoming: &str) -> bool {
    existing.contains(incoming) || incoming.contains(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::embedding::mock::MockEmbedder;
    use tempfile::TempDir;

    async fn make_store() -> (MemoryStore, Arc<MockEmbedder>, TempDir) {
        let dir = TempDir::new().unwrap();
        let (store, provider) = make_store_in(&dir).await;
        (store, provider, dir)
    }

    async fn make_store_in(dir: &TempDir) -> (MemoryStore, Arc<MockEmbedder>) {
        let provider = Arc::new(MockEmbedder::new());
        let index = Arc::new(
            SemanticIndex::new(
                provider.clone(),
                IndexConfig::default(),
                dir.path().join("vector_index.json"),
            )
            .await
            .unwrap(),
        );
        let store = MemoryStore::new(
            dir.path().to_path_buf(),
            PrivacyFilter::new().unwrap(),
            index,
            RecallConfig::default(),
        )
        .await
        .unwrap();
        (store, provider)
    }

    fn fact(content: &str) -> MemoryCandidate {
        MemoryCandidate::new(MemoryKind::Fact, "general", content)
    }

    #[tokio::test]
    async fn test_remember_and_recall_exact_substring_first() {
        let (store, _provider, _guard) = make_store().await;

        let sam = store.remember(fact("User's name is Sam")).await.unwrap();
        store
            .remember(fact("Deploys happen on Fridays"))
            .await
            .unwrap();
        store.flush_indexing().await;

        let results = store.recall("Sam", RecallOptions::default()).await;
        assert!(!results.is_empty());
        assert_eq!(results[0].id, sam.id);
    }

    #[tokio::test]
    async fn test_near_duplicate_strengthens_instead_of_duplicating() {
        let (store, _provider, _guard) = make_store().await;

        let original = store
            .remember(fact("the deploy pipeline needs manual approval"))
            .await
            .unwrap();
        let merged = store
            .remember(fact("the deploy pipeline needs manual approval"))
            .await
            .unwrap();

        assert_eq!(original.id, merged.id);
        assert!((merged.confidence - 0.8).abs() < 1e-6);
        assert_eq!(merged.use_count, 1);
        assert_eq!(store.memory_count().await, 1);
    }

    #[tokio::test]
    async fn test_merge_confidence_caps_at_one() {
        let (store, _provider, _guard) = make_store().await;

        for _ in 0..6 {
            store
                .remember(fact("user always wants terse answers").confidence(0.7))
                .await
                .unwrap();
        }
        let record = store
            .remember(fact("user always wants terse answers"))
            .await
            .unwrap();
        assert!((record.confidence - 1.0).abs() < 1e-6);
        assert_eq!(store.memory_count().await, 1);
    }

    #[tokio::test]
    async fn test_remember_scrubs_pii() {
        let (store, _provider, _guard) = make_store().await;

        let record = store
            .remember(fact("User's backup email is sam@example.com"))
            .await
            .unwrap();
        assert!(record.has_pii);
        assert!(record.content.contains("[EMAIL]"));
        assert!(!record.content.contains("sam@example.com"));
    }

    #[tokio::test]
    async fn test_recall_respects_limit_and_is_deterministic() {
        let (store, _provider, _guard) = make_store().await;

        for i in 0..15 {
            store
                .remember(fact(&format!("project alpha note number {}", i)))
                .await
                .unwrap();
        }
        store.flush_indexing().await;

        let first = store.recall("project alpha", RecallOptions::default()).await;
        assert!(first.len() <= 10);

        let second = store.recall("project alpha", RecallOptions::default()).await;
        let first_ids: Vec<Uuid> = first.iter().map(|r| r.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|r| r.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_recall_kind_filter() {
        let (store, _provider, _guard) = make_store().await;

        store
            .remember(MemoryCandidate::new(
                MemoryKind::Preference,
                "ui",
                "prefers dark mode",
            ))
            .await
            .unwrap();
        store
            .remember(fact("dark mode saves battery"))
            .await
            .unwrap();
        store.flush_indexing().await;

        let results = store
            .recall(
                "dark mode",
                RecallOptions {
                    kind: Some(MemoryKind::Preference),
                    ..Default::default()
                },
            )
            .await;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.kind == MemoryKind::Preference));
    }

    #[tokio::test]
    async fn test_recall_tracks_usage() {
        let (store, _provider, _guard) = make_store().await;

        let record = store.remember(fact("usage tracked note")).await.unwrap();
        assert_eq!(record.use_count, 0);

        let results = store.recall("usage tracked", RecallOptions::default()).await;
        assert_eq!(results[0].use_count, 1);
        assert!(results[0].last_used_at.is_some());

        let stored = store.get_memory(&record.id).await.unwrap();
        assert_eq!(stored.use_count, 1);
    }

    #[tokio::test]
    async fn test_recall_keyword_only_when_provider_down() {
        let (store, provider, _guard) = make_store().await;

        provider.set_failing(true);
        let record = store.remember(fact("offline backend note")).await.unwrap();
        store.flush_indexing().await;

        // Still recallable by keyword despite zero semantic entries
        let results = store.recall("offline backend", RecallOptions::default()).await;
        assert_eq!(results[0].id, record.id);
    }

    #[tokio::test]
    async fn test_semantic_hit_without_keyword_match() {
        let (store, _provider, _guard) = make_store().await;

        let record = store
            .remember(fact("release checklist requires signoff"))
            .await
            .unwrap();
        store.flush_indexing().await;

        // Shares vocabulary with the stored text but no matching substring
        // tokens is hard to fake with the bag-of-words mock, so assert the
        // fused path at least keeps the record on a partial-overlap query.
        let results = store
            .recall("checklist signoff", RecallOptions::default())
            .await;
        assert!(results.iter().any(|r| r.id == record.id));
    }

    #[tokio::test]
    async fn test_forget() {
        let (store, _provider, _guard) = make_store().await;

        let record = store.remember(fact("temporary note")).await.unwrap();
        store.flush_indexing().await;

        assert!(store.forget(&record.id).await.unwrap());
        assert!(!store.forget(&record.id).await.unwrap());
        assert_eq!(store.memory_count().await, 0);
        assert!(store.index.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let (store, _provider, _guard) = make_store().await;

        store
            .remember(fact("stale note").expires_at(Utc::now() - chrono::Duration::hours(1)))
            .await
            .unwrap();
        store.remember(fact("durable note")).await.unwrap();

        let removed = store.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.memory_count().await, 1);

        // Idempotent
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_preference_lifecycle() {
        let (store, _provider, _guard) = make_store().await;

        let pref = store
            .learn_preference("editor.theme", serde_json::json!("dark"), "user said so")
            .await
            .unwrap();
        assert!((pref.confidence - 0.7).abs() < 1e-6);

        // Identical evidence strengthens monotonically up to the cap
        let pref = store
            .learn_preference("editor.theme", serde_json::json!("dark"), "again")
            .await
            .unwrap();
        assert!((pref.confidence - 0.85).abs() < 1e-6);
        let pref = store
            .learn_preference("editor.theme", serde_json::json!("dark"), "again")
            .await
            .unwrap();
        assert!((pref.confidence - 1.0).abs() < 1e-6);

        // Conflicting evidence replaces the value and resets confidence
        let pref = store
            .learn_preference("editor.theme", serde_json::json!("light"), "changed mind")
            .await
            .unwrap();
        assert_eq!(pref.value, serde_json::json!("light"));
        assert!((pref.confidence - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_get_preference_hides_low_confidence() {
        let (store, _provider, _guard) = make_store().await;

        store
            .learn_preference("tone", serde_json::json!("formal"), "guess")
            .await
            .unwrap();

        // Push confidence to 0.6, then conflict it down below the gate
        {
            let mut prefs = store.preferences.write().await;
            prefs[0].confidence = 0.5;
        }
        assert!(store.get_preference("tone").await.is_none());

        {
            let mut prefs = store.preferences.write().await;
            prefs[0].confidence = 0.51;
        }
        assert!(store.get_preference("tone").await.is_some());
    }

    #[tokio::test]
    async fn test_pattern_fuzzy_merge() {
        let (store, _provider, _guard) = make_store().await;

        store
            .learn_pattern("open", "opening the file", "open main.rs")
            .await
            .unwrap();
        let merged = store
            .learn_pattern("open the file", "opening the file", "open the config file")
            .await
            .unwrap();

        assert_eq!(merged.trigger, "open");
        assert_eq!(merged.success_count, 2);
        assert_eq!(
            merged.examples,
            vec!["open main.rs".to_string(), "open the config file".to_string()]
        );

        // Duplicate example is not added twice
        let merged = store
            .learn_pattern("open", "opening the file", "open main.rs")
            .await
            .unwrap();
        assert_eq!(merged.examples.len(), 2);
        assert_eq!(merged.success_count, 3);
    }

    #[tokio::test]
    async fn test_find_pattern_first_match_wins() {
        let (store, _provider, _guard) = make_store().await;

        store
            .learn_pattern("deploy", "run the deploy", "deploy now")
            .await
            .unwrap();
        store
            .learn_pattern("deploy to staging first", "staging deploy", "stage it")
            .await
            .unwrap();

        // Both fuzzy-match; insertion order decides
        let found = store.find_pattern("deploy").await.unwrap();
        assert_eq!(found.trigger, "deploy");
    }

    #[tokio::test]
    async fn test_record_pattern_failure() {
        let (store, _provider, _guard) = make_store().await;

        store
            .learn_pattern("rollback", "roll back the release", "roll it back")
            .await
            .unwrap();

        assert!(store.record_pattern_failure("rollback").await.unwrap());
        assert!(!store.record_pattern_failure("unrelated").await.unwrap());

        let pattern = store.find_pattern("rollback").await.unwrap();
        assert_eq!(pattern.fail_count, 1);
    }

    #[tokio::test]
    async fn test_task_knowledge_merge() {
        let (store, _provider, _guard) = make_store().await;

        let mut fixes = HashMap::new();
        fixes.insert("timeout".to_string(), "raise the limit".to_string());
        store
            .learn_task(
                "deploy",
                TaskOutcome {
                    description: "deploy the service".to_string(),
                    approach: "blue-green".to_string(),
                    tools: vec!["kubectl".to_string()],
                    steps: vec!["build".to_string(), "push".to_string()],
                    error_fixes: fixes,
                    duration_secs: 40.0,
                },
            )
            .await
            .unwrap();

        let mut fixes = HashMap::new();
        fixes.insert("oom".to_string(), "bump memory".to_string());
        let merged = store
            .learn_task(
                "deploy",
                TaskOutcome {
                    description: "deploy the service".to_string(),
                    approach: "canary".to_string(),
                    tools: vec!["kubectl".to_string(), "helm".to_string()],
                    steps: vec!["build".to_string(), "canary".to_string(), "promote".to_string()],
                    error_fixes: fixes,
                    duration_secs: 60.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(merged.success_count, 2);
        assert_eq!(merged.tools, vec!["kubectl".to_string(), "helm".to_string()]);
        // Steps are replaced, not appended
        assert_eq!(merged.steps.len(), 3);
        assert_eq!(merged.steps[1], "canary");
        // Error remedies are unioned
        assert_eq!(merged.error_fixes.len(), 2);
        assert!((merged.avg_duration_secs - 50.0).abs() < 1e-9);
        assert_eq!(merged.successful_approach, "canary");
    }

    #[tokio::test]
    async fn test_reflect_success_creates_learning_memories() {
        let (store, _provider, _guard) = make_store().await;

        store
            .reflect(
                "helped debug the flaky test",
                ReflectionOutcome::Success,
                ReflectionAnalysis {
                    what_worked: vec![
                        "reading the CI logs before guessing".to_string(),
                        "bisecting the commit range".to_string(),
                    ],
                    what_failed: vec![],
                    improvement: None,
                },
            )
            .await
            .unwrap();

        let memories = store.snapshot_memories().await;
        let learnings: Vec<_> = memories
            .iter()
            .filter(|r| r.kind == MemoryKind::Learning)
            .collect();
        assert_eq!(learnings.len(), 2);
        for learning in learnings {
            assert!((learning.confidence - 0.8).abs() < 1e-6);
            assert_eq!(learning.source, MemorySource::SelfGenerated);
        }
    }

    #[tokio::test]
    async fn test_reflect_failure_creates_correction() {
        let (store, _provider, _guard) = make_store().await;

        store
            .reflect(
                "misread the user's request",
                ReflectionOutcome::Failure,
                ReflectionAnalysis {
                    what_worked: vec![],
                    what_failed: vec!["assumed the wrong repo".to_string()],
                    improvement: Some("confirm the target repo before editing".to_string()),
                },
            )
            .await
            .unwrap();

        let memories = store.snapshot_memories().await;
        let corrections: Vec<_> = memories
            .iter()
            .filter(|r| r.kind == MemoryKind::Correction)
            .collect();
        assert_eq!(corrections.len(), 1);
        assert!((corrections[0].confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reflections_bounded() {
        let (store, _provider, _guard) = make_store().await;

        for i in 0..110 {
            store
                .reflect(
                    &format!("interaction {}", i),
                    ReflectionOutcome::Partial,
                    ReflectionAnalysis::default(),
                )
                .await
                .unwrap();
        }

        let recent = store.recent_reflections(200).await;
        assert_eq!(recent.len(), 100);
        // Newest first, oldest entries dropped
        assert_eq!(recent[0].interaction, "interaction 109");
        assert_eq!(recent[99].interaction, "interaction 10");
    }

    #[tokio::test]
    async fn test_build_context() {
        let (store, _provider, _guard) = make_store().await;

        store.remember(fact("User's name is Sam")).await.unwrap();
        store
            .learn_preference("tone", serde_json::json!("casual"), "observed")
            .await
            .unwrap();
        store
            .learn_task(
                "sam onboarding",
                TaskOutcome {
                    description: "walk Sam through setup".to_string(),
                    approach: "short checklist".to_string(),
                    tools: vec![],
                    steps: vec![],
                    error_fixes: HashMap::new(),
                    duration_secs: 120.0,
                },
            )
            .await
            .unwrap();
        store
            .reflect(
                "first session with Sam",
                ReflectionOutcome::Success,
                ReflectionAnalysis::default(),
            )
            .await
            .unwrap();
        store.flush_indexing().await;

        let context = store.build_context("Sam").await;
        assert!(context.contains("## Relevant memories"));
        assert!(context.contains("User's name is Sam"));
        assert!(context.contains("## Task knowledge"));
        assert!(context.contains("## Preferences"));
        assert!(context.contains("## Recent reflections"));
    }

    #[tokio::test]
    async fn test_snapshots_survive_restart() {
        let dir = TempDir::new().unwrap();
        let record_id;
        {
            let (store, _provider) = make_store_in(&dir).await;
            let record = store.remember(fact("persisted across restart")).await.unwrap();
            record_id = record.id;
            store
                .learn_preference("k", serde_json::json!(1), "src")
                .await
                .unwrap();
            store.flush_indexing().await;
        }

        let (store, _provider) = make_store_in(&dir).await;
        assert!(store.get_memory(&record_id).await.is_some());
        assert!(store.get_preference("k").await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("memories.json"), "[{broken").unwrap();

        let (store, _provider) = make_store_in(&dir).await;
        assert_eq!(store.memory_count().await, 0);
    }

    #[test]
    fn test_token_overlap() {
        assert!(token_overlap("a b c d e", "a b c d e") > 0.99);
        assert!(token_overlap("a b c d e", "a b c d f") > 0.6);
        assert_eq!(token_overlap("a b", "c d"), 0.0);
        assert_eq!(token_overlap("", "a"), 0.0);
    }

    #[test]
    fn test_keyword_score_exact_beats_partial() {
        let exact = fact("User's name is Sam").into_record("User's name is Sam".to_string(), false);
        let partial = fact("Sam asked about the weather")
            .into_record("Sam asked about the weather".to_string(), false);

        let query = "user's name is sam";
        let tokens: Vec<&str> = query.split_whitespace().collect();
        assert!(
            keyword_score(&exact, query, &tokens) > keyword_score(&partial, query, &tokens),
            "exact substring match must outrank partial token matches"
        );
    }
}
