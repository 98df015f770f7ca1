//! Periodic compression of redundant knowledge
//!
//! Within any sufficiently large category, near-duplicate records are
//! grouped by semantic similarity and replaced with a single summary
//! record. Members are tagged `superseded` rather than deleted, which
//! preserves auditability; recall does not special-case the tag.
//!
//! Clustering is a single greedy pass: each unvisited record absorbs its
//! own similarity neighbors, but their neighbors are not pulled in
//! recursively. This is an intentional cheap approximation, not a
//! transitive closure.

use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::index::SemanticIndex;
use crate::memory::record::{MemoryCandidate, MemoryKind, MemoryRecord, MemorySource};
use crate::memory::store::MemoryStore;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Tag applied to cluster summary records
pub const TAG_SUMMARY: &str = "summary";
/// Tag applied to records produced by background passes
pub const TAG_AUTO_GENERATED: &str = "auto-generated";
/// Tag applied to cluster members replaced by a summary
pub const TAG_SUPERSEDED: &str = "superseded";

/// Outcome of one consolidation pass
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Categories large enough to be scanned
    pub categories_scanned: usize,
    /// Clusters that produced a summary record
    pub clusters_consolidated: usize,
    /// Members that gained the `superseded` tag
    pub records_superseded: usize,
}

/// Clusters near-duplicate memories per category and summarizes them
#[derive(Clone)]
pub struct Consolidator {
    config: ConsolidationConfig,
    bus: EventBus,
}

impl Consolidator {
    /// Create a consolidator with the given config and event bus
    pub fn new(config: ConsolidationConfig, bus: EventBus) -> Self {
        Self { config, bus }
    }

    /// Run one consolidation pass over a snapshot of the store.
    ///
    /// Safe to run repeatedly: already-superseded members and existing
    /// summaries are never re-clustered.
    pub async fn consolidate(
        &self,
        store: &MemoryStore,
        index: &SemanticIndex,
    ) -> Result<ConsolidationReport> {
        let snapshot = store.snapshot_memories().await;
        let by_id: HashMap<Uuid, &MemoryRecord> = snapshot.iter().map(|r| (r.id, r)).collect();

        let mut by_category: HashMap<&str, Vec<&MemoryRecord>> = HashMap::new();
        for record in &snapshot {
            by_category.entry(record.category.as_str()).or_default().push(record);
        }

        let mut report = ConsolidationReport::default();

        for (category, records) in &by_category {
            if records.len() < self.config.min_category_size {
                continue;
            }
            report.categories_scanned += 1;

            let mut visited: HashSet<Uuid> = HashSet::new();
            for record in records {
                if visited.contains(&record.id) || Self::excluded(record) {
                    continue;
                }
                visited.insert(record.id);

                let cluster = self
                    .gather_cluster(record, category, &by_id, &mut visited, index)
                    .await;
                if cluster.len() < self.config.min_cluster_size {
                    continue;
                }

                self.summarize_cluster(store, category, &cluster).await?;
                report.clusters_consolidated += 1;
                report.records_superseded += cluster.len();
            }
        }

        if report.clusters_consolidated > 0 {
            tracing::info!(
                clusters = report.clusters_consolidated,
                superseded = report.records_superseded,
                "Consolidation pass complete"
            );
        }
        Ok(report)
    }

    /// Absorb the record's unvisited similarity neighbors from its category
    async fn gather_cluster<'a>(
        &self,
        seed: &'a MemoryRecord,
        category: &str,
        by_id: &HashMap<Uuid, &'a MemoryRecord>,
        visited: &mut HashSet<Uuid>,
        index: &SemanticIndex,
    ) -> Vec<&'a MemoryRecord> {
        let mut cluster = vec![seed];

        let hits = index
            .query(
                &seed.content,
                self.config.neighbor_cap,
                self.config.similarity_threshold,
            )
            .await;

        for hit in hits {
            let memory_id = hit
                .metadata
                .get("memory_id")
                .and_then(|s| s.parse::<Uuid>().ok())
                .unwrap_or(hit.id);
            if visited.contains(&memory_id) {
                continue;
            }
            let Some(neighbor) = by_id.get(&memory_id).copied() else {
                continue;
            };
            if neighbor.category != category || Self::excluded(neighbor) {
                continue;
            }
            visited.insert(memory_id);
            cluster.push(neighbor);
        }

        cluster
    }

    /// Create the summary record and tag the members as superseded
    async fn summarize_cluster(
        &self,
        store: &MemoryStore,
        category: &str,
        cluster: &[&MemoryRecord],
    ) -> Result<()> {
        let mut content = cluster
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if content.chars().count() > self.config.max_summary_chars {
            content = content.chars().take(self.config.max_summary_chars).collect();
        }

        let summary = store
            .insert_unmerged(
                MemoryCandidate::new(MemoryKind::Learning, category, content)
                    .confidence(0.8)
                    .source(MemorySource::SelfGenerated)
                    .tag(TAG_SUMMARY)
                    .tag(TAG_AUTO_GENERATED),
            )
            .await?;

        let member_ids: Vec<Uuid> = cluster.iter().map(|r| r.id).collect();
        store.tag_records(&member_ids, TAG_SUPERSEDED).await?;

        self.bus.publish(EngineEvent::MemoriesConsolidated {
            category: category.to_string(),
            cluster_size: cluster.len(),
            summary_id: summary.id,
        });
        Ok(())
    }

    /// Summaries and already-superseded members never join a new cluster
    fn excluded(record: &MemoryRecord) -> bool {
        record.has_tag(TAG_SUPERSEDED) || record.has_tag(TAG_SUMMARY)
    }
}
