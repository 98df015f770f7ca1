//! Semantic index over embedded text
//!
//! Stores `(text, embedding, metadata)` entries and answers nearest-neighbor
//! queries by cosine similarity with a linear scan — deliberately not
//! ANN-indexed, which is acceptable at the modest scale this engine targets.
//! The full entry list is persisted as a JSON snapshot on every mutation and
//! loaded fail-open at startup.

use crate::config::IndexConfig;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A single indexed embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Entry id, shared with the record it indexes when applicable
    pub id: Uuid,
    /// The embedded text
    pub text: String,
    /// Fixed-length embedding vector
    pub embedding: Vec<f32>,
    /// Opaque key/value bag used to join back to the source record
    pub metadata: HashMap<String, String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A ranked query hit
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Id of the matching entry
    pub id: Uuid,
    /// Cosine similarity score
    pub score: f32,
    /// Metadata of the matching entry
    pub metadata: HashMap<String, String>,
}

/// Cosine-similarity index backed by an embedding provider
pub struct SemanticIndex {
    provider: Arc<dyn EmbeddingProvider>,
    config: IndexConfig,
    snapshot_path: PathBuf,
    entries: Arc<RwLock<Vec<VectorEntry>>>,
}

impl SemanticIndex {
    /// Create an index, loading any existing snapshot from `snapshot_path`.
    ///
    /// A missing or unreadable snapshot starts the index empty.
    pub async fn new(
        provider: Arc<dyn EmbeddingProvider>,
        config: IndexConfig,
        snapshot_path: PathBuf,
    ) -> crate::Result<Self> {
        if let Some(parent) = snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = load_snapshot(&snapshot_path);
        Ok(Self {
            provider,
            config,
            snapshot_path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Index a text with metadata, returning the new entry id.
    ///
    /// Returns `None` when the embedding provider fails — semantic indexing
    /// was skipped, which callers must not treat as an error.
    pub async fn index(
        &self,
        id: Uuid,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Option<Uuid> {
        let embedding = match self.provider.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "Semantic indexing skipped"
                );
                return None;
            }
        };

        let entry = VectorEntry {
            id,
            text: text.to_string(),
            embedding,
            metadata,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        entries.push(entry);
        self.persist(&entries).await;
        Some(id)
    }

    /// Query for the `limit` most similar entries at or above `threshold`.
    ///
    /// A provider failure degrades to an empty result set rather than an
    /// error, so keyword-only recall still works.
    pub async fn query(&self, text: &str, limit: usize, threshold: f32) -> Vec<IndexHit> {
        let query_embedding = match self.provider.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "Semantic query skipped"
                );
                return Vec::new();
            }
        };

        let entries = self.entries.read().await;
        let mut hits: Vec<IndexHit> = entries
            .iter()
            .map(|entry| IndexHit {
                id: entry.id,
                score: cosine_similarity(&query_embedding, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }

    /// Query using the configured defaults
    pub async fn query_default(&self, text: &str) -> Vec<IndexHit> {
        self.query(
            text,
            self.config.max_results,
            self.config.similarity_threshold,
        )
        .await
    }

    /// Remove an entry by id, returning whether it existed
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != *id);
        let removed = entries.len() != before;
        if removed {
            self.persist(&entries).await;
        }
        removed
    }

    /// The configured minimum similarity for query hits
    pub fn similarity_threshold(&self) -> f32 {
        self.config.similarity_threshold
    }

    /// Number of indexed entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the index holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Write the full entry list. Called with the write guard held so
    /// concurrent mutations cannot interleave snapshots.
    async fn persist(&self, entries: &[VectorEntry]) {
        let json = match serde_json::to_string_pretty(entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize vector index");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.snapshot_path, json).await {
            tracing::warn!(
                path = %self.snapshot_path.display(),
                error = %e,
                "Failed to persist vector index"
            );
        }
    }
}

/// Load a snapshot, treating missing or corrupt files as empty
fn load_snapshot(path: &std::path::Path) -> Vec<VectorEntry> {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt vector index snapshot, starting empty"
                );
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}
