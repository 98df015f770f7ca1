//! Engine context — the composition root of the knowledge layer
//!
//! One [`KnowledgeEngine`] is constructed by the orchestration layer at
//! startup and passed by reference; there is no process-wide singleton.
//! It owns the memory store, semantic index, consolidator and skill engine,
//! and runs the background sweeps (TTL expiry, idle decay, weekly
//! consolidation) until shut down.

use crate::config::EngineConfig;
use crate::embedding::{EmbeddingProvider, HttpEmbedder};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::index::SemanticIndex;
use crate::memory::{ConsolidationReport, Consolidator, MemoryStore};
use crate::privacy::PrivacyFilter;
use crate::skills::{SkillDependency, SkillEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// The assembled knowledge engine
pub struct KnowledgeEngine {
    config: EngineConfig,
    store: Arc<MemoryStore>,
    index: Arc<SemanticIndex>,
    skills: Arc<SkillEngine>,
    consolidator: Consolidator,
    bus: EventBus,
    shutdown: broadcast::Sender<()>,
    maintenance: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl KnowledgeEngine {
    /// Assemble the engine with an explicit embedding provider.
    pub async fn new(
        config: EngineConfig,
        provider: Arc<dyn EmbeddingProvider>,
        dependencies: Vec<SkillDependency>,
    ) -> Result<Self> {
        let data_dir = config.storage.data_dir.clone();
        let bus = EventBus::new();

        let index = Arc::new(
            SemanticIndex::new(
                provider,
                config.index.clone(),
                data_dir.join("vector_index.json"),
            )
            .await?,
        );

        let store = Arc::new(
            MemoryStore::new(
                data_dir.clone(),
                PrivacyFilter::new()?,
                index.clone(),
                config.recall.clone(),
            )
            .await?,
        );

        let skills = Arc::new(
            SkillEngine::new(
                data_dir.join("skill_profiles.json"),
                config.decay.clone(),
                dependencies,
                bus.clone(),
            )
            .await?,
        );

        let consolidator = Consolidator::new(config.consolidation.clone(), bus.clone());
        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            index,
            skills,
            consolidator,
            bus,
            shutdown,
            maintenance: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Assemble the engine with the configured HTTP embedding backend.
    pub async fn open(config: EngineConfig, dependencies: Vec<SkillDependency>) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(HttpEmbedder::new(&config.embedding)?);
        Self::new(config, provider, dependencies).await
    }

    /// The memory store
    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The semantic index
    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    /// The skill progression engine
    pub fn skills(&self) -> &Arc<SkillEngine> {
        &self.skills
    }

    /// Subscribe to domain events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Run one consolidation pass now
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        self.consolidator.consolidate(&self.store, &self.index).await
    }

    /// Spawn the background sweeps: TTL expiry and idle decay hourly,
    /// consolidation weekly (intervals are configurable). Each loop stops
    /// when `shutdown` is called. Sweeps are idempotent, so an extra run
    /// does no harm.
    pub fn start_maintenance(&self) {
        let sweeps = &self.config.sweeps;
        let mut handles = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());

        {
            let store = self.store.clone();
            let mut rx = self.shutdown.subscribe();
            let period = Duration::from_secs(sweeps.expiry_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // The first tick fires immediately; sweeps wait one period
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = store.sweep_expired().await {
                                tracing::warn!(error = %e, "Expiry sweep failed");
                            }
                        }
                        _ = rx.recv() => {
                            tracing::info!("Expiry sweep stopped");
                            break;
                        }
                    }
                }
            }));
        }

        {
            let skills = self.skills.clone();
            let mut rx = self.shutdown.subscribe();
            let period = Duration::from_secs(sweeps.decay_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = skills.trigger_decay().await {
                                tracing::warn!(error = %e, "Decay sweep failed");
                            }
                        }
                        _ = rx.recv() => {
                            tracing::info!("Decay sweep stopped");
                            break;
                        }
                    }
                }
            }));
        }

        {
            let store = self.store.clone();
            let index = self.index.clone();
            let consolidator = self.consolidator.clone();
            let mut rx = self.shutdown.subscribe();
            let period = Duration::from_secs(sweeps.consolidation_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = consolidator.consolidate(&store, &index).await {
                                tracing::warn!(error = %e, "Consolidation pass failed");
                            }
                        }
                        _ = rx.recv() => {
                            tracing::info!("Consolidation loop stopped");
                            break;
                        }
                    }
                }
            }));
        }

        tracing::info!("Maintenance sweeps started");
    }

    /// Stop the background sweeps and wait for queued indexing to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
        self.store.flush_indexing().await;
        tracing::info!("Knowledge engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockEmbedder;
    use crate::memory::{MemoryCandidate, MemoryKind, RecallOptions};
    use tempfile::TempDir;

    async fn make_engine() -> (KnowledgeEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        let engine = KnowledgeEngine::new(config, Arc::new(MockEmbedder::new()), Vec::new())
            .await
            .unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn test_end_to_end_remember_award_subscribe() {
        let (engine, _dir) = make_engine().await;
        let mut rx = engine.subscribe();

        engine
            .memory()
            .remember(MemoryCandidate::new(
                MemoryKind::Fact,
                "identity",
                "User's name is Sam",
            ))
            .await
            .unwrap();
        engine.memory().flush_indexing().await;

        let results = engine
            .memory()
            .recall("Sam", RecallOptions::default())
            .await;
        assert!(!results.is_empty());

        engine
            .skills()
            .award_xp("agent-a", "Scout", "rust", 120, "task")
            .await
            .unwrap();

        let mut saw_level_up = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::LevelUp { .. }) {
                saw_level_up = true;
            }
        }
        assert!(saw_level_up);
    }

    #[tokio::test]
    async fn test_maintenance_start_and_shutdown() {
        let (engine, _dir) = make_engine().await;
        engine.start_maintenance();
        // Shutdown must stop all loops promptly
        tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
            .await
            .expect("shutdown did not complete in time");
    }

    #[tokio::test]
    async fn test_consolidate_via_engine() {
        let (engine, _dir) = make_engine().await;
        let report = engine.consolidate().await.unwrap();
        assert_eq!(report.clusters_consolidated, 0);
    }
}
