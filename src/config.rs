//! MindVault configuration management

use crate::skills::SkillLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main MindVault configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Semantic index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Hybrid recall configuration
    #[serde(default)]
    pub recall: RecallConfig,

    /// Skill idle-decay configuration
    #[serde(default)]
    pub decay: DecayConfig,

    /// Memory consolidation configuration
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Background sweep intervals
    #[serde(default)]
    pub sweeps: SweepConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for durable collection snapshots
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mindvault");
        Self { data_dir: base }
    }
}

/// Embedding provider configuration
///
/// Points at an OpenAI-compatible `/embeddings` endpoint. The API key is
/// read from the environment variable named by `api_key_env`, so secrets
/// never live in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embeddings API
    pub base_url: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Environment variable holding the API key (optional for local servers)
    pub api_key_env: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Expected embedding dimensions
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 10,
            dimensions: 384,
        }
    }
}

/// Semantic index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Minimum cosine similarity for a query hit
    pub similarity_threshold: f32,

    /// Default maximum results per query
    pub max_results: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            max_results: 5,
        }
    }
}

/// Hybrid recall configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Default result limit for `recall`
    pub default_limit: usize,

    /// Result cap for the semantic phase
    pub semantic_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            semantic_limit: 5,
        }
    }
}

/// Skill idle-decay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Days a skill may sit idle before decay starts
    pub idle_threshold_days: i64,

    /// XP subtracted per idle day past the threshold
    pub rate_per_day: f64,

    /// Decay never pushes a skill below this level's XP threshold
    pub floor_level: SkillLevel,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            idle_threshold_days: 7,
            rate_per_day: 5.0,
            floor_level: SkillLevel::Intermediate,
        }
    }
}

/// Memory consolidation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Minimum records in a category before it is considered
    pub min_category_size: usize,

    /// Cosine similarity threshold for cluster membership
    pub similarity_threshold: f32,

    /// Maximum neighbors pulled per similarity query
    pub neighbor_cap: usize,

    /// Minimum cluster size worth summarizing
    pub min_cluster_size: usize,

    /// Summary content is truncated to this many characters
    pub max_summary_chars: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_category_size: 10,
            similarity_threshold: 0.7,
            neighbor_cap: 10,
            min_cluster_size: 3,
            max_summary_chars: 500,
        }
    }
}

/// Background sweep intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// TTL expiry sweep interval in seconds
    pub expiry_interval_secs: u64,

    /// Skill idle-decay sweep interval in seconds
    pub decay_interval_secs: u64,

    /// Consolidation pass interval in seconds
    pub consolidation_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            expiry_interval_secs: 3600,
            decay_interval_secs: 3600,
            consolidation_interval_secs: 604_800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.index.similarity_threshold, 0.3);
        assert_eq!(config.index.max_results, 5);
        assert_eq!(config.recall.default_limit, 10);
        assert_eq!(config.decay.idle_threshold_days, 7);
        assert_eq!(config.decay.floor_level, SkillLevel::Intermediate);
        assert_eq!(config.consolidation.min_category_size, 10);
        assert!(config.storage.data_dir.ends_with("mindvault"));
    }

    #[test]
    fn test_partial_toml_round_trip() {
        let toml_src = r#"
            [recall]
            default_limit = 3
            semantic_limit = 2

            [decay]
            idle_threshold_days = 14
            rate_per_day = 2.5
            floor_level = "beginner"
        "#;
        let config: EngineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.recall.default_limit, 3);
        assert_eq!(config.decay.idle_threshold_days, 14);
        assert_eq!(config.decay.floor_level, SkillLevel::Beginner);
        // Unspecified sections fall back to defaults
        assert_eq!(config.index.similarity_threshold, 0.3);
        assert_eq!(config.consolidation.max_summary_chars, 500);
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = EngineConfig::from_toml_file("/nonexistent/mindvault.toml");
        assert!(result.is_err());
    }
}
