//! MindVault error types

use thiserror::Error;

/// MindVault error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Privacy filter error
    #[error("Privacy error: {0}")]
    Privacy(String),

    /// Memory store error
    #[error("Memory error: {0}")]
    Memory(String),

    /// Durable snapshot write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Semantic index error
    #[error("Index error: {0}")]
    Index(String),

    /// Skill progression error
    #[error("Skill error: {0}")]
    Skill(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for MindVault operations
pub type Result<T> = std::result::Result<T, Error>;
