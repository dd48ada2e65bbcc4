//! Error types for ctmn

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ctmn operations
pub type Result<T> = std::result::Result<T, CtmnError>;

/// ctmn error types
#[derive(Error, Debug)]
pub enum CtmnError {
    #[error("Missing configuration file: {0}")]
    MissingConfigFile(PathBuf),

    #[error("No docker-compose.yml file in {0}")]
    NoComposeFile(PathBuf),

    #[error("Unknown configuration section '{0}' (expected 'global' or 'services')")]
    UnknownConfigSection(String),

    #[error("Unknown server '{0}'")]
    UnknownServer(String),

    #[error("Unknown service '{service}' in {context}")]
    UnknownService { service: String, context: String },

    #[error("Unknown value type '{0}' (expected 'constant', 'auto' or 'global')")]
    UnknownValueType(String),

    #[error("Unknown value generator '{0}'")]
    UnknownGenerator(String),

    #[error("Invalid global reference '{0}' (expected 'global.<namespace>.<key>')")]
    InvalidReference(String),

    #[error("Unresolved global reference '{0}'")]
    UnresolvedReference(String),

    #[error("Key '{key}' defined more than once in namespace '{namespace}'")]
    DuplicateKey { namespace: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}
