//! Light parsing of docker-compose files

use crate::error::{CtmnError, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default compose file name
pub const COMPOSE_FILENAME: &str = "docker-compose.yml";

/// Compose file names, in lookup order
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    COMPOSE_FILENAME,
    "docker-compose.yaml",
    "compose.yaml",
    "compose.yml",
];

/// Find compose file in directory
pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
    DEFAULT_COMPOSE_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[derive(Debug, Default, Deserialize)]
struct RawCompose {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    services: Option<BTreeMap<String, Value>>,
}

/// A compose file, only read for its version and service names
#[derive(Debug, Clone)]
pub struct ComposeFile {
    path: PathBuf,
    version: Option<String>,
    services: Vec<String>,
}

impl ComposeFile {
    /// Load the compose file of a directory
    pub fn load(dir: &Path) -> Result<Self> {
        let path = find_compose_file(dir).ok_or_else(|| CtmnError::NoComposeFile(dir.to_path_buf()))?;
        let content = std::fs::read_to_string(&path)?;
        let mut compose = Self::parse_str(&content).map_err(|e| match e {
            CtmnError::Yaml(msg) => CtmnError::Yaml(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        compose.path = path;
        Ok(compose)
    }

    /// Parse compose file from string
    pub fn parse_str(content: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(content)
            .map_err(|e| CtmnError::Yaml(format!("Failed to parse YAML: {}", e)))?;
        let raw: RawCompose = match document {
            Value::Null => RawCompose::default(),
            document => serde_yaml::from_value(document)
                .map_err(|e| CtmnError::Yaml(format!("Invalid compose file: {}", e)))?,
        };

        let version = match raw.version {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(CtmnError::InvalidConfig(format!(
                    "unexpected compose version {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            path: PathBuf::from(COMPOSE_FILENAME),
            version,
            services: raw.services.unwrap_or_default().into_keys().collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(COMPOSE_FILENAME)
    }

    /// Name docker compose picks up as the override of this file
    pub fn override_filename(&self) -> String {
        match self.filename().rsplit_once('.') {
            Some((stem, ext)) => format!("{}.override.{}", stem, ext),
            None => format!("{}.override.yml", self.filename()),
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Service names, sorted
    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }
}
