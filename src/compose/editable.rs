//! Compose override files
//!
//! Only the parts of a service ctmn manages can be edited: its `env_file`
//! and its `volumes`.

use crate::error::{CtmnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Compose version written when none is given
pub const DEFAULT_COMPOSE_VERSION: &str = "3.9";

/// Editable part of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
}

/// Compose document built by ctmn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableCompose {
    version: String,
    services: BTreeMap<String, ServiceOverride>,
}

impl Default for EditableCompose {
    fn default() -> Self {
        Self::new(DEFAULT_COMPOSE_VERSION)
    }
}

impl EditableCompose {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            services: BTreeMap::new(),
        }
    }

    fn service_mut(&mut self, service: &str) -> &mut ServiceOverride {
        self.services.entry(service.to_string()).or_default()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Service names, sorted
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn service(&self, service: &str) -> Option<&ServiceOverride> {
        self.services.get(service)
    }

    pub fn set_service_env_file(&mut self, service: &str, path: &str) {
        self.service_mut(service).env_file = Some(path.to_string());
    }

    pub fn service_volumes(&self, service: &str) -> Result<&[String]> {
        self.services
            .get(service)
            .map(|s| s.volumes.as_slice())
            .ok_or_else(|| CtmnError::UnknownService {
                service: service.to_string(),
                context: "compose override".to_string(),
            })
    }

    pub fn add_service_volume(&mut self, service: &str, mapping: &str) {
        self.service_mut(service).volumes.push(mapping.to_string());
    }

    pub fn clear_service_volumes(&mut self, service: &str) {
        if let Some(s) = self.services.get_mut(service) {
            s.volumes.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| CtmnError::Yaml(format!("Failed to serialize compose file: {}", e)))
    }

    /// Write the document to `dir/filename`
    pub fn write_to(&self, dir: &Path, filename: &str) -> Result<PathBuf> {
        let path = dir.join(filename);
        std::fs::write(&path, self.to_yaml()?)?;
        Ok(path)
    }
}
