//! Deployment descriptor (`cytomine.yml`)

use crate::env::{EnvStore, MergePolicy, RawNamespace};
use crate::env::store::ExportedStore;
use crate::error::{CtmnError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default descriptor file name
pub const CONFIG_FILENAME: &str = "cytomine.yml";

/// Descriptor file names, in lookup order
pub const DEFAULT_CONFIG_FILES: &[&str] = &[CONFIG_FILENAME, "cytomine.yaml"];

/// Server whose files live at the root of the deployment directory
pub const DEFAULT_SERVER: &str = "default";

/// Top-level sections of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Global,
    Services,
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSection::Global => write!(f, "global"),
            ConfigSection::Services => write!(f, "services"),
        }
    }
}

impl FromStr for ConfigSection {
    type Err = CtmnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(ConfigSection::Global),
            "services" => Ok(ConfigSection::Services),
            other => Err(CtmnError::UnknownConfigSection(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: Option<BTreeMap<String, Option<RawNamespace>>>,
    #[serde(default)]
    services: Option<BTreeMap<String, Option<BTreeMap<String, Option<RawNamespace>>>>>,
}

/// Exported descriptor, loadable again with [`ConfigFile::parse_str`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigExport {
    pub global: ExportedStore,
    pub services: BTreeMap<String, ExportedStore>,
}

/// Find the descriptor in a directory
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Parsed deployment descriptor
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    global: EnvStore,
    servers: BTreeMap<String, EnvStore>,
}

impl ConfigFile {
    /// Load a descriptor from a file
    ///
    /// A missing file is an empty configuration unless `must_exist` is set.
    pub fn load(path: &Path, must_exist: bool) -> Result<Self> {
        if !path.is_file() {
            if must_exist {
                return Err(CtmnError::MissingConfigFile(path.to_path_buf()));
            }
            tracing::debug!("No configuration at {}, using an empty one", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse_str(&content).map_err(|e| match e {
            CtmnError::Yaml(msg) => CtmnError::Yaml(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        config.path = Some(path.to_path_buf());

        tracing::debug!(
            "Loaded {} ({} global namespaces, {} servers)",
            path.display(),
            config.global.len(),
            config.servers.len()
        );
        Ok(config)
    }

    /// Parse a descriptor from a string
    pub fn parse_str(content: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(content)
            .map_err(|e| CtmnError::Yaml(format!("Failed to parse YAML: {}", e)))?;

        let mapping = match document {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(CtmnError::InvalidConfig(
                    "top level of the configuration must be a mapping".to_string(),
                ))
            }
        };

        // both sections are optional, nothing else is allowed
        for key in mapping.keys() {
            let name = key.as_str().ok_or_else(|| {
                CtmnError::InvalidConfig(format!("section name must be a string, got {:?}", key))
            })?;
            name.parse::<ConfigSection>()?;
        }

        let raw: RawConfig = serde_yaml::from_value(Value::Mapping(mapping))
            .map_err(|e| CtmnError::Yaml(format!("Invalid configuration layout: {}", e)))?;

        let mut config = Self::default();

        for (namespace, entries) in raw.global.unwrap_or_default() {
            config
                .global
                .add_namespace(&namespace, &entries.unwrap_or_default(), false)?;
        }

        for (server, services) in raw.services.unwrap_or_default() {
            let mut store = EnvStore::new();
            for (service, entries) in services.unwrap_or_default() {
                store.add_namespace(&service, &entries.unwrap_or_default(), true)?;
            }
            config.servers.insert(server, store);
        }

        Ok(config)
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn global_envs(&self) -> &EnvStore {
        &self.global
    }

    /// Server names, sorted
    pub fn servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// Services configured for a server
    pub fn services(&self, server: &str) -> Result<Vec<String>> {
        Ok(self.server_store(server)?.keys().map(str::to_string).collect())
    }

    /// Env store of a server
    pub fn server_store(&self, server: &str) -> Result<&EnvStore> {
        self.servers
            .get(server)
            .ok_or_else(|| CtmnError::UnknownServer(server.to_string()))
    }

    /// Check that every global reference resolves
    pub fn validate(&self) -> Result<()> {
        for store in self.servers.values() {
            store.resolve(&self.global)?;
        }
        Ok(())
    }

    /// Reuse the values generated by a previous deployment
    pub fn keep_generated_from(&mut self, previous: &ConfigFile) -> usize {
        let mut kept = self.global.keep_generated_from(&previous.global);
        for (server, store) in self.servers.iter_mut() {
            if let Some(old) = previous.servers.get(server) {
                kept += store.keep_generated_from(old);
            }
        }
        kept
    }

    pub fn export(&self) -> ConfigExport {
        ConfigExport {
            global: self.global.export(),
            services: self
                .servers
                .iter()
                .map(|(server, store)| (server.clone(), store.export()))
                .collect(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.export())
            .map_err(|e| CtmnError::Yaml(format!("Failed to serialize configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Write the exported configuration to a file
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        tracing::debug!("Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Merge two configurations into a new one
    pub fn merge(first: &ConfigFile, second: &ConfigFile, policy: MergePolicy) -> ConfigFile {
        let mut merged = ConfigFile {
            path: first.path.clone(),
            global: EnvStore::merge(&first.global, &second.global, policy),
            servers: BTreeMap::new(),
        };

        for (server, store) in &first.servers {
            let other = second.servers.get(server).cloned().unwrap_or_default();
            merged
                .servers
                .insert(server.clone(), EnvStore::merge(store, &other, policy));
        }

        for (server, store) in &second.servers {
            if !merged.servers.contains_key(server) {
                merged.servers.insert(server.clone(), store.clone());
            }
        }

        merged
    }

    /// Load several descriptors, later ones overriding earlier ones
    ///
    /// References are only resolved once every file is merged, so a file
    /// may refer to globals defined by another.
    pub fn merge_files(paths: &[PathBuf]) -> Result<ConfigFile> {
        let mut config: Option<ConfigFile> = None;

        for path in paths {
            let file_config = Self::load(path, true)?;
            config = Some(match config {
                Some(base) => Self::merge(&base, &file_config, MergePolicy::Overwrite),
                None => file_config,
            });
        }

        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}
