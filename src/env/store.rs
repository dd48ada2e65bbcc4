//! Namespaced storage of environment entries

use super::value::{
    check_single_line, scalar_to_string, validate_env_key, EnvValueType, GeneratedValue,
    Generator, GlobalRef, GENERATED_SECTION,
};
use crate::error::{CtmnError, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Raw namespace as written in a configuration file: value type -> key -> value
pub type RawNamespace = BTreeMap<String, Option<BTreeMap<String, Value>>>;

/// Resolved values of a store: namespace -> key -> value
pub type ResolvedEnvs = BTreeMap<String, BTreeMap<String, String>>;

/// Exported form of a store: namespace -> value type -> key -> value
pub type ExportedStore = BTreeMap<String, BTreeMap<String, BTreeMap<String, ExportedValue>>>;

/// Exported value of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportedValue {
    /// Constant value or global reference
    Plain(String),
    /// Generated value along with its generator
    Generated(GeneratedValue),
}

/// Conflict policy used when merging two stores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep the entry of the first store
    #[default]
    Preserve,
    /// Take the entry of the second store
    Overwrite,
}

/// A single environment entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    /// How the value was obtained
    pub kind: EnvValueType,
    /// What was written in the configuration (generator or reference for
    /// non-constant entries)
    pub source: String,
    /// Current value
    pub value: String,
}

impl EnvEntry {
    pub fn constant(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            kind: EnvValueType::Constant,
            source: value.clone(),
            value,
        }
    }

    pub fn generated(generator: Generator) -> Self {
        Self {
            kind: EnvValueType::Auto,
            source: generator.to_string(),
            value: generator.generate(),
        }
    }

    /// Value generated earlier, loaded back from an export
    pub fn pinned(generator: Generator, value: impl Into<String>) -> Self {
        Self {
            kind: EnvValueType::Auto,
            source: generator.to_string(),
            value: value.into(),
        }
    }

    /// Reference into the global section, resolved at render time
    pub fn reference(reference: &GlobalRef) -> Self {
        Self {
            kind: EnvValueType::Global,
            source: reference.to_string(),
            value: String::new(),
        }
    }
}

/// Entries of one namespace, keyed by variable name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvNamespace {
    entries: BTreeMap<String, EnvEntry>,
}

impl EnvNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, key: &str, entry: EnvEntry) -> Option<EnvEntry> {
        self.entries.insert(key.to_string(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&EnvEntry> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &EnvEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Environment store
///
/// Holds named namespaces of entries. The global section of a configuration
/// file is one store; each server gets its own store whose namespaces are
/// the services of that server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvStore {
    namespaces: BTreeMap<String, EnvNamespace>,
}

impl EnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entries to a namespace
    ///
    /// Only the syntax of `global` entries is checked here, they resolve at
    /// render time against whatever global store the configuration ends up
    /// with. Stores that cannot hold references (the global section itself)
    /// reject them.
    pub fn add_namespace(
        &mut self,
        name: &str,
        raw: &RawNamespace,
        allow_references: bool,
    ) -> Result<()> {
        if name.is_empty() || name.contains('.') {
            return Err(CtmnError::InvalidConfig(format!(
                "invalid namespace name '{}'",
                name
            )));
        }

        let namespace = self.namespaces.entry(name.to_string()).or_default();

        for (value_type, entries) in raw {
            let Some(entries) = entries else {
                continue;
            };
            if value_type == GENERATED_SECTION {
                for (key, raw_value) in entries {
                    Self::check_new_key(namespace, name, key)?;
                    let generated: GeneratedValue = serde_yaml::from_value(raw_value.clone())
                        .map_err(|e| {
                            CtmnError::InvalidConfig(format!(
                                "generated value of '{}' in namespace '{}': {}",
                                key, name, e
                            ))
                        })?;
                    check_single_line(name, key, &generated.value)?;
                    let generator = Generator::parse(&generated.generator)?;
                    namespace.insert(key, EnvEntry::pinned(generator, generated.value));
                }
                continue;
            }

            let kind: EnvValueType = value_type.parse()?;

            for (key, raw_value) in entries {
                Self::check_new_key(namespace, name, key)?;

                let raw_value = scalar_to_string(name, key, raw_value)?;
                let entry = match kind {
                    EnvValueType::Constant => EnvEntry::constant(raw_value),
                    EnvValueType::Auto => EnvEntry::generated(Generator::parse(&raw_value)?),
                    EnvValueType::Global => {
                        if !allow_references {
                            return Err(CtmnError::InvalidConfig(format!(
                                "namespace '{}' cannot hold 'global' entries",
                                name
                            )));
                        }
                        EnvEntry::reference(&GlobalRef::parse(&raw_value)?)
                    }
                };

                tracing::trace!(namespace = name, key = key.as_str(), kind = %kind, "Added entry");
                namespace.insert(key, entry);
            }
        }

        Ok(())
    }

    fn check_new_key(namespace: &EnvNamespace, name: &str, key: &str) -> Result<()> {
        validate_env_key(name, key)?;
        if namespace.contains(key) {
            return Err(CtmnError::DuplicateKey {
                namespace: name.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub fn namespace(&self, name: &str) -> Option<&EnvNamespace> {
        self.namespaces.get(name)
    }

    pub fn namespace_mut(&mut self, name: &str) -> &mut EnvNamespace {
        self.namespaces.entry(name.to_string()).or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Namespace names, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Look up the value a global reference points to
    pub fn lookup(&self, reference: &GlobalRef) -> Result<&str> {
        self.namespaces
            .get(&reference.namespace)
            .and_then(|ns| ns.get(&reference.key))
            .filter(|entry| entry.kind != EnvValueType::Global)
            .map(|entry| entry.value.as_str())
            .ok_or_else(|| CtmnError::UnresolvedReference(reference.to_string()))
    }

    /// Resolve the values of one namespace
    ///
    /// `global` entries are looked up in `global`.
    pub fn resolve_namespace(
        &self,
        name: &str,
        global: &EnvStore,
    ) -> Result<BTreeMap<String, String>> {
        let Some(namespace) = self.namespaces.get(name) else {
            return Ok(BTreeMap::new());
        };

        namespace
            .entries()
            .map(|(key, entry)| {
                let value = match entry.kind {
                    EnvValueType::Global => {
                        global.lookup(&GlobalRef::parse(&entry.source)?)?.to_string()
                    }
                    _ => entry.value.clone(),
                };
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Resolve every namespace
    pub fn resolve(&self, global: &EnvStore) -> Result<ResolvedEnvs> {
        self.keys()
            .map(|name| Ok((name.to_string(), self.resolve_namespace(name, global)?)))
            .collect()
    }

    /// Merge two stores into a new one
    pub fn merge(first: &EnvStore, second: &EnvStore, policy: MergePolicy) -> EnvStore {
        let mut merged = first.clone();

        for (name, namespace) in &second.namespaces {
            let target = merged.namespace_mut(name);
            for (key, entry) in namespace.entries() {
                if target.contains(key) && policy == MergePolicy::Preserve {
                    continue;
                }
                target.insert(key, entry.clone());
            }
        }

        merged
    }

    /// Reuse the values generated by a previous deployment
    ///
    /// Every `auto` entry takes the value of the `previous` entry at the same
    /// namespace and key, provided that one was produced by the same
    /// generator. Returns the number of reused values.
    pub fn keep_generated_from(&mut self, previous: &EnvStore) -> usize {
        let mut kept = 0;

        for (name, namespace) in self.namespaces.iter_mut() {
            let Some(old) = previous.namespace(name) else {
                continue;
            };
            for (key, entry) in namespace.entries.iter_mut() {
                if entry.kind != EnvValueType::Auto {
                    continue;
                }
                let Some(old_entry) = old.get(key) else {
                    continue;
                };
                if old_entry.kind == EnvValueType::Auto && old_entry.source == entry.source {
                    entry.value = old_entry.value.clone();
                    kept += 1;
                } else {
                    tracing::debug!(
                        namespace = name.as_str(),
                        key = key.as_str(),
                        "Generator changed, generating a new value"
                    );
                }
            }
        }

        kept
    }

    /// Export the store
    ///
    /// Generated values go to the `generated` section together with their
    /// generator so that the export loads back without generating new ones;
    /// references stay references.
    pub fn export(&self) -> ExportedStore {
        let mut exported = ExportedStore::new();

        for (name, namespace) in &self.namespaces {
            let sections = exported.entry(name.clone()).or_default();
            for (key, entry) in namespace.entries() {
                let (section, value) = match entry.kind {
                    EnvValueType::Constant => (
                        EnvValueType::Constant.to_string(),
                        ExportedValue::Plain(entry.value.clone()),
                    ),
                    EnvValueType::Global => (
                        EnvValueType::Global.to_string(),
                        ExportedValue::Plain(entry.source.clone()),
                    ),
                    EnvValueType::Auto => (
                        GENERATED_SECTION.to_string(),
                        ExportedValue::Generated(GeneratedValue {
                            generator: entry.source.clone(),
                            value: entry.value.clone(),
                        }),
                    ),
                };
                sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }

        exported
    }
}
