//! What a deployment writes

use crate::compose::{ComposeFile, EditableCompose};
use crate::config::ConfigFile;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Directory of generated env files, relative to a server directory
pub const ENVS_DIR: &str = "envs";

/// Directory of per-service configuration files, relative to a server directory
pub const CONFIGS_DIR: &str = "configs";

/// Where per-service configuration directories are mounted in containers
pub const CONFIGS_MOUNT: &str = "/cm_configs";

/// Materialized descriptor written at the target root
pub const DEPLOYED_CONFIG_FILENAME: &str = "cytomine.lock.yml";

/// Env file path of a service, relative to its server directory
pub fn env_file_path(service: &str) -> String {
    format!("{}/{}.env", ENVS_DIR, service)
}

/// Render env file contents, one `KEY=value` line per variable
pub fn render_env_file(envs: &BTreeMap<String, String>) -> String {
    envs.iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

/// Files generated for one server
#[derive(Debug, Clone)]
pub struct ServerPlan {
    pub server: String,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub compose: ComposeFile,
    /// Resolved variables per configured service
    pub env_files: BTreeMap<String, BTreeMap<String, String>>,
    /// Services with a configuration directory to mount
    pub config_dirs: Vec<String>,
    pub overrides: EditableCompose,
    pub warnings: Vec<String>,
}

/// Files generated for a whole deployment
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub config: ConfigFile,
    pub servers: Vec<ServerPlan>,
    /// Generated values reused from the previous deployment
    pub kept_generated: usize,
}

impl DeploymentPlan {
    pub fn warnings(&self) -> Vec<String> {
        self.servers
            .iter()
            .flat_map(|s| s.warnings.iter().cloned())
            .collect()
    }
}

/// Outcome of a deployment
#[derive(Debug, Clone, Default)]
pub struct DeploymentReport {
    /// Files written, or that would be written on a dry run
    pub files: Vec<PathBuf>,
    pub kept_generated: usize,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}
