//! Deployment generation

use super::options::DeployOptions;
use super::plan::{
    env_file_path, render_env_file, DeploymentPlan, DeploymentReport, ServerPlan, CONFIGS_DIR,
    CONFIGS_MOUNT, DEPLOYED_CONFIG_FILENAME, ENVS_DIR,
};
use crate::compose::{ComposeFile, EditableCompose, DEFAULT_COMPOSE_VERSION};
use crate::config::{find_config_file, ConfigFile, CONFIG_FILENAME, DEFAULT_SERVER};
use crate::env::EnvStore;
use crate::error::{CtmnError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory of a server below a deployment root
pub fn server_dir(root: &Path, server: &str) -> PathBuf {
    if server == DEFAULT_SERVER {
        root.to_path_buf()
    } else {
        root.join(server)
    }
}

/// Generates the files of a deployment
pub struct Deployer {
    options: DeployOptions,
}

impl Deployer {
    pub fn new(options: DeployOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Load the descriptor, its overlays and the previous deployment's values
    ///
    /// Returns the configuration and the number of reused generated values.
    pub fn load_config(&self) -> Result<(ConfigFile, usize)> {
        let main = find_config_file(&self.options.source)
            .ok_or_else(|| CtmnError::MissingConfigFile(self.options.source.join(CONFIG_FILENAME)))?;

        let mut paths = vec![main];
        paths.extend(self.options.overlays.iter().cloned());
        let mut config = ConfigFile::merge_files(&paths)?;

        let mut kept = 0;
        let previous_path = self.options.target.join(DEPLOYED_CONFIG_FILENAME);
        if !self.options.regenerate && previous_path.is_file() {
            let previous = ConfigFile::load(&previous_path, true)?;
            kept = config.keep_generated_from(&previous);
            tracing::info!(
                "Reusing {} generated values from {}",
                kept,
                previous_path.display()
            );
        }

        Ok((config, kept))
    }

    /// Compute everything a deployment writes
    pub fn plan(&self) -> Result<DeploymentPlan> {
        let (config, kept_generated) = self.load_config()?;

        let mut servers = config.servers();
        if servers.is_empty() {
            servers.push(DEFAULT_SERVER.to_string());
        }

        let servers = servers
            .iter()
            .map(|server| self.plan_server(&config, server))
            .collect::<Result<Vec<_>>>()?;

        Ok(DeploymentPlan {
            config,
            servers,
            kept_generated,
        })
    }

    fn plan_server(&self, config: &ConfigFile, server: &str) -> Result<ServerPlan> {
        let source_dir = server_dir(&self.options.source, server);
        let target_dir = server_dir(&self.options.target, server);
        let compose = ComposeFile::load(&source_dir)?;

        let empty = EnvStore::new();
        let store = match config.server_store(server) {
            Ok(store) => store,
            Err(CtmnError::UnknownServer(_)) => &empty,
            Err(e) => return Err(e),
        };

        for service in store.keys() {
            if !compose.has_service(service) {
                return Err(CtmnError::UnknownService {
                    service: service.to_string(),
                    context: format!("{} (server '{}')", compose.path().display(), server),
                });
            }
        }

        let warnings = compose
            .services()
            .iter()
            .filter(|service| !store.contains(service))
            .map(|service| {
                format!(
                    "Service '{}' of server '{}' has no configuration",
                    service, server
                )
            })
            .collect();

        let mut env_files = BTreeMap::new();
        let mut config_dirs = Vec::new();
        let mut overrides =
            EditableCompose::new(compose.version().unwrap_or(DEFAULT_COMPOSE_VERSION));

        for service in store.keys() {
            env_files.insert(
                service.to_string(),
                store.resolve_namespace(service, config.global_envs())?,
            );
            overrides.set_service_env_file(service, &env_file_path(service));

            if source_dir.join(CONFIGS_DIR).join(service).is_dir() {
                overrides.add_service_volume(
                    service,
                    &format!("./{}/{}:{}:ro", CONFIGS_DIR, service, CONFIGS_MOUNT),
                );
                config_dirs.push(service.to_string());
            }
        }

        tracing::debug!(
            "Planned server '{}': {} services configured, {} in compose file",
            server,
            env_files.len(),
            compose.services().len()
        );

        Ok(ServerPlan {
            server: server.to_string(),
            source_dir,
            target_dir,
            compose,
            env_files,
            config_dirs,
            overrides,
            warnings,
        })
    }

    /// Validate the deployment without writing anything
    pub fn check(&self) -> Result<Vec<String>> {
        Ok(self.plan()?.warnings())
    }

    /// Generate and write the deployment
    pub fn deploy(&self) -> Result<DeploymentReport> {
        let plan = self.plan()?;
        let in_place = self.options.in_place();

        let mut report = DeploymentReport {
            kept_generated: plan.kept_generated,
            warnings: plan.warnings(),
            dry_run: self.options.dry_run,
            ..DeploymentReport::default()
        };

        for server in &plan.servers {
            tracing::info!(
                "Deploying server '{}' to {}",
                server.server,
                server.target_dir.display()
            );
            self.write_server(server, in_place, &mut report.files)?;
        }

        let deployed = self.options.target.join(DEPLOYED_CONFIG_FILENAME);
        if !self.options.dry_run {
            plan.config.write_to(&deployed)?;
        }
        report.files.push(deployed);

        Ok(report)
    }

    fn write_server(
        &self,
        server: &ServerPlan,
        in_place: bool,
        files: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let target = &server.target_dir;
        let envs_dir = target.join(ENVS_DIR);
        if !self.options.dry_run {
            std::fs::create_dir_all(&envs_dir)?;
        }

        if !in_place {
            let compose_target = target.join(server.compose.filename());
            self.copy_file(server.compose.path(), &compose_target)?;
            files.push(compose_target);

            for service in &server.config_dirs {
                let from = server.source_dir.join(CONFIGS_DIR).join(service);
                let to = target.join(CONFIGS_DIR).join(service);
                files.extend(self.copy_dir(&from, &to)?);
            }
        }

        for (service, envs) in &server.env_files {
            let path = target.join(env_file_path(service));
            self.write_file(&path, &render_env_file(envs))?;
            files.push(path);
        }

        let override_path = target.join(server.compose.override_filename());
        if !self.options.dry_run {
            server
                .overrides
                .write_to(target, &server.compose.override_filename())?;
        }
        files.push(override_path);

        Ok(())
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if self.options.dry_run {
            tracing::debug!("Would write {}", path.display());
            return Ok(());
        }
        std::fs::write(path, content)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if self.options.dry_run {
            tracing::debug!("Would copy {} to {}", from.display(), to.display());
            return Ok(());
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
        Ok(())
    }

    /// Copy a directory tree, returning the copied files
    fn copy_dir(&self, from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
        let mut copied = Vec::new();

        for entry in WalkDir::new(from) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| CtmnError::InvalidConfig(e.to_string()))?;
            let destination = to.join(relative);

            if entry.file_type().is_dir() {
                if !self.options.dry_run {
                    std::fs::create_dir_all(&destination)?;
                }
            } else {
                self.copy_file(entry.path(), &destination)?;
                copied.push(destination);
            }
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
global:
  javamelody:
    constant:
      JAVAMELODY_USER: admin
    auto:
      JAVAMELODY_PASSWORD: random_uuid
services:
  default:
    core:
      constant:
        SERVER_PORT: 8080
      global:
        JAVAMELODY_USER: global.javamelody.JAVAMELODY_USER
        JAVAMELODY_PASSWORD: global.javamelody.JAVAMELODY_PASSWORD
    postgis:
      auto:
        POSTGRES_PASSWORD: openssl rand -hex 16
  ims-server:
    ims:
      constant:
        IMS_STORAGE_PATH: /data/images
"#;

    const DEFAULT_COMPOSE: &str = r#"
version: "3.9"
services:
  core:
    image: cytomine/core:latest
  postgis:
    image: cytomine/postgis:latest
  nginx:
    image: cytomine/nginx:latest
"#;

    const IMS_COMPOSE: &str = "services:\n  ims:\n    image: cytomine/ims:latest\n";

    fn setup_source(root: &Path) {
        fs::write(root.join("cytomine.yml"), CONFIG).unwrap();
        fs::write(root.join("docker-compose.yml"), DEFAULT_COMPOSE).unwrap();
        fs::create_dir_all(root.join("ims-server")).unwrap();
        fs::write(root.join("ims-server/docker-compose.yml"), IMS_COMPOSE).unwrap();
    }

    fn read_env(path: &Path) -> BTreeMap<String, String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_deploy_in_place() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());

        let deployer = Deployer::new(DeployOptions::new(temp.path()));
        let report = deployer.deploy().unwrap();

        assert!(!report.dry_run);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("nginx"));

        let core = read_env(&temp.path().join("envs/core.env"));
        assert_eq!(core["SERVER_PORT"], "8080");
        assert_eq!(core["JAVAMELODY_USER"], "admin");
        assert_eq!(core["JAVAMELODY_PASSWORD"].len(), 36);

        let postgis = read_env(&temp.path().join("envs/postgis.env"));
        assert_eq!(postgis["POSTGRES_PASSWORD"].len(), 32);

        let ims = read_env(&temp.path().join("ims-server/envs/ims.env"));
        assert_eq!(ims["IMS_STORAGE_PATH"], "/data/images");

        let overrides =
            fs::read_to_string(temp.path().join("docker-compose.override.yml")).unwrap();
        let overrides: EditableCompose = serde_yaml::from_str(&overrides).unwrap();
        assert_eq!(overrides.services().collect::<Vec<_>>(), vec!["core", "postgis"]);
        assert_eq!(
            overrides.service("core").unwrap().env_file.as_deref(),
            Some("envs/core.env")
        );

        assert!(temp.path().join(DEPLOYED_CONFIG_FILENAME).is_file());
        assert!(temp
            .path()
            .join("ims-server/docker-compose.override.yml")
            .is_file());
    }

    #[test]
    fn test_redeploy_keeps_generated_values() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());

        Deployer::new(DeployOptions::new(temp.path()))
            .deploy()
            .unwrap();
        let first = read_env(&temp.path().join("envs/core.env"));

        let report = Deployer::new(DeployOptions::new(temp.path()))
            .deploy()
            .unwrap();
        let second = read_env(&temp.path().join("envs/core.env"));
        assert_eq!(report.kept_generated, 2);
        assert_eq!(first, second);

        Deployer::new(DeployOptions::new(temp.path()).regenerate(true))
            .deploy()
            .unwrap();
        let third = read_env(&temp.path().join("envs/core.env"));
        assert_ne!(first["JAVAMELODY_PASSWORD"], third["JAVAMELODY_PASSWORD"]);
        assert_eq!(first["SERVER_PORT"], third["SERVER_PORT"]);
    }

    #[test]
    fn test_deploy_to_target_copies_sources() {
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        setup_source(source.path());
        fs::create_dir_all(source.path().join("configs/core/nested")).unwrap();
        fs::write(source.path().join("configs/core/core.yml"), "a: 1\n").unwrap();
        fs::write(source.path().join("configs/core/nested/x.conf"), "x\n").unwrap();

        let options = DeployOptions::new(source.path()).target(target.path());
        let report = Deployer::new(options).deploy().unwrap();

        assert!(target.path().join("docker-compose.yml").is_file());
        assert!(target.path().join("ims-server/docker-compose.yml").is_file());
        assert!(target.path().join("configs/core/core.yml").is_file());
        assert!(target.path().join("configs/core/nested/x.conf").is_file());
        assert!(report
            .files
            .contains(&target.path().join("configs/core/nested/x.conf")));
        assert!(!source.path().join("envs").exists());

        let overrides =
            fs::read_to_string(target.path().join("docker-compose.override.yml")).unwrap();
        let overrides: EditableCompose = serde_yaml::from_str(&overrides).unwrap();
        assert_eq!(
            overrides.service_volumes("core").unwrap(),
            [format!("./configs/core:{}:ro", CONFIGS_MOUNT)]
        );
        assert!(overrides.service_volumes("postgis").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_service_in_compose() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        fs::write(
            temp.path().join("docker-compose.yml"),
            "services:\n  core:\n    image: cytomine/core\n",
        )
        .unwrap();

        let result = Deployer::new(DeployOptions::new(temp.path())).check();
        assert!(
            matches!(result, Err(CtmnError::UnknownService { service, .. }) if service == "postgis")
        );
    }

    #[test]
    fn test_missing_server_compose() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        fs::remove_file(temp.path().join("ims-server/docker-compose.yml")).unwrap();

        let result = Deployer::new(DeployOptions::new(temp.path())).plan();
        assert!(matches!(result, Err(CtmnError::NoComposeFile(_))));
    }

    #[test]
    fn test_missing_config() {
        let temp = tempdir().unwrap();
        let result = Deployer::new(DeployOptions::new(temp.path())).plan();
        assert!(matches!(result, Err(CtmnError::MissingConfigFile(_))));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        setup_source(source.path());

        let options = DeployOptions::new(source.path())
            .target(target.path())
            .dry_run(true);
        let report = Deployer::new(options).deploy().unwrap();

        assert!(report.dry_run);
        assert!(report.files.contains(&target.path().join("envs/core.env")));
        assert_eq!(fs::read_dir(target.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_overlay_changes_env() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        let overlay = temp.path().join("cytomine.local.yml");
        fs::write(
            &overlay,
            "services:\n  default:\n    core:\n      constant:\n        SERVER_PORT: 9090\n",
        )
        .unwrap();

        let options = DeployOptions::new(temp.path()).overlay(&overlay);
        Deployer::new(options).deploy().unwrap();

        let core = read_env(&temp.path().join("envs/core.env"));
        assert_eq!(core["SERVER_PORT"], "9090");
        assert_eq!(core["JAVAMELODY_USER"], "admin");
    }

    #[test]
    fn test_overlay_references_base_globals() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        let overlay = temp.path().join("cytomine.local.yml");
        fs::write(
            &overlay,
            "services:\n  ims-server:\n    ims:\n      global:\n        MELODY_USER: global.javamelody.JAVAMELODY_USER\n",
        )
        .unwrap();

        let plan = Deployer::new(DeployOptions::new(temp.path()).overlay(&overlay))
            .plan()
            .unwrap();
        assert_eq!(plan.servers.len(), 2);

        Deployer::new(DeployOptions::new(temp.path()).overlay(&overlay))
            .deploy()
            .unwrap();
        let ims = read_env(&temp.path().join("ims-server/envs/ims.env"));
        assert_eq!(ims["MELODY_USER"], "admin");
        assert_eq!(ims["IMS_STORAGE_PATH"], "/data/images");
    }

    #[test]
    fn test_redeploy_regenerates_when_generator_changes() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        Deployer::new(DeployOptions::new(temp.path()))
            .deploy()
            .unwrap();
        let first_postgis = read_env(&temp.path().join("envs/postgis.env"));
        let first_core = read_env(&temp.path().join("envs/core.env"));

        let changed = CONFIG
            .replace("openssl rand -hex 16", "openssl rand -hex 32")
            .replace(
                "      constant:\n        IMS_STORAGE_PATH: /data/images",
                "      auto:\n        IMS_STORAGE_PATH: random_uuid",
            );
        assert_ne!(changed, CONFIG);
        fs::write(temp.path().join("cytomine.yml"), changed).unwrap();

        let report = Deployer::new(DeployOptions::new(temp.path()))
            .deploy()
            .unwrap();
        assert_eq!(report.kept_generated, 1);

        let postgis = read_env(&temp.path().join("envs/postgis.env"));
        assert_eq!(postgis["POSTGRES_PASSWORD"].len(), 64);
        assert!(!postgis["POSTGRES_PASSWORD"].starts_with(&first_postgis["POSTGRES_PASSWORD"]));

        let ims = read_env(&temp.path().join("ims-server/envs/ims.env"));
        assert_ne!(ims["IMS_STORAGE_PATH"], "/data/images");
        assert!(uuid::Uuid::parse_str(&ims["IMS_STORAGE_PATH"]).is_ok());

        let core = read_env(&temp.path().join("envs/core.env"));
        assert_eq!(core["JAVAMELODY_PASSWORD"], first_core["JAVAMELODY_PASSWORD"]);
    }

    #[test]
    fn test_lock_file_records_generators() {
        let temp = tempdir().unwrap();
        setup_source(temp.path());
        Deployer::new(DeployOptions::new(temp.path()))
            .deploy()
            .unwrap();

        let lock = fs::read_to_string(temp.path().join(DEPLOYED_CONFIG_FILENAME)).unwrap();
        let lock: serde_yaml::Value = serde_yaml::from_str(&lock).unwrap();
        let postgis = &lock["services"]["default"]["postgis"]["generated"]["POSTGRES_PASSWORD"];
        assert_eq!(postgis["generator"].as_str(), Some("openssl rand -hex 16"));
        assert_eq!(
            postgis["value"].as_str(),
            read_env(&temp.path().join("envs/postgis.env"))
                .get("POSTGRES_PASSWORD")
                .map(String::as_str)
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("cytomine.yml")).unwrap(),
            CONFIG
        );
    }

    #[test]
    fn test_server_dir() {
        let root = Path::new("/srv/cytomine");
        assert_eq!(server_dir(root, DEFAULT_SERVER), root);
        assert_eq!(server_dir(root, "ims-server"), root.join("ims-server"));
    }
}
