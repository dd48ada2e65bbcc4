//! Deployment generation
//!
//! Turns a deployment descriptor and the compose files of its servers into
//! env files and compose overrides.

pub mod deployer;
pub mod options;
pub mod plan;

pub use deployer::{server_dir, Deployer};
pub use options::DeployOptions;
pub use plan::{DeploymentPlan, DeploymentReport, ServerPlan, DEPLOYED_CONFIG_FILENAME};
