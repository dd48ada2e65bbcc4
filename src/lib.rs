//! ctmn - Cytomine deployment configuration generator
//!
//! ctmn reads a Cytomine deployment descriptor (`cytomine.yml`) and the
//! docker-compose files of the servers it describes, and generates:
//!
//! - Per-service env files with constant, generated and shared values
//! - docker-compose override files wiring services to their env files
//! - A lock file (`cytomine.lock.yml`) pinning generated secrets and their
//!   generators across deployments

pub mod compose;
pub mod config;
pub mod deploy;
pub mod env;
pub mod error;

pub use error::{CtmnError, Result};
