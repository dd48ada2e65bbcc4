//! Docker Compose files
//!
//! Compose files written by hand are only read (service names, version);
//! override files are generated.

pub mod editable;
pub mod parser;

pub use editable::{EditableCompose, ServiceOverride, DEFAULT_COMPOSE_VERSION};
pub use parser::{find_compose_file, ComposeFile, COMPOSE_FILENAME};
