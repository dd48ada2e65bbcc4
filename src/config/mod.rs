//! Deployment descriptor parsing and merging

pub mod file;

pub use file::{
    find_config_file, ConfigExport, ConfigFile, ConfigSection, CONFIG_FILENAME, DEFAULT_SERVER,
};
