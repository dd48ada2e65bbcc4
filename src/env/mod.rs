//! Environment variables of a deployment
//!
//! Entries are grouped in namespaces and come in three flavours: constants,
//! values generated at load time, and references to the global section.

pub mod store;
pub mod value;

pub use store::{EnvEntry, EnvNamespace, EnvStore, ExportedValue, MergePolicy, RawNamespace};
pub use value::{EnvValueType, GeneratedValue, Generator, GlobalRef};
