//! Domain entities
//!
//! - Newtypes for remote identifiers, drive-relative paths and checksums
//! - The remote node record and the namespace tree that caches folders
//! - Sync selection and usage accounting

pub mod errors;
pub mod newtypes;
pub mod node;
pub mod selection;
pub mod tree;
pub mod usage;

pub use errors::DomainError;
pub use newtypes::*;
pub use node::{NodeKind, RemoteNode};
pub use selection::{SelectionEntry, SyncSelection};
pub use tree::NamespaceTree;
pub use usage::{ContentCategory, UsageCounters};
