//! DriveMirror Core - Domain model and port definitions
//!
//! This crate holds everything the sync engine reasons about without
//! touching the network:
//! - **Domain types** - `RemoteId`, `DrivePath`, `RemoteNode`, `NamespaceTree`,
//!   `SyncSelection`, `UsageCounters`
//! - **Port definitions** - `IRemoteStore`, `ISnapshotStore`, status events
//! - **Configuration** - the YAML application config and the per-identity
//!   account store
//!
//! # Architecture
//!
//! Ports are traits implemented by adapter crates (`drivemirror-drive`,
//! `drivemirror-cache`). The sync crate only depends on the traits.

pub mod accounts;
pub mod config;
pub mod domain;
pub mod ports;
