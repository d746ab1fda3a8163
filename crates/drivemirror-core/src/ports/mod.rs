//! Port definitions (hexagonal architecture interfaces)
//!
//! Traits the sync engine depends on, implemented by adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - listing and mutating entries in the remote drive
//! - [`ISnapshotStore`] - persisting the namespace tree per identity
//! - [`StatusEvent`] - one-way status signals for a UI or log consumer

pub mod notification;
pub mod remote_store;
pub mod snapshot_store;

pub use notification::{Outcome, StatusEvent};
pub use remote_store::{IRemoteStore, NewRemoteItem, RemotePatch, RemoteRecord, StoreError};
pub use snapshot_store::ISnapshotStore;
