//! Snapshot store port (driven/secondary port)
//!
//! Persists the namespace tree so that a restart does not need a full usage
//! scan before folder selection works again. Snapshots are keyed by the
//! authenticated identity (the account e-mail).

use crate::domain::tree::NamespaceTree;

#[async_trait::async_trait]
pub trait ISnapshotStore: Send + Sync {
    /// Load the last saved tree for `identity`, `None` if nothing was saved
    async fn load(&self, identity: &str) -> anyhow::Result<Option<NamespaceTree>>;

    /// Replace the saved tree for `identity`
    async fn save(&self, identity: &str, tree: &NamespaceTree) -> anyhow::Result<()>;
}
