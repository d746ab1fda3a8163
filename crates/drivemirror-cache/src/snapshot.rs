//! SQLite implementation of ISnapshotStore
//!
//! A snapshot is the full set of tree nodes for one identity, written in
//! depth-first pre-order so that loading can re-insert every node after its
//! parent. Saving replaces the previous snapshot inside one transaction; a
//! crash mid-save leaves the old snapshot intact.
//!
//! ## Type Mapping
//!
//! | Domain Type   | SQL Type | Strategy                                   |
//! |---------------|----------|--------------------------------------------|
//! | RemoteId      | TEXT     | `.as_str()` / `RemoteId::new()`            |
//! | Md5Checksum   | TEXT     | `.as_str()` / `Md5Checksum::new()`, NULL if absent |
//! | size (u64)    | INTEGER  | stored as i64                              |
//! | saved_at      | TEXT     | RFC 3339 via chrono                        |

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemirror_core::domain::{Md5Checksum, NamespaceTree, RemoteId, RemoteNode};
use drivemirror_core::ports::ISnapshotStore;

use crate::CacheError;

/// SQLite-backed snapshot store
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// When the snapshot for `identity` was last written, RFC 3339
    pub async fn saved_at(&self, identity: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT saved_at FROM snapshot_meta WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("saved_at"))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn load_tree(&self, identity: &str) -> Result<Option<NamespaceTree>, CacheError> {
        let meta = sqlx::query("SELECT node_count FROM snapshot_meta WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        if meta.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT id, parent_id, name, mime_type, md5_checksum, size
             FROM namespace_nodes WHERE identity = ? ORDER BY position",
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        let mut tree = NamespaceTree::new();
        for row in &rows {
            let (parent_id, node) = row_to_node(row)?;
            tree.insert(&parent_id, node)
                .map_err(|e| CacheError::CorruptSnapshot(e.to_string()))?;
        }
        Ok(Some(tree))
    }

    async fn save_tree(&self, identity: &str, tree: &NamespaceTree) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM namespace_nodes WHERE identity = ?")
            .bind(identity)
            .execute(&mut *tx)
            .await?;

        let mut count: i64 = 0;
        for (position, node) in tree.iter().enumerate() {
            let parent = node
                .parent_id
                .as_ref()
                .map(RemoteId::as_str)
                .unwrap_or(RemoteId::ROOT);
            sqlx::query(
                "INSERT INTO namespace_nodes
                 (identity, id, parent_id, name, mime_type, md5_checksum, size, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(identity)
            .bind(node.id.as_str())
            .bind(parent)
            .bind(&node.name)
            .bind(&node.mime_type)
            .bind(node.md5_checksum.as_ref().map(Md5Checksum::as_str))
            .bind(i64::try_from(node.size).unwrap_or(i64::MAX))
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        sqlx::query(
            "INSERT INTO snapshot_meta (identity, node_count, saved_at) VALUES (?, ?, ?)
             ON CONFLICT(identity) DO UPDATE SET
                node_count = excluded.node_count,
                saved_at = excluded.saved_at",
        )
        .bind(identity)
        .bind(count)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(identity, nodes = count, "Namespace snapshot saved");
        Ok(())
    }
}

fn row_to_node(row: &SqliteRow) -> Result<(RemoteId, RemoteNode), CacheError> {
    let corrupt = |e: drivemirror_core::domain::DomainError| CacheError::CorruptSnapshot(e.to_string());

    let id = RemoteId::new(row.try_get("id")?).map_err(corrupt)?;
    let parent_id = RemoteId::new(row.try_get("parent_id")?).map_err(corrupt)?;
    let md5_checksum = row
        .try_get::<Option<String>, _>("md5_checksum")?
        .map(Md5Checksum::new)
        .transpose()
        .map_err(corrupt)?;
    let size: i64 = row.try_get("size")?;

    let node = RemoteNode {
        id,
        name: row.try_get("name")?,
        parent_id: Some(parent_id.clone()),
        mime_type: row.try_get("mime_type")?,
        md5_checksum,
        size: u64::try_from(size).unwrap_or(0),
    };
    Ok((parent_id, node))
}

#[async_trait::async_trait]
impl ISnapshotStore for SqliteSnapshotStore {
    #[tracing::instrument(skip(self))]
    async fn load(&self, identity: &str) -> anyhow::Result<Option<NamespaceTree>> {
        Ok(self.load_tree(identity).await?)
    }

    #[tracing::instrument(skip(self, tree), fields(nodes = tree.len()))]
    async fn save(&self, identity: &str, tree: &NamespaceTree) -> anyhow::Result<()> {
        Ok(self.save_tree(identity, tree).await?)
    }
}
