//! Namespace tree
//!
//! In-memory cache of the remote folders discovered by the usage scan. Nodes
//! live in an id-keyed map; each entry records its parent and the ids of its
//! children, so lookup is O(1) and path reconstruction is O(depth).
//!
//! The synthetic root is always present and is never removed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RemoteId;
use super::node::RemoteNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TreeEntry {
    node: RemoteNode,
    children: Vec<RemoteId>,
}

/// Rooted collection of remote nodes keyed by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTree {
    entries: HashMap<RemoteId, TreeEntry>,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTree {
    /// An empty tree holding only the synthetic root
    #[must_use]
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            RemoteId::root(),
            TreeEntry {
                node: RemoteNode::root(),
                children: Vec::new(),
            },
        );
        Self { entries }
    }

    /// Attach `node` under `parent_id`.
    ///
    /// Returns `Ok(false)` without touching the tree when a node with the same
    /// id is already present, `Ok(true)` when the node was attached.
    ///
    /// # Errors
    /// [`DomainError::ParentMissing`] if `parent_id` is not in the tree.
    pub fn insert(&mut self, parent_id: &RemoteId, mut node: RemoteNode) -> Result<bool, DomainError> {
        if self.entries.contains_key(&node.id) {
            return Ok(false);
        }

        let parent = self
            .entries
            .get_mut(parent_id)
            .ok_or_else(|| DomainError::ParentMissing {
                parent: parent_id.to_string(),
                child: node.id.to_string(),
            })?;
        parent.children.push(node.id.clone());

        node.parent_id = Some(parent_id.clone());
        self.entries.insert(
            node.id.clone(),
            TreeEntry {
                node,
                children: Vec::new(),
            },
        );
        Ok(true)
    }

    /// Detach `id` from its parent and drop it together with its subtree.
    ///
    /// Returns the removed node, `None` if absent or if `id` is the root.
    pub fn remove(&mut self, id: &RemoteId) -> Option<RemoteNode> {
        if id.is_root() {
            return None;
        }
        let entry = self.entries.remove(id)?;

        if let Some(parent_id) = &entry.node.parent_id {
            if let Some(parent) = self.entries.get_mut(parent_id) {
                if let Some(pos) = parent.children.iter().position(|c| c == id) {
                    parent.children.remove(pos);
                }
            }
        }

        let mut pending = entry.children.clone();
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.entries.remove(&child) {
                pending.extend(removed.children);
            }
        }

        Some(entry.node)
    }

    #[must_use]
    pub fn contains(&self, id: &RemoteId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &RemoteId) -> Option<&RemoteNode> {
        self.entries.get(id).map(|e| &e.node)
    }

    /// Ids of the direct children of `id`
    #[must_use]
    pub fn children(&self, id: &RemoteId) -> &[RemoteId] {
        self.entries
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    /// `/`-joined names of the ancestors of `id` from the root down, the
    /// root's own name excluded. The root resolves to the empty string.
    #[must_use]
    pub fn resolve_path(&self, id: &RemoteId) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = self.entries.get(id)?;
        while let Some(parent_id) = &cursor.node.parent_id {
            names.push(cursor.node.name.as_str());
            cursor = self.entries.get(parent_id)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Number of nodes excluding the root
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth-first pre-order iteration over every node below the root
    pub fn iter(&self) -> impl Iterator<Item = &RemoteNode> + '_ {
        let root = RemoteId::root();
        let mut stack: Vec<&RemoteId> = self
            .entries
            .get(&root)
            .map(|e| e.children.iter().rev().collect())
            .unwrap_or_default();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let entry = self.entries.get(id)?;
            stack.extend(entry.children.iter().rev());
            Some(&entry.node)
        })
    }
}
