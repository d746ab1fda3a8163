//! Sync selection
//!
//! The ordered set of remote subtrees the user chose to mirror. On disk it is
//! a list of `[path, id]` pairs; the pair `["root", ""]` means the whole drive.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{DrivePath, RemoteId};

/// Path marker used for the whole-drive entry
const ROOT_MARKER: &str = "root";

/// One selected subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub enum SelectionEntry {
    /// Mirror everything from the remote root
    Root,
    /// Mirror the folder `id` found at `path`
    Folder { path: DrivePath, id: RemoteId },
}

impl TryFrom<(String, String)> for SelectionEntry {
    type Error = DomainError;

    fn try_from((path, id): (String, String)) -> Result<Self, Self::Error> {
        if path == ROOT_MARKER && id.is_empty() {
            return Ok(Self::Root);
        }
        Ok(Self::Folder {
            path: DrivePath::new(path)?,
            id: RemoteId::new(id)?,
        })
    }
}

impl From<SelectionEntry> for (String, String) {
    fn from(entry: SelectionEntry) -> Self {
        match entry {
            SelectionEntry::Root => (ROOT_MARKER.to_string(), String::new()),
            SelectionEntry::Folder { path, id } => (path.into(), id.into()),
        }
    }
}

/// Ordered, deduplicated list of selected subtrees
///
/// Never empty once normalized: an empty list is read as the whole drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SelectionEntry>", into = "Vec<SelectionEntry>")]
pub struct SyncSelection {
    entries: Vec<SelectionEntry>,
}

impl Default for SyncSelection {
    fn default() -> Self {
        Self::root()
    }
}

impl SyncSelection {
    /// Selection covering the whole drive
    #[must_use]
    pub fn root() -> Self {
        Self {
            entries: vec![SelectionEntry::Root],
        }
    }

    /// Replace everything with the whole-drive entry
    pub fn select_root(&mut self) {
        self.entries.clear();
        self.entries.push(SelectionEntry::Root);
    }

    /// Add a folder, dropping the whole-drive entry if present.
    ///
    /// Returns `false` if the same `(path, id)` pair was already selected.
    pub fn select_folder(&mut self, path: DrivePath, id: RemoteId) -> bool {
        self.entries.retain(|e| *e != SelectionEntry::Root);
        let entry = SelectionEntry::Folder { path, id };
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    #[must_use]
    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    /// Whether the whole drive is selected
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.entries.contains(&SelectionEntry::Root)
    }
}

impl From<Vec<SelectionEntry>> for SyncSelection {
    fn from(raw: Vec<SelectionEntry>) -> Self {
        let mut selection = Self { entries: Vec::new() };
        for entry in raw {
            match entry {
                SelectionEntry::Root => {
                    selection.select_root();
                }
                SelectionEntry::Folder { path, id } => {
                    if !selection.is_root() {
                        selection.select_folder(path, id);
                    }
                }
            }
        }
        if selection.entries.is_empty() {
            selection.select_root();
        }
        selection
    }
}

impl From<SyncSelection> for Vec<SelectionEntry> {
    fn from(selection: SyncSelection) -> Self {
        selection.entries
    }
}
