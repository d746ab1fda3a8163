//! Per-identity sync state
//!
//! A JSON document shared by every account signed in on this machine:
//!
//! ```json
//! {
//!   "base_mirror_directory": "/home/me/Google Drive",
//!   "me@example.com": {
//!     "sync_selection": [["root", ""]],
//!     "mirror_directory": "/home/me/Google Drive/me@example.com",
//!     "drive_usage": { "audio_size": 0, "movies_size": 0, ... }
//!   }
//! }
//! ```
//!
//! The document is rewritten atomically after every selection change and
//! every successful usage scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::selection::SyncSelection;
use crate::domain::usage::UsageCounters;

/// Errors raised while reading or writing the accounts document
#[derive(Debug, Error)]
pub enum AccountsError {
    /// The document exists but cannot be read or parsed
    #[error("failed to load {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    #[error("failed to save {path}: {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no account configured for {0}")]
    UnknownIdentity(String),

    /// Several accounts are configured and none was named
    #[error("identity is ambiguous, configure one of: {0}")]
    AmbiguousIdentity(String),
}

/// Settings and persisted state of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub sync_selection: SyncSelection,
    pub mirror_directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_usage: Option<UsageCounters>,
}

/// The whole document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsDocument {
    pub base_mirror_directory: PathBuf,
    #[serde(flatten)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

/// File-backed accounts document
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    document: AccountsDocument,
}

impl AccountStore {
    /// Open the document at `path`, creating it with no accounts if absent.
    ///
    /// # Errors
    /// [`AccountsError::LoadFailed`] if the file exists but is unreadable or
    /// malformed.
    pub fn open(path: &Path, base_mirror_directory: &Path) -> Result<Self, AccountsError> {
        let load_failed = |reason: String| AccountsError::LoadFailed {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            let store = Self {
                path: path.to_path_buf(),
                document: AccountsDocument {
                    base_mirror_directory: base_mirror_directory.to_path_buf(),
                    accounts: BTreeMap::new(),
                },
            };
            store.save()?;
            return Ok(store);
        }

        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let document: AccountsDocument =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn document(&self) -> &AccountsDocument {
        &self.document
    }

    #[must_use]
    pub fn account(&self, identity: &str) -> Option<&AccountConfig> {
        self.document.accounts.get(identity)
    }

    /// Pick the identity to run as: `requested` if given, else the only
    /// configured account.
    pub fn resolve_identity(&self, requested: Option<&str>) -> Result<String, AccountsError> {
        if let Some(identity) = requested {
            return Ok(identity.to_string());
        }
        let mut names = self.document.accounts.keys();
        match (names.next(), names.next()) {
            (Some(only), None) => Ok(only.clone()),
            (None, _) => Err(AccountsError::UnknownIdentity("<none>".to_string())),
            _ => Err(AccountsError::AmbiguousIdentity(
                self.document
                    .accounts
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Return the account for `identity`, adding a whole-drive entry
    /// mirrored under the base directory if it is new.
    pub fn ensure_account(&mut self, identity: &str) -> Result<AccountConfig, AccountsError> {
        if let Some(existing) = self.document.accounts.get(identity) {
            return Ok(existing.clone());
        }
        let account = AccountConfig {
            sync_selection: SyncSelection::root(),
            mirror_directory: self.document.base_mirror_directory.join(identity),
            drive_usage: None,
        };
        self.document
            .accounts
            .insert(identity.to_string(), account.clone());
        self.save()?;
        Ok(account)
    }

    /// Persist a new selection for `identity`
    pub fn set_selection(
        &mut self,
        identity: &str,
        selection: SyncSelection,
    ) -> Result<(), AccountsError> {
        self.account_mut(identity)?.sync_selection = selection;
        self.save()
    }

    /// Persist usage counters for `identity`
    pub fn set_usage(&mut self, identity: &str, usage: UsageCounters) -> Result<(), AccountsError> {
        self.account_mut(identity)?.drive_usage = Some(usage);
        self.save()
    }

    fn account_mut(&mut self, identity: &str) -> Result<&mut AccountConfig, AccountsError> {
        self.document
            .accounts
            .get_mut(identity)
            .ok_or_else(|| AccountsError::UnknownIdentity(identity.to_string()))
    }

    /// Write the document through a temp file and rename it into place
    pub fn save(&self) -> Result<(), AccountsError> {
        let save_failed = |source: std::io::Error| AccountsError::SaveFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(save_failed)?;
        }
        let json = serde_json::to_string_pretty(&self.document)
            .map_err(|e| save_failed(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(save_failed)?;
        std::fs::rename(&tmp, &self.path).map_err(save_failed)?;
        Ok(())
    }
}
