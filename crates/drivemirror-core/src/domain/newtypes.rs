//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for remote identifiers, drive-relative paths and
//! content checksums. Each newtype checks its invariants at construction.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemoteId
// ============================================================================

/// Identifier of an entry in the remote store
///
/// Drive ids are opaque URL-safe strings such as `0B7l5uajXUzaFa0x6cjJfZEkzZVE`.
/// The synthetic root of every drive is addressed as `root`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Alias the remote store accepts for the top of the drive
    pub const ROOT: &'static str = "root";

    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains characters outside
    /// `[A-Za-z0-9_-]`
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// The synthetic root id
    #[must_use]
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Whether this id addresses the synthetic root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// DrivePath
// ============================================================================

/// A path relative to the top of the drive, `/`-separated
///
/// The empty path denotes the drive root. `Docs/a.pdf` addresses the file
/// `a.pdf` inside the root-level folder `Docs`. Mirror-local paths are
/// translated into this form by stripping the mirror directory prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DrivePath(String);

impl DrivePath {
    /// Create a new DrivePath
    ///
    /// # Errors
    /// Returns error if the path is absolute, has a trailing slash, contains
    /// empty components or `.`/`..` components
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.is_empty() {
            return Ok(Self(path));
        }

        if path.starts_with('/') || path.ends_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Drive path must be relative without trailing slash: {path}"
            )));
        }

        for component in path.split('/') {
            Self::check_component(component)
                .map_err(|_| DomainError::InvalidPath(format!("Invalid component in: {path}")))?;
        }

        Ok(Self(path))
    }

    /// The drive root (empty path)
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Whether this is the drive root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a single component
    ///
    /// # Errors
    /// Returns error if `component` is empty, contains `/` or is a dot entry
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        Self::check_component(component)?;
        if self.0.is_empty() {
            Ok(Self(component.to_string()))
        } else {
            Ok(Self(format!("{}/{component}", self.0)))
        }
    }

    /// Parent path, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Final component, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.0.is_empty() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Iterate over the path components from the root down
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    fn check_component(component: &str) -> Result<(), DomainError> {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('/')
        {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {component:?}"
            )));
        }
        Ok(())
    }
}

impl Display for DrivePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for DrivePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DrivePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DrivePath> for String {
    fn from(path: DrivePath) -> Self {
        path.0
    }
}

// ============================================================================
// Md5Checksum
// ============================================================================

/// MD5 digest of file content, stored as 32 lowercase hex digits
///
/// The remote store reports `md5Checksum` for every file with binary content;
/// the mirror computes the same digest locally to decide whether a file is
/// already in sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Md5Checksum(String);

impl Md5Checksum {
    /// Create a new checksum from its hex representation
    ///
    /// # Errors
    /// Returns error if the input is not exactly 32 hex digits
    pub fn new(hex: String) -> Result<Self, DomainError> {
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidChecksum(format!(
                "expected 32 hex digits, got {hex:?}"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Build from a raw 16-byte digest
    #[must_use]
    pub fn from_digest(digest: [u8; 16]) -> Self {
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Md5Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Md5Checksum {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Md5Checksum {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Md5Checksum> for String {
    fn from(sum: Md5Checksum) -> Self {
        sum.0
    }
}
