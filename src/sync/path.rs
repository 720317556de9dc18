//! Vault-relative paths
//!
//! Every path that crosses the sync boundary, whether reported by the client
//! or found by walking the vault, is carried as a [`VaultPath`]: a validated,
//! `/`-separated path relative to the vault root.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Serializer};

use super::types::SyncError;

/// A validated path relative to the vault (or buffer) root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultPath(String);

impl VaultPath {
    /// Parse a client-supplied relative path.
    ///
    /// Rejects empty, absolute, and traversing paths. Surrounding whitespace
    /// is kept and backslashes are not treated as separators.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let invalid = |reason: &str| SyncError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        // Surrounding whitespace is part of the file name and is kept
        if raw.trim().is_empty() {
            return Err(invalid("path is empty"));
        }
        if raw.contains('\0') {
            return Err(invalid("path contains NUL"));
        }
        if raw.starts_with('/') {
            return Err(invalid("path must be relative"));
        }

        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" => continue,
                "." | ".." => return Err(invalid("path must not contain '.' or '..' segments")),
                other => parts.push(other),
            }
        }

        if parts.is_empty() {
            return Err(invalid("path has no file name"));
        }

        Ok(Self(parts.join("/")))
    }

    /// Compute the path of `abs` relative to `root`.
    ///
    /// Returns `None` when `abs` is not under `root` or is not valid UTF-8.
    pub fn from_absolute(root: &Path, abs: &Path) -> Option<Self> {
        let rel = abs.strip_prefix(root).ok()?;

        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                _ => return None,
            }
        }

        if parts.is_empty() {
            return None;
        }

        Some(Self(parts.join("/")))
    }

    /// Resolve this path under a root directory
    pub fn under(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path ends with any of the given suffixes (case-insensitive)
    pub fn has_suffix(&self, suffixes: &[String]) -> bool {
        let lower = self.0.to_ascii_lowercase();
        suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VaultPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
