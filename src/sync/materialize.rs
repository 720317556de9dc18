//! Materialization
//!
//! Applies a [`SyncPlan`](super::SyncPlan) to the vault: server-side deletes,
//! conflict resolution, then promotion of staged files. Packaging lives in
//! [`archive`](super::archive).

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::BinaryConflictPolicy;

use super::merge::MergeTool;
use super::path::VaultPath;
use super::staging::Buffer;
use super::types::SyncError;

/// Outcome of conflict resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Text conflicts merged into the vault
    pub merged: Vec<VaultPath>,
    /// Binary conflicts settled in favor of the vault copy
    pub kept_server: Vec<VaultPath>,
    /// Conflicts left for the user; the client copy stays in the buffer
    pub unresolved: Vec<VaultPath>,
}

/// The live vault tree
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, path: &VaultPath) -> PathBuf {
        path.under(&self.root)
    }

    /// Delete the given paths. Missing files are skipped.
    ///
    /// Returns the paths that were actually removed.
    pub async fn remove_all<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a VaultPath>,
    ) -> Result<Vec<VaultPath>, SyncError> {
        let mut removed = Vec::new();

        for path in paths {
            let target = self.path_of(path);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {
                    tracing::debug!(path = %path, "Deleted from vault");
                    self.prune_empty_parents(&target).await;
                    removed.push(path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path, "Delete skipped, not in vault");
                }
                Err(e) => return Err(SyncError::vault_io(path, e)),
            }
        }

        Ok(removed)
    }

    /// Remove directories left empty by a delete, stopping at the vault root
    async fn prune_empty_parents(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    /// Settle every conflicted path.
    ///
    /// Text files are merged against an empty ancestor and the result replaces
    /// the vault copy. A merge tool failure leaves the vault copy untouched and
    /// reports the path as unresolved. Binary files follow `binary_policy`.
    pub async fn resolve_conflicts<'a>(
        &self,
        buffer: &Buffer,
        conflicts: impl IntoIterator<Item = &'a VaultPath>,
        text_suffixes: &[String],
        binary_policy: BinaryConflictPolicy,
        merge_tool: &dyn MergeTool,
    ) -> Result<ConflictReport, SyncError> {
        let mut report = ConflictReport::default();
        let mut ancestor: Option<NamedTempFile> = None;

        for path in conflicts {
            if !path.has_suffix(text_suffixes) {
                match binary_policy {
                    BinaryConflictPolicy::ServerWins => {
                        buffer.discard(path).await?;
                        tracing::info!(path = %path, "Binary conflict kept server copy");
                        report.kept_server.push(path.clone());
                    }
                    BinaryConflictPolicy::Flag => {
                        tracing::warn!(path = %path, "Binary conflict flagged for user");
                        report.unresolved.push(path.clone());
                    }
                }
                continue;
            }

            let ancestor_path = match &ancestor {
                Some(file) => file.path().to_path_buf(),
                None => {
                    let file = NamedTempFile::new().map_err(|e| SyncError::vault_io("merge ancestor", e))?;
                    let path = file.path().to_path_buf();
                    ancestor = Some(file);
                    path
                }
            };

            let current = self.path_of(path);
            let incoming = buffer.path_of(path);

            match merge_tool.merge(&current, &ancestor_path, &incoming).await {
                Ok(output) => {
                    write_atomic(current, output.content).await?;
                    buffer.discard(path).await?;
                    tracing::info!(path = %path, conflicts = output.conflicts, "Merged conflicting edits");
                    report.merged.push(path.clone());
                }
                Err(e) => {
                    let error = SyncError::MergeTool {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}; vault copy left untouched", error);
                    report.unresolved.push(path.clone());
                }
            }
        }

        Ok(report)
    }

    /// Move a staged file into the vault at the same relative path
    pub async fn promote(&self, buffer: &Buffer, path: &VaultPath) -> Result<(), SyncError> {
        let source = buffer.path_of(path);
        let target = self.path_of(path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::vault_io(path, e))?;
        }

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::vault_io(path, e));
            }
            Err(e) => {
                // Rename fails across filesystems; copy through a temp file instead
                tracing::debug!(path = %path, "Rename failed ({}), copying", e);
                let content = tokio::fs::read(&source)
                    .await
                    .map_err(|e| SyncError::vault_io(path, e))?;
                write_atomic(target, content).await?;
                tokio::fs::remove_file(&source)
                    .await
                    .map_err(|e| SyncError::vault_io(path, e))?;
            }
        }

        tracing::debug!(path = %path, "Promoted into vault");
        Ok(())
    }

    pub async fn promote_all<'a>(
        &self,
        buffer: &Buffer,
        paths: impl IntoIterator<Item = &'a VaultPath>,
    ) -> Result<usize, SyncError> {
        let mut count = 0;
        for path in paths {
            self.promote(buffer, path).await?;
            count += 1;
        }
        Ok(count)
    }
}

/// Replace `target` with `content` via a temp file in the same directory
pub async fn write_atomic(target: PathBuf, content: Vec<u8>) -> Result<(), SyncError> {
    tokio::task::spawn_blocking(move || -> Result<(), SyncError> {
        let io_err = |e: std::io::Error| SyncError::vault_io(target.display(), e);
        let parent = target.parent().unwrap_or_else(|| Path::new("."));

        std::fs::create_dir_all(parent).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(&content).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|e| io_err(e.error))?;
        Ok(())
    })
    .await?
}
