//! Upload staging
//!
//! Client uploads are written to the buffer, a quarantine tree that mirrors
//! the vault's relative-path namespace. Nothing here touches the live vault.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::path::VaultPath;
use super::types::{SyncError, UploadedFile};

/// Validated upload ready to be staged
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub path: VaultPath,
    pub content: Vec<u8>,
}

/// Validate uploads and collapse the "no uploads" placeholder.
///
/// A request whose only part is the zero-length `empty` placeholder stages
/// nothing. Any invalid path rejects the whole batch.
pub fn collect_uploads(files: Vec<UploadedFile>) -> Result<Vec<StagedUpload>, SyncError> {
    files
        .into_iter()
        .filter(|file| !file.is_sentinel())
        .map(|file| {
            Ok(StagedUpload {
                path: VaultPath::parse(&file.path)?,
                content: file.content,
            })
        })
        .collect()
}

/// Quarantine tree for incoming client files
#[derive(Debug, Clone)]
pub struct Buffer {
    root: PathBuf,
}

impl Buffer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a staged file
    pub fn path_of(&self, path: &VaultPath) -> PathBuf {
        path.under(&self.root)
    }

    /// Write one upload into the buffer, creating parent directories
    pub async fn stage(&self, upload: &StagedUpload) -> Result<(), SyncError> {
        let target = self.path_of(&upload.path);
        let staging_err = |source: std::io::Error| SyncError::Staging {
            path: upload.path.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(staging_err)?;
        }
        tokio::fs::write(&target, &upload.content)
            .await
            .map_err(staging_err)?;

        tracing::debug!(path = %upload.path, size = upload.content.len(), "Staged upload");
        Ok(())
    }

    /// Stage every upload in order; the first failure aborts the batch.
    ///
    /// Returns the set of staged paths. A path uploaded twice keeps the last
    /// content. On failure the files staged so far are discarded again.
    pub async fn stage_all(&self, uploads: &[StagedUpload]) -> Result<BTreeSet<VaultPath>, SyncError> {
        let mut staged = BTreeSet::new();
        for upload in uploads {
            if let Err(e) = self.stage(upload).await {
                self.discard_all(&staged).await;
                return Err(e);
            }
            staged.insert(upload.path.clone());
        }
        Ok(staged)
    }

    /// Best-effort removal of staged files after an aborted batch
    async fn discard_all(&self, paths: &BTreeSet<VaultPath>) {
        for path in paths {
            if let Err(e) = self.discard(path).await {
                tracing::warn!(path = %path, "Failed to discard staged upload: {}", e);
            }
        }
        tracing::debug!(count = paths.len(), "Discarded partially staged batch");
    }

    /// Remove a staged file if present. Returns whether a file was removed.
    pub async fn discard(&self, path: &VaultPath) -> Result<bool, SyncError> {
        let target = self.path_of(path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::vault_io(target.display(), e)),
        }
    }

    pub async fn contains(&self, path: &VaultPath) -> bool {
        tokio::fs::metadata(self.path_of(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}
