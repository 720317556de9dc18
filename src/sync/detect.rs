//! Change detection
//!
//! Walks the vault and classifies every recognized file as modified or
//! unmodified relative to the current [`SyncWindow`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::path::VaultPath;
use super::types::{unix_seconds, SyncError, SyncWindow};

/// Server-side view of the vault for one sync window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInventory {
    /// Every recognized file in the vault
    pub all_paths: BTreeSet<VaultPath>,
    /// Recognized files whose mtime lies strictly inside the window
    pub modified_paths: BTreeSet<VaultPath>,
}

/// Scan the vault on a blocking thread
pub async fn detect_changes(
    root: PathBuf,
    window: SyncWindow,
    suffixes: Vec<String>,
) -> Result<ServerInventory, SyncError> {
    tokio::task::spawn_blocking(move || scan_vault(&root, &window, &suffixes)).await?
}

/// Walk `root` and build the inventory.
///
/// Entries below the root that cannot be read (vanished mid-walk, permission
/// errors) are skipped. A root that is missing, not a directory, or unreadable
/// fails the scan, since it would otherwise read as an empty vault.
pub fn scan_vault(
    root: &Path,
    window: &SyncWindow,
    suffixes: &[String],
) -> Result<ServerInventory, SyncError> {
    let metadata = std::fs::metadata(root).map_err(|e| SyncError::vault_io(root.display(), e))?;
    if !metadata.is_dir() {
        return Err(SyncError::vault_io(
            root.display(),
            std::io::Error::new(std::io::ErrorKind::Other, "vault root is not a directory"),
        ));
    }

    let mut inventory = ServerInventory::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 || e.path() == Some(root) => {
                return Err(SyncError::vault_io(root.display(), std::io::Error::from(e)));
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable vault entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(path) = VaultPath::from_absolute(root, entry.path()) else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-UTF-8 vault path");
            continue;
        };

        if !path.has_suffix(suffixes) {
            continue;
        }

        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified())
        {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::debug!(path = %path, "Skipping file without readable mtime: {}", e);
                continue;
            }
        };

        if window.contains(unix_seconds(modified)) {
            inventory.modified_paths.insert(path.clone());
        }
        inventory.all_paths.insert(path);
    }

    tracing::debug!(
        total = inventory.all_paths.len(),
        modified = inventory.modified_paths.len(),
        "Vault scan complete"
    );

    Ok(inventory)
}
