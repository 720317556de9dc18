//! Reconciliation
//!
//! Pure set algebra over the two parties' inventories. Every action set is
//! derived from the client's report and the current vault scan; no state is
//! carried between sync rounds.

use std::collections::BTreeSet;

use serde::Serialize;

use super::detect::ServerInventory;
use super::path::VaultPath;

/// What the client reported for this round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInventory {
    /// Every path the client currently holds
    pub all_paths: BTreeSet<VaultPath>,
    /// Paths uploaded (created or modified) in this round
    pub uploaded_paths: BTreeSet<VaultPath>,
    /// Paths the client removed since its last sync
    pub deleted_paths: BTreeSet<VaultPath>,
}

/// The action sets for one sync round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Modified on both sides within the window
    pub conflict_paths: BTreeSet<VaultPath>,
    /// Files the client must pull
    pub paths_to_add_to_client: BTreeSet<VaultPath>,
    /// Files the client must delete locally
    pub paths_to_delete_from_client: BTreeSet<VaultPath>,
    /// Staged files to promote into the vault
    pub paths_to_add_to_server: BTreeSet<VaultPath>,
    /// Client tombstones to apply to the vault
    pub paths_to_delete_from_server: BTreeSet<VaultPath>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.conflict_paths.is_empty()
            && self.paths_to_add_to_client.is_empty()
            && self.paths_to_delete_from_client.is_empty()
            && self.paths_to_add_to_server.is_empty()
            && self.paths_to_delete_from_server.is_empty()
    }
}

/// Compute the action sets for a round.
///
/// Client tombstones are removed from the server inventory first, so a file
/// the client deleted is neither sent back nor counted as server-modified.
pub fn reconcile(client: &ClientInventory, server: &ServerInventory) -> SyncPlan {
    let all_server: BTreeSet<VaultPath> = server
        .all_paths
        .difference(&client.deleted_paths)
        .cloned()
        .collect();
    let modified_server: BTreeSet<VaultPath> = server
        .modified_paths
        .difference(&client.deleted_paths)
        .cloned()
        .collect();

    let conflict_paths: BTreeSet<VaultPath> = modified_server
        .intersection(&client.uploaded_paths)
        .cloned()
        .collect();

    let paths_to_add_to_client: BTreeSet<VaultPath> = all_server
        .difference(&client.all_paths)
        .chain(modified_server.iter())
        .cloned()
        .collect();

    let paths_to_delete_from_client: BTreeSet<VaultPath> = client
        .all_paths
        .iter()
        .filter(|path| !all_server.contains(*path) && !client.uploaded_paths.contains(*path))
        .cloned()
        .collect();

    let paths_to_add_to_server: BTreeSet<VaultPath> = client
        .uploaded_paths
        .difference(&conflict_paths)
        .cloned()
        .collect();

    SyncPlan {
        conflict_paths,
        paths_to_add_to_client,
        paths_to_delete_from_client,
        paths_to_add_to_server,
        paths_to_delete_from_server: client.deleted_paths.clone(),
    }
}
