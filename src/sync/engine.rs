//! Sync engine
//!
//! Runs one sync round end to end: staging, change detection, reconciliation
//! and materialization. Rounds are serialized by a single lock because each
//! one reads and then rewrites the shared vault and buffer trees.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::config::{SyncConfig, UnrecognizedUploadPolicy, VaultConfig};

use super::archive;
use super::detect::detect_changes;
use super::materialize::Vault;
use super::merge::{GitMergeFile, MergeTool};
use super::path::VaultPath;
use super::reconcile::{reconcile, ClientInventory};
use super::staging::{collect_uploads, Buffer, StagedUpload};
use super::types::{SyncError, SyncManifest, SyncOutcome, SyncRequest, SyncWindow};

/// Validated request, ready to run under the lock
struct PreparedRequest {
    last_sync: f64,
    client: ClientInventory,
    uploads: Vec<StagedUpload>,
}

/// Timestamp-based sync between one client and the server vault
pub struct SyncEngine {
    vault: Vault,
    buffer: Buffer,
    settings: SyncConfig,
    merge_tool: Arc<dyn MergeTool>,
    lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        vault_root: impl Into<std::path::PathBuf>,
        buffer_root: impl Into<std::path::PathBuf>,
        settings: SyncConfig,
        merge_tool: Arc<dyn MergeTool>,
    ) -> Self {
        Self {
            vault: Vault::new(vault_root.into()),
            buffer: Buffer::new(buffer_root.into()),
            settings,
            merge_tool,
            lock: Mutex::new(()),
        }
    }

    /// Create the vault and buffer roots if needed and open an engine on
    /// their canonical locations, merging with `git merge-file`.
    pub async fn open(dirs: &VaultConfig, settings: SyncConfig) -> Result<Self, SyncError> {
        let vault_root = ensure_dir(&dirs.vault_path).await?;
        let buffer_root = ensure_dir(&dirs.buffer_path).await?;
        let merge_tool = Arc::new(GitMergeFile::new(settings.merge_tool.clone()));

        tracing::info!(vault = %vault_root.display(), buffer = %buffer_root.display(), "Sync engine ready");
        Ok(Self::new(vault_root, buffer_root, settings, merge_tool))
    }

    pub fn vault_root(&self) -> &Path {
        self.vault.root()
    }

    pub fn buffer_root(&self) -> &Path {
        self.buffer.root()
    }

    pub fn settings(&self) -> &SyncConfig {
        &self.settings
    }

    /// Run one sync round, closing the window at the moment the lock is taken
    pub async fn sync(self: Arc<Self>, request: SyncRequest) -> Result<SyncOutcome, SyncError> {
        let prepared = self.prepare(request)?;
        self.spawn_round(prepared, None).await
    }

    /// Run one sync round with an explicit window end
    pub async fn sync_until(self: Arc<Self>, request: SyncRequest, started_at: f64) -> Result<SyncOutcome, SyncError> {
        let prepared = self.prepare(request)?;
        self.spawn_round(prepared, Some(started_at)).await
    }

    /// Locked part of a round. It runs on its own task so that dropping the
    /// caller (a disconnected client) never stops a round halfway through
    /// rewriting the vault.
    async fn spawn_round(
        self: Arc<Self>,
        prepared: PreparedRequest,
        started_at: Option<f64>,
    ) -> Result<SyncOutcome, SyncError> {
        tokio::spawn(async move {
            let _guard = self.acquire().await?;

            // Captured before any vault mutation of this round
            let window = match started_at {
                Some(end) => SyncWindow::new(prepared.last_sync, end),
                None => SyncWindow::starting_now(prepared.last_sync),
            };
            self.run(prepared, window).await
        })
        .await?
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, SyncError> {
        match self.settings.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, self.lock.lock())
                .await
                .map_err(|_| SyncError::Busy),
            None => Ok(self.lock.lock().await),
        }
    }

    fn prepare(&self, request: SyncRequest) -> Result<PreparedRequest, SyncError> {
        if !request.last_sync_timestamp.is_finite() {
            return Err(SyncError::InvalidRequest(format!(
                "last_sync_timestamp must be a finite number, got {}",
                request.last_sync_timestamp
            )));
        }

        let recognized = &self.settings.recognized_suffixes;

        // Unrecognized client files are as invisible as unrecognized vault files
        let mut all_paths = BTreeSet::new();
        for raw in &request.all_client_paths {
            let path = VaultPath::parse(raw)?;
            if path.has_suffix(recognized) {
                all_paths.insert(path);
            }
        }

        let deleted_paths = request
            .deleted_client_paths
            .iter()
            .map(|raw| VaultPath::parse(raw))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(PreparedRequest {
            last_sync: request.last_sync_timestamp,
            client: ClientInventory {
                all_paths,
                uploaded_paths: BTreeSet::new(),
                deleted_paths,
            },
            uploads: collect_uploads(request.uploaded_files)?,
        })
    }

    async fn run(&self, prepared: PreparedRequest, window: SyncWindow) -> Result<SyncOutcome, SyncError> {
        let PreparedRequest {
            mut client,
            uploads,
            ..
        } = prepared;
        let settings = &self.settings;

        // Staging
        let staged_paths = self.buffer.stage_all(&uploads).await?;

        let mut rejected_uploads = Vec::new();
        for path in &staged_paths {
            if path.has_suffix(&settings.recognized_suffixes) {
                client.uploaded_paths.insert(path.clone());
                continue;
            }
            match settings.unrecognized_uploads {
                UnrecognizedUploadPolicy::Accept => {
                    client.uploaded_paths.insert(path.clone());
                }
                UnrecognizedUploadPolicy::Reject => {
                    self.buffer.discard(path).await?;
                    tracing::info!(path = %path, "Rejected upload with unrecognized suffix");
                    rejected_uploads.push(path.clone());
                }
            }
        }

        // Change detection
        let inventory = detect_changes(
            self.vault.root().to_path_buf(),
            window,
            settings.recognized_suffixes.clone(),
        )
        .await?;

        // Reconciliation
        let plan = reconcile(&client, &inventory);

        tracing::info!(
            uploaded = client.uploaded_paths.len(),
            client_deleted = client.deleted_paths.len(),
            server_total = inventory.all_paths.len(),
            server_modified = inventory.modified_paths.len(),
            conflicts = plan.conflict_paths.len(),
            to_client = plan.paths_to_add_to_client.len(),
            delete_on_client = plan.paths_to_delete_from_client.len(),
            to_server = plan.paths_to_add_to_server.len(),
            "Sync plan computed"
        );

        // Materialization
        self.vault.remove_all(&plan.paths_to_delete_from_server).await?;

        let conflicts = self
            .vault
            .resolve_conflicts(
                &self.buffer,
                &plan.conflict_paths,
                &settings.text_suffixes,
                settings.binary_conflicts,
                self.merge_tool.as_ref(),
            )
            .await?;

        self.vault
            .promote_all(&self.buffer, &plan.paths_to_add_to_server)
            .await?;

        let archive = archive::package(
            self.vault.root().to_path_buf(),
            plan.paths_to_add_to_client.clone(),
        )
        .await?;

        let manifest = SyncManifest {
            deleted_server_paths: plan.paths_to_delete_from_client.iter().cloned().collect(),
            new_sync_timestamp: window.started_at,
            unresolved_conflicts: conflicts.unresolved.clone(),
            rejected_uploads,
        };

        Ok(SyncOutcome {
            archive,
            manifest,
            plan,
            conflicts,
            staged_paths,
        })
    }
}

async fn ensure_dir(path: &Path) -> Result<std::path::PathBuf, SyncError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SyncError::vault_io(path.display(), e))?;
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| SyncError::vault_io(path.display(), e))
}
