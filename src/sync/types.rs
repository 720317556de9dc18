//! Sync data types
//!
//! Defines the request/response contract of a sync round and the errors the
//! engine can surface.

use std::collections::BTreeSet;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::materialize::ConflictReport;
use super::path::VaultPath;
use super::reconcile::SyncPlan;

// ============================================================================
// Constants
// ============================================================================

/// File name clients send as the "no uploads" placeholder part
pub const EMPTY_UPLOAD_SENTINEL: &str = "empty";

/// File name of the archive returned to the client
pub const ARCHIVE_FILE_NAME: &str = "results.zip";

// ============================================================================
// Request Types
// ============================================================================

/// A file uploaded by the client, keyed by its vault-relative path
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Relative path as sent by the client
    pub path: String,

    /// Raw file content
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Whether this part is the zero-length "no uploads" placeholder
    pub fn is_sentinel(&self) -> bool {
        self.path == EMPTY_UPLOAD_SENTINEL && self.content.is_empty()
    }
}

/// One sync round as submitted by the client
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Wall-clock seconds of the client's previous successful sync
    pub last_sync_timestamp: f64,

    /// Every path the client currently holds
    pub all_client_paths: Vec<String>,

    /// Paths the client removed since its last sync
    pub deleted_client_paths: Vec<String>,

    /// Files created or modified on the client since its last sync
    pub uploaded_files: Vec<UploadedFile>,
}

// ============================================================================
// Sync Window
// ============================================================================

/// The open interval `(last_sync, started_at)` used to classify server changes
///
/// Both bounds are truncated to whole seconds before comparison, matching the
/// granularity used for file modification times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub last_sync: f64,
    pub started_at: f64,
}

impl SyncWindow {
    pub fn new(last_sync: f64, started_at: f64) -> Self {
        Self {
            last_sync,
            started_at,
        }
    }

    /// Open a window ending at the current wall-clock time
    pub fn starting_now(last_sync: f64) -> Self {
        Self::new(last_sync, now_timestamp())
    }

    /// Whether a modification time (whole seconds) lies strictly inside the window
    pub fn contains(&self, mtime_secs: i64) -> bool {
        truncate_seconds(self.last_sync) < mtime_secs && mtime_secs < truncate_seconds(self.started_at)
    }
}

/// Current wall-clock time as fractional Unix seconds
pub fn now_timestamp() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Whole Unix seconds of a filesystem timestamp
pub fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

fn truncate_seconds(value: f64) -> i64 {
    value.trunc() as i64
}

// ============================================================================
// Result Types
// ============================================================================

/// Metadata returned alongside the archive
#[derive(Debug, Clone, Serialize)]
pub struct SyncManifest {
    /// Paths the client must delete locally
    pub deleted_server_paths: Vec<VaultPath>,

    /// Timestamp the client must send as `last_sync_timestamp` next time
    pub new_sync_timestamp: f64,

    /// Conflicted paths whose client copy could not be applied
    pub unresolved_conflicts: Vec<VaultPath>,

    /// Uploads refused because their suffix is not synchronized
    pub rejected_uploads: Vec<VaultPath>,
}

/// Full outcome of a sync round
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// ZIP archive with every file the client must pull
    pub archive: Vec<u8>,

    pub manifest: SyncManifest,

    /// Action sets computed for this round
    pub plan: SyncPlan,

    /// How the conflicting paths were settled
    pub conflicts: ConflictReport,

    /// Uploads that were staged, before any policy filtering
    pub staged_paths: BTreeSet<VaultPath>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the sync engine
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to stage {path}: {source}")]
    Staging {
        path: VaultPath,
        #[source]
        source: std::io::Error,
    },

    #[error("Vault I/O failed for {path}: {source}")]
    VaultIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Merge tool failed for {path}: {reason}")]
    MergeTool { path: VaultPath, reason: String },

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Another sync is in progress")]
    Busy,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    pub(crate) fn vault_io(path: impl ToString, source: std::io::Error) -> Self {
        SyncError::VaultIo {
            path: path.to_string(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(e: zip::result::ZipError) -> Self {
        SyncError::Archive(e.to_string())
    }
}
