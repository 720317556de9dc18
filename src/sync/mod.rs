//! Vault synchronization
//!
//! A sync round moves through four stages, all under one lock:
//! - `staging`: client uploads land in the buffer
//! - `detect`: vault files changed inside the sync window are found by mtime
//! - `reconcile`: set algebra turns both inventories into a plan
//! - `materialize`: deletes, conflict merges and promotions are applied, then
//!   `archive` packs what the client must pull

pub mod archive;
pub mod detect;
pub mod engine;
pub mod materialize;
pub mod merge;
pub mod path;
pub mod reconcile;
pub mod staging;
pub mod types;

pub use detect::ServerInventory;
pub use engine::SyncEngine;
pub use materialize::ConflictReport;
pub use merge::{GitMergeFile, MergeFailure, MergeOutput, MergeTool};
pub use path::VaultPath;
pub use reconcile::{reconcile, ClientInventory, SyncPlan};
pub use types::*;
