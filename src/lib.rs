//! Vault Sync Server
//!
//! Two-party, timestamp-based file synchronization between one client and a
//! server-side vault directory.
//!
//! # Modules
//!
//! - `sync`: staging, change detection, reconciliation and materialization
//! - `routes`: HTTP surface (`POST /api/sync`, health)
//! - `auth`: bearer key check in front of the sync route

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;

pub use routes::app;
