//! Configuration management for Vault Sync Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default request body cap: 512MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub vault: VaultConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Live vault root
    pub vault_path: PathBuf,
    /// Quarantine root for staged uploads
    pub buffer_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub api_key: String,
}

/// What to do with uploads whose suffix is not synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnrecognizedUploadPolicy {
    /// Discard the staged copy and report the path back
    Reject,
    /// Promote into the vault, where change detection never sees it
    Accept,
}

/// What to do when a non-text file was changed on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryConflictPolicy {
    /// Keep the vault copy and drop the client copy
    ServerWins,
    /// Keep the vault copy, leave the client copy staged and report the path
    Flag,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Suffixes visible to change detection
    pub recognized_suffixes: Vec<String>,
    /// Suffixes that are merged line by line on conflict
    pub text_suffixes: Vec<String>,
    pub unrecognized_uploads: UnrecognizedUploadPolicy,
    pub binary_conflicts: BinaryConflictPolicy,
    /// Upper bound on waiting for the sync lock; `None` waits indefinitely
    pub lock_timeout: Option<Duration>,
    /// Program invoked as `<merge_tool> merge-file`
    pub merge_tool: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            recognized_suffixes: split_list(".md,.jpg,.png,.pdf"),
            text_suffixes: split_list(".md"),
            unrecognized_uploads: UnrecognizedUploadPolicy::Reject,
            binary_conflicts: BinaryConflictPolicy::ServerWins,
            lock_timeout: None,
            merge_tool: "git".to_string(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            vault_path: PathBuf::from("./vault"),
            buffer_path: PathBuf::from("./merging/vault"),
        }
    }
}

impl FromStr for UnrecognizedUploadPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "accept" => Ok(Self::Accept),
            _ => Err(ConfigError::Invalid {
                var: "SYNC_UNRECOGNIZED_UPLOADS",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for BinaryConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server-wins" | "server_wins" | "server" => Ok(Self::ServerWins),
            "flag" => Ok(Self::Flag),
            _ => Err(ConfigError::Invalid {
                var: "SYNC_BINARY_CONFLICTS",
                value: s.to_string(),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SyncConfig::default();
        let vault_defaults = VaultConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .unwrap_or(8000),
                max_upload_bytes: env::var("SYNC_MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            vault: VaultConfig {
                vault_path: env::var("VAULT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(vault_defaults.vault_path),
                buffer_path: env::var("BUFFER_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(vault_defaults.buffer_path),
            },
            auth: AuthConfig {
                api_key: env::var("SYNC_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or(ConfigError::Missing("SYNC_API_KEY"))?,
            },
            sync: SyncConfig {
                recognized_suffixes: env::var("SYNC_RECOGNIZED_SUFFIXES")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.recognized_suffixes),
                text_suffixes: env::var("SYNC_TEXT_SUFFIXES")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.text_suffixes),
                unrecognized_uploads: match env::var("SYNC_UNRECOGNIZED_UPLOADS") {
                    Ok(v) => v.parse()?,
                    Err(_) => defaults.unrecognized_uploads,
                },
                binary_conflicts: match env::var("SYNC_BINARY_CONFLICTS") {
                    Ok(v) => v.parse()?,
                    Err(_) => defaults.binary_conflicts,
                },
                lock_timeout: match env::var("SYNC_LOCK_TIMEOUT_SECS") {
                    Ok(v) => Some(Duration::from_secs(v.trim().parse().map_err(|_| {
                        ConfigError::Invalid {
                            var: "SYNC_LOCK_TIMEOUT_SECS",
                            value: v.clone(),
                        }
                    })?)),
                    Err(_) => None,
                },
                merge_tool: env::var("MERGE_TOOL").unwrap_or(defaults.merge_tool),
            },
        })
    }
}

/// Split a comma-separated suffix list, normalizing each entry to start with '.'
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('.') {
                s.to_ascii_lowercase()
            } else {
                format!(".{}", s.to_ascii_lowercase())
            }
        })
        .collect()
}
