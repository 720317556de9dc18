//! Sync archive packaging
//!
//! Packs the files the client must pull into a single ZIP. Entry names are
//! vault-relative paths so the client can re-root them unambiguously.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::path::VaultPath;
use super::types::SyncError;

/// Build the archive on a blocking thread
pub async fn package(root: PathBuf, paths: BTreeSet<VaultPath>) -> Result<Vec<u8>, SyncError> {
    tokio::task::spawn_blocking(move || build_archive(&root, &paths)).await?
}

/// Write every path under `root` into an in-memory ZIP, in path order
pub fn build_archive(root: &Path, paths: &BTreeSet<VaultPath>) -> Result<Vec<u8>, SyncError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in paths {
        let abs = path.under(root);
        let mut file = File::open(&abs)
            .map_err(|e| SyncError::Archive(format!("cannot open {}: {}", path, e)))?;

        zip.start_file(path.as_str(), options)?;
        std::io::copy(&mut file, &mut zip)
            .map_err(|e| SyncError::Archive(format!("cannot read {}: {}", path, e)))?;
    }

    let cursor = zip.finish()?;

    tracing::debug!(entries = paths.len(), "Archive built");
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn set(paths: &[&str]) -> BTreeSet<VaultPath> {
        paths.iter().map(|p| VaultPath::parse(p).unwrap()).collect()
    }

    #[test]
    fn test_entries_use_vault_relative_names() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/a.md"), "alpha").unwrap();
        std::fs::write(root.join("b, c.md"), "beta").unwrap();

        let bytes = build_archive(root, &set(&["notes/a.md", "b, c.md"])).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"notes/a.md".to_string()));
        assert!(names.contains(&"b, c.md".to_string()));

        let mut content = String::new();
        archive
            .by_name("notes/a.md")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "alpha");
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let bytes = build_archive(temp_dir.path(), &BTreeSet::new()).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = build_archive(temp_dir.path(), &set(&["gone.md"]));
        assert!(matches!(result, Err(SyncError::Archive(_))));
    }
}
