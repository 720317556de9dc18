//! Line-based three-way merge
//!
//! Conflict resolution delegates to an external merge utility behind the
//! [`MergeTool`] trait. The default implementation shells out to
//! `git merge-file`.
//!
//! No common ancestor is stored between rounds, so conflicts are merged
//! against an empty document. Both sides then count as wholly added text and
//! overlapping regions come back wrapped in conflict markers; the markers are
//! informational, not a real three-way merge.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Merged document produced by a merge tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub content: Vec<u8>,
    /// Number of conflict hunks left as markers
    pub conflicts: usize,
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct MergeFailure(pub String);

/// Trait for merge backends
#[async_trait]
pub trait MergeTool: Send + Sync {
    /// Merge `other` into `current` relative to `ancestor`
    async fn merge(
        &self,
        current: &Path,
        ancestor: &Path,
        other: &Path,
    ) -> Result<MergeOutput, MergeFailure>;
}

/// `git merge-file -p` backend
#[derive(Debug, Clone)]
pub struct GitMergeFile {
    program: String,
}

impl GitMergeFile {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitMergeFile {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl MergeTool for GitMergeFile {
    async fn merge(
        &self,
        current: &Path,
        ancestor: &Path,
        other: &Path,
    ) -> Result<MergeOutput, MergeFailure> {
        let output = Command::new(&self.program)
            .arg("merge-file")
            .arg("-p")
            .args(["-L", "server", "-L", "base", "-L", "client"])
            .arg(current)
            .arg(ancestor)
            .arg(other)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MergeFailure(format!("failed to run {}: {}", self.program, e)))?;

        interpret_status(&self.program, output.status.code(), output.stdout, &output.stderr)
    }
}

/// Map a `merge-file` exit status to a merge result.
///
/// 0 is a clean merge, 1..=127 is the number of conflict hunks, anything
/// else (including termination by a signal) is an error.
fn interpret_status(
    program: &str,
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: &[u8],
) -> Result<MergeOutput, MergeFailure> {
    match code {
        Some(code) if (0..128).contains(&code) => Ok(MergeOutput {
            content: stdout,
            conflicts: code as usize,
        }),
        Some(code) => Err(MergeFailure(format!(
            "{} merge-file exited with status {}: {}",
            program,
            code,
            String::from_utf8_lossy(stderr).trim()
        ))),
        None => Err(MergeFailure(format!(
            "{} merge-file was terminated by a signal",
            program
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_zero_is_clean_merge() {
        let merged = interpret_status("git", Some(0), b"same\n".to_vec(), b"").unwrap();
        assert_eq!(merged.conflicts, 0);
        assert_eq!(merged.content, b"same\n");
    }

    #[test]
    fn test_status_counts_conflict_hunks() {
        let merged = interpret_status("git", Some(3), b"<<<<<<<".to_vec(), b"").unwrap();
        assert_eq!(merged.conflicts, 3);

        let capped = interpret_status("git", Some(127), Vec::new(), b"").unwrap();
        assert_eq!(capped.conflicts, 127);
    }

    #[test]
    fn test_error_status_fails() {
        let err = interpret_status("git", Some(128), Vec::new(), b"fatal: bad input\n").unwrap_err();
        assert!(err.to_string().contains("status 128"));
        assert!(err.to_string().contains("fatal: bad input"));

        assert!(interpret_status("git", Some(255), Vec::new(), b"").is_err());
        assert!(interpret_status("git", Some(-1), Vec::new(), b"").is_err());
    }

    #[test]
    fn test_signal_termination_fails() {
        let err = interpret_status("git", None, b"partial".to_vec(), b"").unwrap_err();
        assert!(err.to_string().contains("signal"));
    }

    #[tokio::test]
    #[ignore = "requires git on PATH"]
    async fn test_identical_sides_merge_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let current = temp_dir.path().join("current.md");
        let ancestor = temp_dir.path().join("ancestor.md");
        let other = temp_dir.path().join("other.md");
        std::fs::write(&current, "same\n").unwrap();
        std::fs::write(&ancestor, "").unwrap();
        std::fs::write(&other, "same\n").unwrap();

        let merged = GitMergeFile::default()
            .merge(&current, &ancestor, &other)
            .await
            .unwrap();

        assert_eq!(merged.conflicts, 0);
        assert_eq!(merged.content, b"same\n");
        // -p never touches the current file
        assert_eq!(std::fs::read(&current).unwrap(), b"same\n");
    }

    #[tokio::test]
    #[ignore = "requires git on PATH"]
    async fn test_divergent_sides_produce_markers() {
        let temp_dir = TempDir::new().unwrap();
        let current = temp_dir.path().join("current.md");
        let ancestor = temp_dir.path().join("ancestor.md");
        let other = temp_dir.path().join("other.md");
        std::fs::write(&current, "server line\n").unwrap();
        std::fs::write(&ancestor, "").unwrap();
        std::fs::write(&other, "client line\n").unwrap();

        let merged = GitMergeFile::default()
            .merge(&current, &ancestor, &other)
            .await
            .unwrap();

        let text = String::from_utf8(merged.content).unwrap();
        assert!(merged.conflicts >= 1);
        assert!(text.contains("<<<<<<< server"));
        assert!(text.contains("server line"));
        assert!(text.contains("client line"));
        assert!(text.contains(">>>>>>> client"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f.md");
        std::fs::write(&file, "x\n").unwrap();

        let result = GitMergeFile::new("vault-sync-no-such-merge-tool")
            .merge(&file, &file, &file)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires git on PATH"]
    async fn test_missing_input_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.md");

        let result = GitMergeFile::default().merge(&missing, &missing, &missing).await;

        assert!(result.is_err());
    }
}
