use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to list {path}: {source}")]
    List { path: PathBuf, source: io::Error },
    #[error("failed to stat {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },
}

/// Lists the watch directory (non-recursively) and keeps the regular files
/// whose name matches at least one pattern. Symlinks are not followed.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
    patterns: Vec<Regex>,
}

impl DirectoryScanner {
    pub fn new(root: PathBuf, patterns: Vec<Regex>) -> Self {
        Self { root, patterns }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(file_name))
    }

    /// Absolute paths of eligible files, sorted. Any listing or stat failure
    /// aborts the whole pass so a partial result never reaches the queue.
    pub async fn scan(&self) -> Result<Vec<String>, ScanError> {
        let list_err = |source| ScanError::List {
            path: self.root.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(list_err)?;
        let mut found = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::debug!(name = ?file_name, "skipping non UTF-8 file name");
                continue;
            };
            if !self.matches(name) {
                continue;
            }

            let path = entry.path();
            let meta = tokio::fs::symlink_metadata(&path)
                .await
                .map_err(|source| ScanError::Stat {
                    path: path.clone(),
                    source,
                })?;
            if !meta.is_file() {
                continue;
            }
            if let Some(path) = path.to_str() {
                found.push(path.to_string());
            }
        }

        found.sort();
        Ok(found)
    }
}
