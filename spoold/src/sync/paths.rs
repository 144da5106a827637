use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("local path has no file name: {0}")]
    MissingFileName(String),
    #[error("file name is not valid UTF-8: {0}")]
    NonUtf8(String),
}

/// Maps a watched file to its object name under `prefix`, joined by exactly
/// one `/`. Only the file name is used, the watch directory is flat.
pub fn remote_name_for(prefix: &str, local: &Path) -> Result<String, PathError> {
    let name = local
        .file_name()
        .ok_or_else(|| PathError::MissingFileName(local.display().to_string()))?
        .to_str()
        .ok_or_else(|| PathError::NonUtf8(local.display().to_string()))?;
    let prefix = prefix.trim_end_matches('/');
    Ok(format!("{prefix}/{name}"))
}
