use std::path::Path;

use spool_core::StoreClient;

use super::checksum::md5_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// The remote object already holds exactly the local content.
    Match,
    /// Different content, or we could not tell.
    Mismatch,
}

/// Decides whether the object already stored at `remote_name` is the local
/// file. Any failure along the way resolves to `Mismatch`; the caller never
/// deletes on uncertainty.
pub async fn resolve_conflict(
    client: &StoreClient,
    remote_name: &str,
    local: &Path,
) -> ConflictOutcome {
    let remote = match client.info(remote_name).await {
        Ok(info) => info,
        Err(err) => {
            tracing::warn!(remote = remote_name, error = %err, "conflict: remote metadata fetch failed");
            return ConflictOutcome::Mismatch;
        }
    };
    let local_md5 = match md5_file(local).await {
        Ok(hash) => hash,
        Err(err) => {
            tracing::warn!(path = %local.display(), error = %err, "conflict: local checksum failed");
            return ConflictOutcome::Mismatch;
        }
    };

    let outcome = compare_checksums(&local_md5, remote.md5.as_deref());
    if outcome == ConflictOutcome::Mismatch {
        tracing::warn!(
            path = %local.display(),
            remote = remote_name,
            local_md5 = %local_md5,
            remote_md5 = remote.md5.as_deref().unwrap_or("<none>"),
            "conflict: a different object already exists under this name, needs operator attention"
        );
    }
    outcome
}

fn compare_checksums(local: &str, remote: Option<&str>) -> ConflictOutcome {
    match remote {
        Some(remote) if remote.trim().eq_ignore_ascii_case(local) => ConflictOutcome::Match,
        _ => ConflictOutcome::Mismatch,
    }
}
