//! Dropping tracking state for files that no longer exist.

use std::path::PathBuf;

use logship_core::metrics as m;

use crate::tracker::TrackedFiles;

/// Remove every tracked file whose path can no longer be opened.
///
/// Files are opened read-only and never created. Only "not found" drops
/// an entry; other open errors (permissions, transient I/O) keep it, so a
/// briefly unreadable file does not lose its cursor. Returns the removed paths.
pub async fn groom(tracked: &mut TrackedFiles) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for path in tracked.paths() {
        match tokio::fs::OpenOptions::new().read(true).open(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracked.remove(&path);
                tracing::info!(path = %path.display(), "file disappeared, no longer tracked");
                removed.push(path);
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot open tracked file, keeping it");
            }
        }
    }

    if !removed.is_empty() {
        metrics::counter!(m::AGENT_FILES_GROOMED_TOTAL).increment(removed.len() as u64);
    }
    removed
}
