//! Source tree enumeration

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Collect every regular file below `root`.
///
/// Subdirectories that cannot be opened are skipped silently; only a root
/// that cannot be listed at all is an error. Stops early, returning what was
/// found so far, once `cancel` is set. Order follows directory enumeration.
pub fn scan(root: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
    fs::read_dir(root).map_err(|e| Error::SourceUnreadable {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        if cancel.is_cancelled() {
            debug!(?root, found = files.len(), "Scan cancelled");
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    debug!(?root, count = files.len(), "Scanned directory tree");
    Ok(files)
}
