//! Deterministic directory traversal.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Collect every regular file under `root`, as paths relative to `root`.
///
/// Traversal order is deterministic (entries sorted by file name at each
/// level), which lets a resumed fingerprint pass line up with the checkpoint
/// written by an interrupted one. Unreadable directory entries are skipped
/// with a warning; symlinks are not followed.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match entry.path().strip_prefix(root) {
            Ok(relative) => files.push(relative.to_path_buf()),
            Err(_) => files.push(entry.path().to_path_buf()),
        }
    }

    files
}
