use std::path::{Path, PathBuf};

use crate::util::path::{self as sync_path, MatchMode};

/// A local file picked up for syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    /// Forward-slash path from the sync root, e.g. `photos/beach.jpg`.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFolder {
    pub name: String,
    pub path: PathBuf,
}

/// Immediate subdirectories of `root`, minus the skipped ones.
///
/// An unreadable root is logged and yields no folders.
pub async fn list_subfolders(root: &Path, patterns: &[String], mode: MatchMode) -> Vec<LocalFolder> {
    let entries = match read_dir_sorted(root).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(path = %root.display(), error = %e, "cannot read directory");
            return Vec::new();
        }
    };

    let mut folders = Vec::new();
    for (name, path, file_type) in entries {
        if !file_type.is_dir() {
            continue;
        }
        if is_excluded(&path, &name, patterns, mode) {
            tracing::info!(path = %path.display(), "skipping excluded folder");
            continue;
        }
        folders.push(LocalFolder { name, path });
    }
    folders
}

/// Regular files directly inside `folder`, with sizes.
///
/// `base_path` is the folder's path relative to the sync root ("" for the
/// root itself). An unreadable folder is logged and yields no files.
pub async fn list_files(
    folder: &Path,
    base_path: &str,
    patterns: &[String],
    mode: MatchMode,
) -> Vec<LocalFile> {
    let entries = match read_dir_sorted(folder).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(path = %folder.display(), error = %e, "cannot read folder");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for (name, full_path, file_type) in entries {
        let relative_path = sync_path::join(base_path, &name);
        if is_excluded(&full_path, &relative_path, patterns, mode) {
            tracing::debug!(path = %full_path.display(), "excluded");
            continue;
        }
        // Symlinks are not followed
        if !file_type.is_file() {
            continue;
        }

        let size = match tokio::fs::metadata(&full_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %full_path.display(), error = %e, "cannot stat, skipping");
                continue;
            }
        };

        files.push(LocalFile {
            relative_path,
            name,
            full_path,
            size,
        });
    }
    files
}

/// Substring patterns test the full local path; glob patterns are anchored,
/// so they test the path relative to the sync root.
fn is_excluded(full_path: &Path, relative_path: &str, patterns: &[String], mode: MatchMode) -> bool {
    match mode {
        MatchMode::Substring => sync_path::matches(&full_path.to_string_lossy(), patterns, mode),
        MatchMode::Glob => sync_path::matches(relative_path, patterns, mode),
    }
}

async fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<(String, PathBuf, std::fs::FileType)>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "cannot read entry type");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path(), file_type));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
