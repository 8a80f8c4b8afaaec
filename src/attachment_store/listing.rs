//! Glob-filtered enumeration of an entry's active content tree.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::AttachmentStore;
use crate::error::{Result, ZendeskError};

/// Pattern used when the caller does not supply one.
pub const DEFAULT_LIST_PATTERN: &str = "**/*";

/// Kind of a listed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One path inside an attachment's content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the tree root, `/`-separated.
    pub path: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Size in bytes, files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileEntry {
    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

impl<E> AttachmentStore<E> {
    /// Lists paths in the active tree matching `pattern`, sorted by path.
    ///
    /// `*` stays within one path segment; `**` crosses directories. An
    /// entry with neither `extracted/` nor `original/` yields an empty list.
    pub async fn list(&self, attachment_id: u64, pattern: &str) -> Result<Vec<FileEntry>> {
        let pattern = match pattern.trim() {
            "" => DEFAULT_LIST_PATTERN.to_string(),
            p => p.to_string(),
        };

        let guard = self.locks().read(attachment_id).await;
        let entry = self.entry(attachment_id);
        if !entry.dir().is_dir() {
            return Err(ZendeskError::attachment_not_cached(attachment_id));
        }
        let Some(tree) = entry.active_tree() else {
            return Ok(Vec::new());
        };

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            list_tree(&tree, &pattern)
        })
        .await?
    }
}

/// Compiles a listing glob, where `*` does not match `/`.
pub(crate) fn list_matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ZendeskError::invalid_argument(format!("invalid glob pattern: {}", e)))
}

/// Walks `tree` and returns matching entries sorted by relative path.
/// Symlinks and other special files are skipped.
pub(crate) fn list_tree(tree: &Path, pattern: &str) -> Result<Vec<FileEntry>> {
    let matcher = list_matcher(pattern)?;
    let mut entries = Vec::new();

    for item in WalkDir::new(tree).min_depth(1).sort_by_file_name() {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(tree).to_path_buf();
            ZendeskError::io("walk", &path, e.into())
        })?;

        let file_type = item.file_type();
        let entry_type = if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_file() {
            EntryType::File
        } else {
            continue;
        };

        let Some(path) = relative_path(tree, item.path()) else {
            continue;
        };
        if !matcher.is_match(&path) {
            continue;
        }

        let size = match entry_type {
            EntryType::File => Some(
                item.metadata()
                    .map_err(|e| ZendeskError::io("stat", item.path(), e.into()))?
                    .len(),
            ),
            EntryType::Directory => None,
        };

        entries.push(FileEntry {
            path,
            entry_type,
            size,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Renders `path` relative to `tree` with `/` separators.
pub(crate) fn relative_path(tree: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(tree).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
