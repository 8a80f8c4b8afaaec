//! On-disk layout of the attachment cache.
//!
//! ```text
//! <root>/<id>/metadata.json      cached iff present
//! <root>/<id>/original/<name>    the raw blob
//! <root>/<id>/extracted/...      complete archive contents
//! <root>/<id>/.incoming          blob being downloaded
//! <root>/<id>/.extracting/       extraction in progress
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, ZendeskError};

/// Directory name used under the platform temp dir when no override is set.
pub const DEFAULT_CACHE_DIR_NAME: &str = "zendesk-attachments";

pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const ORIGINAL_DIR: &str = "original";
pub(crate) const EXTRACTED_DIR: &str = "extracted";
pub(crate) const INCOMING_FILE: &str = ".incoming";
pub(crate) const METADATA_TMP_FILE: &str = ".metadata.json.tmp";
pub(crate) const STAGING_DIR: &str = ".extracting";

/// Returns the cache root: `configured` if given, else
/// `<tmp>/zendesk-attachments`. The directory is created if missing.
pub fn resolve_root(configured: Option<&Path>) -> Result<PathBuf> {
    let root = match configured {
        Some(path) => path.to_path_buf(),
        None => std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME),
    };
    std::fs::create_dir_all(&root).map_err(ZendeskError::io_with("create cache root", &root))?;
    Ok(root)
}

/// Paths belonging to a single attachment entry. Pure path arithmetic.
#[derive(Debug, Clone)]
pub(crate) struct EntryPaths {
    dir: PathBuf,
}

impl EntryPaths {
    pub(crate) fn new(root: &Path, attachment_id: u64) -> Self {
        Self {
            dir: root.join(attachment_id.to_string()),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn metadata(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub(crate) fn metadata_tmp(&self) -> PathBuf {
        self.dir.join(METADATA_TMP_FILE)
    }

    pub(crate) fn original_dir(&self) -> PathBuf {
        self.dir.join(ORIGINAL_DIR)
    }

    pub(crate) fn extracted_dir(&self) -> PathBuf {
        self.dir.join(EXTRACTED_DIR)
    }

    pub(crate) fn incoming(&self) -> PathBuf {
        self.dir.join(INCOMING_FILE)
    }

    pub(crate) fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    /// The tree listing, reading and searching operate on: `extracted/`
    /// when present, else `original/`, else nothing.
    pub(crate) fn active_tree(&self) -> Option<PathBuf> {
        let extracted = self.extracted_dir();
        if extracted.is_dir() {
            return Some(extracted);
        }
        let original = self.original_dir();
        original.is_dir().then_some(original)
    }
}
