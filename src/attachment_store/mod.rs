//! Disk-backed cache of Zendesk attachments.
//!
//! Each attachment ID owns one directory under the cache root. The raw
//! blob lives in `original/`; archives can be unpacked into `extracted/`.
//! Listing, reading and searching operate on the *active tree*, which is
//! `extracted/` when present and `original/` otherwise.
//!
//! The store is a cheap cloneable handle. Operations on the same ID are
//! serialized through a per-ID reader/writer lock; different IDs proceed
//! independently. Blocking filesystem work runs on the blocking pool.

mod blob;
mod content;
mod extract;
mod layout;
mod listing;
mod locks;
mod reader;
mod search;
#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use blob::{Download, Metadata};
pub use extract::{ArchiveKind, CommandExtractor, ExtractionResult, Extractor};
pub use layout::{resolve_root, DEFAULT_CACHE_DIR_NAME};
pub use listing::{EntryType, FileEntry, DEFAULT_LIST_PATTERN};
pub use reader::{BinaryContent, ReadResult, TextContent};
pub use search::{SearchMatch, SearchOptions, SearchResult};

use crate::error::{Result, ZendeskError};
use layout::EntryPaths;
use locks::EntryLocks;

/// Handle to the attachment cache.
pub struct AttachmentStore<E = CommandExtractor> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    root: PathBuf,
    locks: EntryLocks,
    extractor: E,
}

impl<E> Clone for AttachmentStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for AttachmentStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentStore")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

impl AttachmentStore {
    /// Opens the cache at `configured`, or at the default location under the
    /// system temp dir, creating the root if needed.
    pub fn open(configured: Option<&Path>) -> Result<Self> {
        let root = resolve_root(configured)?;
        tracing::info!(root = %root.display(), "Attachment cache ready");
        Ok(Self::with_extractor(root, CommandExtractor))
    }
}

impl<E> AttachmentStore<E> {
    /// Creates a store at `root` using a custom extractor. The root is
    /// created lazily by the first write.
    pub fn with_extractor(root: PathBuf, extractor: E) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                locks: EntryLocks::new(),
                extractor,
            }),
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Directory holding everything for `attachment_id`. Pure path
    /// arithmetic; the directory may not exist.
    pub fn attachment_dir(&self, attachment_id: u64) -> PathBuf {
        self.entry(attachment_id).dir().to_path_buf()
    }

    /// Removes the whole entry. Returns false when nothing was cached.
    pub async fn delete(&self, attachment_id: u64) -> Result<bool> {
        let _guard = self.locks().write(attachment_id).await;
        let dir = self.attachment_dir(attachment_id);

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(attachment_id, "Deleted cached attachment");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ZendeskError::io("delete", &dir, e)),
        }
    }

    pub(crate) fn locks(&self) -> &EntryLocks {
        &self.inner.locks
    }

    pub(crate) fn entry(&self, attachment_id: u64) -> EntryPaths {
        EntryPaths::new(&self.inner.root, attachment_id)
    }

    pub(crate) fn extractor(&self) -> &E {
        &self.inner.extractor
    }
}
