//! Raw blob persistence and the metadata that marks an entry as cached.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::layout::EntryPaths;
use super::AttachmentStore;
use crate::error::{Result, ZendeskError};

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Zendesk attachment ID.
    pub attachment_id: u64,
    /// Name of the blob under `original/`.
    pub filename: String,
    /// Blob size in bytes.
    pub size: u64,
    /// MIME type reported by Zendesk.
    pub content_type: String,
    /// URL the blob was fetched from.
    pub content_url: String,
}

/// A download opened for [`AttachmentStore::get_or_download`].
#[derive(Debug)]
pub struct Download {
    /// URL the body is fetched from.
    pub content_url: String,
    /// Name to store the blob under.
    pub filename: String,
    /// MIME type reported by Zendesk.
    pub content_type: String,
    /// Response whose body is streamed to disk.
    pub body: reqwest::Response,
}

impl<E> AttachmentStore<E> {
    /// Writes `content` as the raw blob for `attachment_id` and records its
    /// metadata.
    ///
    /// Any previous entry for the ID, including an extracted tree, is
    /// replaced. Callers wanting cache semantics check [`is_cached`] first.
    ///
    /// [`is_cached`]: AttachmentStore::is_cached
    pub async fn store(
        &self,
        attachment_id: u64,
        content: &[u8],
        filename: &str,
        content_type: &str,
        content_url: &str,
    ) -> Result<Metadata> {
        let filename = blob_file_name(filename)?;
        let _guard = self.locks().write(attachment_id).await;
        let entry = self.entry(attachment_id);

        reset_entry(&entry).await?;

        let incoming = entry.incoming();
        let mut file = create_file(&incoming).await?;
        file.write_all(content)
            .await
            .map_err(ZendeskError::io_with("write", &incoming))?;
        finish_file(file, &incoming).await?;
        commit_blob(&entry, &filename).await?;

        let metadata = Metadata {
            attachment_id,
            filename,
            size: content.len() as u64,
            content_type: content_type.to_string(),
            content_url: content_url.to_string(),
        };
        write_metadata(&entry, &metadata).await?;

        tracing::info!(
            attachment_id,
            filename = %metadata.filename,
            size = metadata.size,
            "Stored attachment"
        );
        Ok(metadata)
    }

    /// Streams a download body to disk chunk by chunk, then records metadata.
    ///
    /// The body is never buffered whole. Network errors propagate unchanged
    /// and leave the entry uncached. Like [`store`], this replaces whatever
    /// the entry held; [`get_or_download`] is the cache-aware variant.
    ///
    /// [`store`]: AttachmentStore::store
    /// [`get_or_download`]: AttachmentStore::get_or_download
    pub async fn download_and_store(
        &self,
        attachment_id: u64,
        content_url: &str,
        filename: &str,
        content_type: &str,
        body: reqwest::Response,
    ) -> Result<Metadata> {
        let filename = blob_file_name(filename)?;
        let _guard = self.locks().write(attachment_id).await;
        let entry = self.entry(attachment_id);
        stream_body(&entry, attachment_id, filename, content_url, content_type, body).await
    }

    /// Returns the cached metadata for `attachment_id`, or runs `fetch` and
    /// streams the download it opens into the cache.
    ///
    /// The cache check and the write happen under one write lock, so
    /// concurrent callers for the same ID download once and later callers
    /// see the first caller's entry, extracted tree included. The flag is
    /// true when `fetch` was not called.
    pub async fn get_or_download<F, Fut>(
        &self,
        attachment_id: u64,
        fetch: F,
    ) -> Result<(Metadata, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Download>>,
    {
        let _guard = self.locks().write(attachment_id).await;
        let entry = self.entry(attachment_id);

        if let Some(metadata) = read_metadata(&entry).await? {
            tracing::debug!(attachment_id, "Attachment already cached");
            return Ok((metadata, true));
        }

        let download = fetch().await?;
        let filename = blob_file_name(&download.filename)?;
        let metadata = stream_body(
            &entry,
            attachment_id,
            filename,
            &download.content_url,
            &download.content_type,
            download.body,
        )
        .await?;
        Ok((metadata, false))
    }

    /// Returns true once `metadata.json` exists for the ID.
    pub fn is_cached(&self, attachment_id: u64) -> bool {
        self.entry(attachment_id).metadata().is_file()
    }

    /// Reads the cached metadata, or `None` when the ID is not cached.
    pub async fn get_metadata(&self, attachment_id: u64) -> Result<Option<Metadata>> {
        let _guard = self.locks().read(attachment_id).await;
        read_metadata(&self.entry(attachment_id)).await
    }
}

pub(crate) async fn read_metadata(entry: &EntryPaths) -> Result<Option<Metadata>> {
    let path = entry.metadata();
    match fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ZendeskError::io("read", &path, e)),
    }
}

/// Writes `body` into a freshly reset entry. The caller holds the write lock.
async fn stream_body(
    entry: &EntryPaths,
    attachment_id: u64,
    filename: String,
    content_url: &str,
    content_type: &str,
    mut body: reqwest::Response,
) -> Result<Metadata> {
    reset_entry(entry).await?;

    let incoming = entry.incoming();
    let mut file = create_file(&incoming).await?;
    let mut size: u64 = 0;

    loop {
        let chunk = match body.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                discard(&incoming).await;
                return Err(ZendeskError::Http(e));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            discard(&incoming).await;
            return Err(ZendeskError::io("write", &incoming, e));
        }
        size += chunk.len() as u64;
    }

    finish_file(file, &incoming).await?;
    commit_blob(entry, &filename).await?;

    let metadata = Metadata {
        attachment_id,
        filename,
        size,
        content_type: content_type.to_string(),
        content_url: content_url.to_string(),
    };
    write_metadata(entry, &metadata).await?;

    tracing::info!(
        attachment_id,
        filename = %metadata.filename,
        size,
        "Downloaded attachment into cache"
    );
    Ok(metadata)
}

/// Reduces a caller-supplied filename to a single safe path component.
fn blob_file_name(filename: &str) -> Result<String> {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ZendeskError::invalid_argument(format!("unusable attachment filename: {:?}", filename))
        })
}

/// Clears everything an earlier store left behind and recreates an empty
/// `original/`. Metadata goes first so the entry stops being cached before
/// anything else changes.
async fn reset_entry(entry: &EntryPaths) -> Result<()> {
    fs::create_dir_all(entry.dir())
        .await
        .map_err(ZendeskError::io_with("create", entry.dir()))?;

    remove_file_if_exists(&entry.metadata()).await?;
    remove_file_if_exists(&entry.metadata_tmp()).await?;
    remove_file_if_exists(&entry.incoming()).await?;
    remove_dir_if_exists(&entry.extracted_dir()).await?;
    remove_dir_if_exists(&entry.staging_dir()).await?;
    remove_dir_if_exists(&entry.original_dir()).await?;

    let original = entry.original_dir();
    fs::create_dir_all(&original)
        .await
        .map_err(ZendeskError::io_with("create", &original))
}

async fn create_file(path: &Path) -> Result<fs::File> {
    fs::File::create(path)
        .await
        .map_err(ZendeskError::io_with("create", path))
}

async fn finish_file(mut file: fs::File, path: &Path) -> Result<()> {
    file.flush()
        .await
        .map_err(ZendeskError::io_with("flush", path))?;
    file.sync_all()
        .await
        .map_err(ZendeskError::io_with("sync", path))
}

async fn commit_blob(entry: &EntryPaths, filename: &str) -> Result<()> {
    let incoming = entry.incoming();
    let target = entry.original_dir().join(filename);
    fs::rename(&incoming, &target)
        .await
        .map_err(ZendeskError::io_with("move blob into", &target))
}

async fn write_metadata(entry: &EntryPaths, metadata: &Metadata) -> Result<()> {
    let tmp = entry.metadata_tmp();
    let json = serde_json::to_vec_pretty(metadata)?;
    fs::write(&tmp, json)
        .await
        .map_err(ZendeskError::io_with("write", &tmp))?;

    let path = entry.metadata();
    fs::rename(&tmp, &path)
        .await
        .map_err(ZendeskError::io_with("write", &path))
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "Could not remove partial download");
    }
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ZendeskError::io("remove", path, e)),
    }
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ZendeskError::io("remove", path, e)),
    }
}
