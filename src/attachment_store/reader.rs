//! Reading a single file from an entry's active tree.

use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use super::content::{classify, ContentKind, LineReader};
use super::AttachmentStore;
use crate::error::{Result, ZendeskError};

/// Text window returned by [`AttachmentStore::read`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    /// Attachment ID.
    pub attachment_id: u64,
    /// Path as requested.
    pub path: String,
    /// Lines formatted as `"{line_number}\t{text}"`, joined with `\n`.
    pub content: String,
    /// Number of lines in `content`.
    pub lines_returned: usize,
    /// Number of lines in the whole file.
    pub total_lines: usize,
    /// True when lines remain past the window.
    pub has_more: bool,
}

/// Whole-file binary payload returned by [`AttachmentStore::read`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryContent {
    /// Attachment ID.
    pub attachment_id: u64,
    /// Path as requested.
    pub path: String,
    /// File bytes, standard base64 with padding.
    pub content_base64: String,
    /// File size in bytes.
    pub size: u64,
    /// MIME type guessed from the filename.
    pub content_type: String,
}

/// Result of reading a file; serializes as whichever shape applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReadResult {
    /// A window of lines.
    Text(TextContent),
    /// The whole file.
    Binary(BinaryContent),
}

impl<E> AttachmentStore<E> {
    /// Reads a file from the active tree.
    ///
    /// Text files return the window of `limit` lines starting at the
    /// zero-based line `offset`, numbered from 1. Binary files are returned
    /// whole as base64 and ignore the window.
    pub async fn read(
        &self,
        attachment_id: u64,
        relative_path: &str,
        offset: usize,
        limit: usize,
    ) -> Result<ReadResult> {
        let requested = validate_relative_path(relative_path)?;

        let guard = self.locks().read(attachment_id).await;
        let entry = self.entry(attachment_id);
        if !entry.dir().is_dir() {
            return Err(ZendeskError::attachment_not_cached(attachment_id));
        }
        let tree = entry.active_tree().ok_or_else(|| {
            ZendeskError::not_found(format!(
                "attachment {} has no readable content",
                attachment_id
            ))
        })?;

        let relative_path = relative_path.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let file = resolve_inside(&tree, &requested, &relative_path)?;
            match classify(&requested) {
                ContentKind::Binary { content_type } => {
                    read_binary(attachment_id, relative_path, &file, content_type)
                }
                ContentKind::Text => read_text(attachment_id, relative_path, &file, offset, limit),
            }
        })
        .await?
    }
}

/// Rejects empty, absolute and parent-escaping paths before any filesystem
/// access.
fn validate_relative_path(relative_path: &str) -> Result<PathBuf> {
    if relative_path.trim().is_empty() {
        return Err(ZendeskError::invalid_argument("file path must not be empty"));
    }

    let path = Path::new(relative_path);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ZendeskError::invalid_argument(format!(
                    "path must not contain '..': {}",
                    relative_path
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ZendeskError::invalid_argument(format!(
                    "path must be relative: {}",
                    relative_path
                )))
            }
        }
    }
    Ok(path.to_path_buf())
}

/// Resolves `requested` under `tree`, following symlinks, and checks the
/// real location is still inside the tree.
fn resolve_inside(tree: &Path, requested: &Path, display: &str) -> Result<PathBuf> {
    let root = tree
        .canonicalize()
        .map_err(ZendeskError::io_with("resolve", tree))?;

    let resolved = match tree.join(requested).canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ZendeskError::not_found(format!("file not found: {}", display)))
        }
        Err(e) => return Err(ZendeskError::io("resolve", &tree.join(requested), e)),
    };

    if !resolved.starts_with(&root) {
        return Err(ZendeskError::invalid_argument(format!(
            "path escapes attachment directory: {}",
            display
        )));
    }
    let file_type = std::fs::metadata(&resolved)
        .map_err(ZendeskError::io_with("stat", &resolved))?
        .file_type();
    if file_type.is_dir() {
        return Err(ZendeskError::invalid_argument(format!(
            "cannot read directory: {}",
            display
        )));
    }
    // Opening a FIFO or device would block with the entry lock held.
    if !file_type.is_file() {
        return Err(ZendeskError::invalid_argument(format!(
            "not a regular file: {}",
            display
        )));
    }
    Ok(resolved)
}

fn read_binary(
    attachment_id: u64,
    path: String,
    file: &Path,
    content_type: String,
) -> Result<ReadResult> {
    let bytes = std::fs::read(file).map_err(ZendeskError::io_with("read", file))?;
    Ok(ReadResult::Binary(BinaryContent {
        attachment_id,
        path,
        size: bytes.len() as u64,
        content_base64: STANDARD.encode(&bytes),
        content_type,
    }))
}

/// Streams the file once, decoding only lines inside the window.
fn read_text(
    attachment_id: u64,
    path: String,
    file: &Path,
    offset: usize,
    limit: usize,
) -> Result<ReadResult> {
    let mut reader = LineReader::open(file).map_err(ZendeskError::io_with("open", file))?;
    let end = offset.saturating_add(limit);

    let mut window = Vec::new();
    let mut total_lines = 0usize;
    while let Some(line) = reader
        .next_line()
        .map_err(ZendeskError::io_with("read", file))?
    {
        if total_lines >= offset && total_lines < end {
            window.push(format!(
                "{}\t{}",
                total_lines + 1,
                String::from_utf8_lossy(line)
            ));
        }
        total_lines += 1;
    }

    Ok(ReadResult::Text(TextContent {
        attachment_id,
        path,
        lines_returned: window.len(),
        content: window.join("\n"),
        total_lines,
        has_more: end < total_lines,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment_store::testing::{make_tar_gz, temp_store};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn text(result: ReadResult) -> TextContent {
        match result {
            ReadResult::Text(t) => t,
            other => panic!("expected text, got {:?}", other),
        }
    }

    async fn store_lines(store: &AttachmentStore, id: u64, count: usize) {
        let body: String = (1..=count).map(|n| format!("line {}\n", n)).collect();
        store
            .store(id, body.as_bytes(), "app.log", "text/plain", "u")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_small_text_file() {
        let (_tmp, store) = temp_store();
        store.store(1, b"a\nb\nc", "f.txt", "text/plain", "u").await.unwrap();

        let result = text(store.read(1, "f.txt", 0, 2000).await.unwrap());
        assert_eq!(result.content, "1\ta\n2\tb\n3\tc");
        assert_eq!(result.lines_returned, 3);
        assert_eq!(result.total_lines, 3);
        assert!(!result.has_more);
    }

    #[tokio::test]
    async fn test_read_window_in_the_middle() {
        let (_tmp, store) = temp_store();
        store_lines(&store, 2, 10).await;

        let result = text(store.read(2, "app.log", 3, 4).await.unwrap());
        assert_eq!(result.content, "4\tline 4\n5\tline 5\n6\tline 6\n7\tline 7");
        assert_eq!(result.lines_returned, 4);
        assert_eq!(result.total_lines, 10);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn test_read_window_reaching_the_end() {
        let (_tmp, store) = temp_store();
        store_lines(&store, 3, 10).await;

        let result = text(store.read(3, "app.log", 8, 5).await.unwrap());
        assert_eq!(result.lines_returned, 2);
        assert!(!result.has_more);

        let exact = text(store.read(3, "app.log", 5, 5).await.unwrap());
        assert_eq!(exact.lines_returned, 5);
        assert!(!exact.has_more);
    }

    #[tokio::test]
    async fn test_read_offset_past_end() {
        let (_tmp, store) = temp_store();
        store_lines(&store, 4, 3).await;

        let result = text(store.read(4, "app.log", 50, 10).await.unwrap());
        assert_eq!(result.content, "");
        assert_eq!(result.lines_returned, 0);
        assert_eq!(result.total_lines, 3);
        assert!(!result.has_more);
    }

    #[tokio::test]
    async fn test_read_binary_file() {
        let (_tmp, store) = temp_store();
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a];
        store.store(5, &png, "shot.png", "image/png", "u").await.unwrap();

        match store.read(5, "shot.png", 0, 10).await.unwrap() {
            ReadResult::Binary(binary) => {
                assert_eq!(STANDARD.decode(&binary.content_base64).unwrap(), png);
                assert_eq!(binary.size, 6);
                assert_eq!(binary.content_type, "image/png");
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_serializes_without_variant_tag() {
        let (_tmp, store) = temp_store();
        store.store(6, b"x\n", "f.txt", "text/plain", "u").await.unwrap();

        let json = serde_json::to_value(store.read(6, "f.txt", 0, 10).await.unwrap()).unwrap();
        assert_eq!(json["content"], "1\tx");
        assert_eq!(json["total_lines"], 1);
        assert!(json.get("Text").is_none());
    }

    #[tokio::test]
    async fn test_read_prefers_extracted_tree() {
        let (_tmp, store) = temp_store();
        let archive = make_tar_gz(&[("logs/app.log", "one\ntwo\n")]);
        store.store(7, &archive, "a.tar.gz", "application/gzip", "u").await.unwrap();
        store.extract(7).await.unwrap();

        let result = text(store.read(7, "logs/app.log", 0, 10).await.unwrap());
        assert_eq!(result.content, "1\tone\n2\ttwo");

        let err = store.read(7, "logs", 0, 10).await.unwrap_err();
        assert!(err.to_string().contains("cannot read directory"));
    }

    #[tokio::test]
    async fn test_read_rejects_unsafe_paths() {
        let (_tmp, store) = temp_store();
        store.store(8, b"x", "f.txt", "text/plain", "u").await.unwrap();

        for bad in ["../metadata.json", "/etc/passwd", "a/../../b", ""] {
            let err = store.read(8, bad, 0, 10).await.unwrap_err();
            assert!(
                matches!(err, ZendeskError::InvalidArgument(_)),
                "{}: {:?}",
                bad,
                err
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_rejects_symlink_escape() {
        let (tmp, store) = temp_store();
        store.store(9, b"x", "f.txt", "text/plain", "u").await.unwrap();
        let secret = tmp.path().join("secret.txt");
        std::fs::write(&secret, "hidden").unwrap();
        std::os::unix::fs::symlink(&secret, store.attachment_dir(9).join("original/link.txt"))
            .unwrap();

        let err = store.read(9, "link.txt", 0, 10).await.unwrap_err();
        assert!(matches!(err, ZendeskError::InvalidArgument(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_rejects_fifo_without_blocking() {
        let (_tmp, store) = temp_store();
        store.store(12, b"x", "f.txt", "text/plain", "u").await.unwrap();
        let fifo = store.attachment_dir(12).join("original/pipe");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success(), "mkfifo exited with {}", status);

        let read = tokio::time::timeout(Duration::from_secs(5), store.read(12, "pipe", 0, 10))
            .await
            .expect("read of a FIFO must not block");
        let err = read.unwrap_err();
        assert!(matches!(err, ZendeskError::InvalidArgument(_)), "{:?}", err);
        assert!(err.to_string().contains("not a regular file"));

        let deleted = tokio::time::timeout(Duration::from_secs(5), store.delete(12))
            .await
            .expect("delete must not wait on a stuck reader");
        assert!(deleted.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_file_and_entry() {
        let (_tmp, store) = temp_store();
        store.store(10, b"x", "f.txt", "text/plain", "u").await.unwrap();

        let err = store.read(10, "nope.txt", 0, 10).await.unwrap_err();
        assert!(matches!(err, ZendeskError::NotFound { .. }));

        let err = store.read(11, "f.txt", 0, 10).await.unwrap_err();
        assert!(matches!(err, ZendeskError::NotFound { .. }));
    }
}
