//! Archive detection and extraction into an entry's `extracted/` tree.
//!
//! Extraction writes into a private staging directory and renames it to
//! `extracted/` only after the tool succeeds, so `extracted/` is either
//! absent or complete.

use std::ffi::OsString;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use serde::Serialize;
use tokio::fs;
use tokio::process::Command;

use super::blob::{read_metadata, remove_dir_if_exists};
use super::listing::{list_tree, FileEntry, DEFAULT_LIST_PATTERN};
use super::AttachmentStore;
use crate::error::{Result, ZendeskError};

/// Archive formats the store knows how to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz` / `.tgz`
    TarGzip,
    /// `.tar.bz2` / `.tbz2`
    TarBzip2,
    /// `.tar`
    Tar,
}

/// Filename suffixes, matched case-insensitively.
const ARCHIVE_SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.gz", ArchiveKind::TarGzip),
    (".tgz", ArchiveKind::TarGzip),
    (".tar.bz2", ArchiveKind::TarBzip2),
    (".tbz2", ArchiveKind::TarBzip2),
    (".tar", ArchiveKind::Tar),
    (".zip", ArchiveKind::Zip),
];

/// One argument of an invocation template.
#[derive(Debug, Clone, Copy)]
enum Arg {
    Literal(&'static str),
    Archive,
    Destination,
}

/// How to run the external tool for an archive kind.
#[derive(Debug)]
struct Invocation {
    program: &'static str,
    args: &'static [Arg],
}

const UNZIP: Invocation = Invocation {
    program: "unzip",
    args: &[Arg::Literal("-q"), Arg::Archive, Arg::Literal("-d"), Arg::Destination],
};

const TAR_GZIP: Invocation = Invocation {
    program: "tar",
    args: &[Arg::Literal("-xzf"), Arg::Archive, Arg::Literal("-C"), Arg::Destination],
};

const TAR_BZIP2: Invocation = Invocation {
    program: "tar",
    args: &[Arg::Literal("-xjf"), Arg::Archive, Arg::Literal("-C"), Arg::Destination],
};

const TAR: Invocation = Invocation {
    program: "tar",
    args: &[Arg::Literal("-xf"), Arg::Archive, Arg::Literal("-C"), Arg::Destination],
};

impl ArchiveKind {
    /// Detects the archive kind from a filename suffix.
    pub fn detect(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        ARCHIVE_SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|&(_, kind)| kind)
    }

    fn invocation(self) -> &'static Invocation {
        match self {
            ArchiveKind::Zip => &UNZIP,
            ArchiveKind::TarGzip => &TAR_GZIP,
            ArchiveKind::TarBzip2 => &TAR_BZIP2,
            ArchiveKind::Tar => &TAR,
        }
    }
}

impl Invocation {
    fn render(&self, archive: &Path, destination: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(s) => OsString::from(s),
                Arg::Archive => archive.as_os_str().to_owned(),
                Arg::Destination => destination.as_os_str().to_owned(),
            })
            .collect()
    }
}

/// Unpacks an archive into an existing, empty directory.
///
/// Implementations report any failure as an error; the store takes care of
/// staging and cleanup.
pub trait Extractor: Send + Sync + 'static {
    /// Extracts `archive` of the given kind into `destination`.
    fn extract(
        &self,
        kind: ArchiveKind,
        archive: &Path,
        destination: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Runs the system `unzip`/`tar` tools as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExtractor;

impl Extractor for CommandExtractor {
    async fn extract(&self, kind: ArchiveKind, archive: &Path, destination: &Path) -> Result<()> {
        let invocation = kind.invocation();
        let args = invocation.render(archive, destination);

        tracing::debug!(program = invocation.program, ?args, "Running extraction tool");

        let output = Command::new(invocation.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ZendeskError::external_tool(invocation.program, "failed to launch", e.to_string())
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostics = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        Err(ZendeskError::external_tool(
            invocation.program,
            output.status.to_string(),
            diagnostics,
        ))
    }
}

/// Outcome of [`AttachmentStore::extract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    /// Attachment ID.
    pub attachment_id: u64,
    /// Name of the raw blob.
    pub filename: String,
    /// Whether an extracted tree now exists.
    pub extracted: bool,
    /// True when the tree existed before this call and was reused.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_extracted: bool,
    /// Explanation when nothing was extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number of regular files in the tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    /// Everything in the tree, files and directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
}

impl ExtractionResult {
    fn not_an_archive(attachment_id: u64, filename: String) -> Self {
        Self {
            attachment_id,
            filename,
            extracted: false,
            already_extracted: false,
            message: Some("not an archive".to_string()),
            file_count: None,
            files: None,
        }
    }

    fn with_files(
        attachment_id: u64,
        filename: String,
        files: Vec<FileEntry>,
        already_extracted: bool,
    ) -> Self {
        Self {
            attachment_id,
            filename,
            extracted: true,
            already_extracted,
            message: None,
            file_count: Some(files.iter().filter(|f| f.is_file()).count()),
            files: Some(files),
        }
    }
}

impl<E> AttachmentStore<E> {
    /// Returns true once a complete `extracted/` tree exists for the ID.
    pub fn is_extracted(&self, attachment_id: u64) -> bool {
        self.entry(attachment_id).extracted_dir().is_dir()
    }
}

impl<E: Extractor> AttachmentStore<E> {
    /// Extracts a cached archive.
    ///
    /// Non-archive filenames yield `extracted: false`. An entry that is
    /// already extracted is not extracted again; its current listing is
    /// returned with `already_extracted: true`.
    pub async fn extract(&self, attachment_id: u64) -> Result<ExtractionResult> {
        let _guard = self.locks().write(attachment_id).await;
        let entry = self.entry(attachment_id);

        let metadata = read_metadata(&entry)
            .await?
            .ok_or_else(|| ZendeskError::attachment_not_cached(attachment_id))?;
        let filename = metadata.filename;

        let archive = entry.original_dir().join(&filename);
        if !archive.is_file() {
            return Err(ZendeskError::not_found(format!(
                "original file for attachment {} is missing",
                attachment_id
            )));
        }

        let Some(kind) = ArchiveKind::detect(&filename) else {
            tracing::debug!(
                attachment_id,
                filename = %filename,
                "Not an archive, skipping extraction"
            );
            return Ok(ExtractionResult::not_an_archive(attachment_id, filename));
        };

        let extracted = entry.extracted_dir();
        if extracted.is_dir() {
            let files = list_all(extracted).await?;
            return Ok(ExtractionResult::with_files(attachment_id, filename, files, true));
        }

        let staging = entry.staging_dir();
        remove_dir_if_exists(&staging).await?;
        fs::create_dir_all(&staging)
            .await
            .map_err(ZendeskError::io_with("create", &staging))?;

        tracing::info!(attachment_id, filename = %filename, ?kind, "Extracting attachment");

        if let Err(e) = self.extractor().extract(kind, &archive, &staging).await {
            tracing::warn!(attachment_id, error = %e, "Extraction failed");
            if let Err(cleanup) = remove_dir_if_exists(&staging).await {
                tracing::warn!(
                    attachment_id,
                    error = %cleanup,
                    "Could not remove staging directory"
                );
            }
            return Err(e);
        }

        fs::rename(&staging, &extracted)
            .await
            .map_err(ZendeskError::io_with("publish", &extracted))?;

        let files = list_all(extracted).await?;
        let result = ExtractionResult::with_files(attachment_id, filename, files, false);
        tracing::info!(
            attachment_id,
            file_count = result.file_count.unwrap_or_default(),
            "Extraction complete"
        );
        Ok(result)
    }
}

async fn list_all(tree: std::path::PathBuf) -> Result<Vec<FileEntry>> {
    tokio::task::spawn_blocking(move || list_tree(&tree, DEFAULT_LIST_PATTERN)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment_store::testing::{
        make_archive, make_tar_gz, temp_store, temp_store_with,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_archive_kinds() {
        assert_eq!(ArchiveKind::detect("logs.tar.gz"), Some(ArchiveKind::TarGzip));
        assert_eq!(ArchiveKind::detect("LOGS.TGZ"), Some(ArchiveKind::TarGzip));
        assert_eq!(ArchiveKind::detect("a.tar.bz2"), Some(ArchiveKind::TarBzip2));
        assert_eq!(ArchiveKind::detect("a.tbz2"), Some(ArchiveKind::TarBzip2));
        assert_eq!(ArchiveKind::detect("a.tar"), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect("Bundle.Zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("a.gz"), None);
        assert_eq!(ArchiveKind::detect("a.tar.xz"), None);
        assert_eq!(ArchiveKind::detect("notes.txt"), None);
    }

    #[test]
    fn test_invocation_render() {
        let args = ArchiveKind::TarGzip
            .invocation()
            .render(Path::new("/c/1/original/a.tgz"), Path::new("/c/1/.extracting"));
        assert_eq!(
            args,
            vec![
                OsString::from("-xzf"),
                OsString::from("/c/1/original/a.tgz"),
                OsString::from("-C"),
                OsString::from("/c/1/.extracting"),
            ]
        );
        assert_eq!(ArchiveKind::Zip.invocation().program, "unzip");
    }

    #[test]
    fn test_invocation_render_every_kind() {
        let rendered = |kind: ArchiveKind| {
            let invocation = kind.invocation();
            let mut line = vec![invocation.program.to_string()];
            line.extend(
                invocation
                    .render(Path::new("/a"), Path::new("/d"))
                    .into_iter()
                    .map(|arg| arg.to_string_lossy().into_owned()),
            );
            line.join(" ")
        };

        assert_eq!(rendered(ArchiveKind::Zip), "unzip -q /a -d /d");
        assert_eq!(rendered(ArchiveKind::TarGzip), "tar -xzf /a -C /d");
        assert_eq!(rendered(ArchiveKind::TarBzip2), "tar -xjf /a -C /d");
        assert_eq!(rendered(ArchiveKind::Tar), "tar -xf /a -C /d");
    }

    async fn assert_extracts(id: u64, name: &str, content_type: &str) {
        let (_tmp, store) = temp_store();
        let archive = make_archive(name, &[("top.txt", "top\n"), ("nested/deep.log", "deep\n")]);
        store.store(id, &archive, name, content_type, "u").await.unwrap();

        let result = store.extract(id).await.unwrap();
        assert!(result.extracted, "{} was not extracted", name);
        assert_eq!(result.file_count, Some(2), "{}", name);

        let mut files: Vec<String> = result
            .files
            .unwrap()
            .into_iter()
            .filter(FileEntry::is_file)
            .map(|f| f.path)
            .collect();
        files.sort();
        assert_eq!(files, vec!["nested/deep.log".to_string(), "top.txt".to_string()]);
        assert_eq!(
            std::fs::read_to_string(store.attachment_dir(id).join("extracted/nested/deep.log"))
                .unwrap(),
            "deep\n"
        );
    }

    #[tokio::test]
    async fn test_extract_zip() {
        assert_extracts(17, "bundle.zip", "application/zip").await;
    }

    #[tokio::test]
    async fn test_extract_plain_tar() {
        assert_extracts(18, "bundle.tar", "application/x-tar").await;
    }

    #[tokio::test]
    async fn test_extract_tar_bz2() {
        assert_extracts(19, "bundle.tar.bz2", "application/x-bzip2").await;
        assert_extracts(20, "bundle.tbz2", "application/x-bzip2").await;
    }

    #[tokio::test]
    async fn test_extract_tar_gz() {
        let (_tmp, store) = temp_store();
        let archive = make_tar_gz(&[
            ("a.txt", "alpha\n"),
            ("dir/b.log", "beta\n"),
            ("dir/c.log", "gamma\n"),
        ]);
        store
            .store(10, &archive, "bundle.tar.gz", "application/gzip", "u")
            .await
            .unwrap();
        assert!(!store.is_extracted(10));

        let result = store.extract(10).await.unwrap();
        assert!(result.extracted);
        assert!(!result.already_extracted);
        assert_eq!(result.file_count, Some(3));
        assert!(store.is_extracted(10));
        assert!(!store.attachment_dir(10).join(".extracting").exists());

        let files = result.files.unwrap();
        assert!(files.iter().any(|f| f.path == "dir/b.log" && f.is_file()));
        assert!(files.iter().any(|f| f.path == "dir" && !f.is_file()));
    }

    #[tokio::test]
    async fn test_extract_twice_reuses_tree() {
        let (_tmp, store) = temp_store();
        let archive = make_tar_gz(&[("a.txt", "alpha\n")]);
        store.store(11, &archive, "a.tgz", "application/gzip", "u").await.unwrap();

        let first = store.extract(11).await.unwrap();
        let second = store.extract(11).await.unwrap();
        assert!(second.already_extracted);
        assert_eq!(first.files, second.files);
    }

    #[tokio::test]
    async fn test_extract_non_archive() {
        let (_tmp, store) = temp_store();
        store.store(12, b"plain", "notes.txt", "text/plain", "u").await.unwrap();

        let result = store.extract(12).await.unwrap();
        assert!(!result.extracted);
        assert_eq!(result.message.as_deref(), Some("not an archive"));
        assert!(!store.is_extracted(12));
    }

    #[tokio::test]
    async fn test_extract_uncached_is_not_found() {
        let (_tmp, store) = temp_store();
        let err = store.extract(13).await.unwrap_err();
        assert!(matches!(err, ZendeskError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_extract_missing_blob_is_not_found() {
        let (_tmp, store) = temp_store();
        store.store(14, b"x", "a.tar", "application/x-tar", "u").await.unwrap();
        std::fs::remove_file(store.attachment_dir(14).join("original/a.tar")).unwrap();

        let err = store.extract(14).await.unwrap_err();
        assert!(matches!(err, ZendeskError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_archive_surfaces_tool_failure() {
        let (_tmp, store) = temp_store();
        store
            .store(15, b"this is not gzip", "broken.tar.gz", "application/gzip", "u")
            .await
            .unwrap();

        let err = store.extract(15).await.unwrap_err();
        match err {
            ZendeskError::ExternalTool { tool, .. } => assert_eq!(tool, "tar"),
            other => panic!("expected tool failure, got {:?}", other),
        }
        assert!(!store.is_extracted(15));
        assert!(!store.attachment_dir(15).join(".extracting").exists());
    }

    /// Writes one file, then fails, like a tool dying halfway through.
    struct HalfwayExtractor;

    impl Extractor for HalfwayExtractor {
        async fn extract(
            &self,
            _kind: ArchiveKind,
            _archive: &Path,
            destination: &Path,
        ) -> Result<()> {
            std::fs::write(destination.join("partial.txt"), "half").unwrap();
            Err(ZendeskError::external_tool("fake", "exit status: 1", "disk full"))
        }
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_no_partial_tree() {
        let (_tmp, store) = temp_store_with(HalfwayExtractor);
        store.store(16, b"x", "a.zip", "application/zip", "u").await.unwrap();

        let err = store.extract(16).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(!store.is_extracted(16));
        assert!(!store.attachment_dir(16).join(".extracting").exists());

        // Listing still shows the raw blob.
        let files = store.list(16, "**/*").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.zip");
    }
}
