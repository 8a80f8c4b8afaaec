//! Fixtures shared by the store's unit tests.

use std::process::Command;

use tempfile::TempDir;

use super::{AttachmentStore, CommandExtractor, Extractor};

/// A store rooted in a fresh temp directory. Keep the `TempDir` alive for
/// the duration of the test.
pub(crate) fn temp_store() -> (TempDir, AttachmentStore) {
    temp_store_with(CommandExtractor)
}

pub(crate) fn temp_store_with<E: Extractor>(extractor: E) -> (TempDir, AttachmentStore<E>) {
    let tmp = TempDir::new().unwrap();
    let store = AttachmentStore::with_extractor(tmp.path().join("cache"), extractor);
    (tmp, store)
}

/// Builds a `.tar.gz` holding `files` (relative path, contents) with the
/// system `tar`.
pub(crate) fn make_tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    make_archive("fixture.tar.gz", files)
}

/// Builds an archive holding `files` (relative path, contents). The format
/// follows the suffix of `name`: `.zip` uses the system `zip`, the tar
/// flavours use the system `tar`.
pub(crate) fn make_archive(name: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let src = TempDir::new().unwrap();
    for (path, contents) in files {
        let full = src.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, contents).unwrap();
    }

    let out = TempDir::new().unwrap();
    let archive = out.path().join(name);
    let mut command = if name.ends_with(".zip") {
        let mut zip = Command::new("zip");
        zip.arg("-q").arg("-r").arg(&archive).current_dir(src.path());
        zip
    } else {
        let flags = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            "-czf"
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            "-cjf"
        } else {
            "-cf"
        };
        let mut tar = Command::new("tar");
        tar.arg(flags).arg(&archive).arg("-C").arg(src.path());
        tar
    };
    let status = command
        .args(files.iter().map(|(path, _)| *path))
        .status()
        .unwrap();
    assert!(status.success(), "archiver exited with {}", status);

    std::fs::read(&archive).unwrap()
}
