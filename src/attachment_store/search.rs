//! Regex search over the text files of an entry's active tree.

use std::collections::VecDeque;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use super::content::{classify, ContentKind, LineReader};
use super::listing::relative_path;
use super::AttachmentStore;
use crate::error::{Result, ZendeskError};

/// Upper bound on compiled regex size, so hostile patterns fail fast.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Tuning knobs for [`AttachmentStore::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Glob over relative paths; `*` also matches `/`.
    pub glob: String,
    /// Lines of context captured on each side of a match.
    pub context_lines: usize,
    /// Matches retained in the result; counting continues past it.
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            glob: "*".to_string(),
            context_lines: 2,
            max_results: 100,
        }
    }
}

impl SearchOptions {
    /// Sets the file glob.
    pub fn with_glob(mut self, glob: impl Into<String>) -> Self {
        self.glob = glob.into();
        self
    }

    /// Sets the number of context lines.
    pub fn with_context_lines(mut self, context_lines: usize) -> Self {
        self.context_lines = context_lines;
        self
    }

    /// Sets the number of matches retained.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// File path relative to the tree.
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    /// The matching line.
    pub content: String,
    /// Up to `context_lines` preceding lines.
    pub context_before: Vec<String>,
    /// Up to `context_lines` following lines.
    pub context_after: Vec<String>,
}

/// Outcome of [`AttachmentStore::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Attachment ID.
    pub attachment_id: u64,
    /// Retained matches in path, then line, order.
    pub matches: Vec<SearchMatch>,
    /// Every match found, including those past `max_results`.
    pub total_matches: usize,
    /// Text files that passed the glob.
    pub files_searched: usize,
    /// True when `total_matches` exceeds the retained count.
    pub truncated: bool,
}

impl<E> AttachmentStore<E> {
    /// Searches text files in the active tree, in path order.
    ///
    /// The pattern and glob are validated before the entry is looked at, so
    /// a bad pattern is reported even for an uncached ID.
    pub async fn search(
        &self,
        attachment_id: u64,
        pattern: &str,
        options: SearchOptions,
    ) -> Result<SearchResult> {
        let regex = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| ZendeskError::invalid_argument(format!("invalid regex pattern: {}", e)))?;
        let glob = search_matcher(&options.glob)?;

        let guard = self.locks().read(attachment_id).await;
        let entry = self.entry(attachment_id);
        if !entry.dir().is_dir() {
            return Err(ZendeskError::attachment_not_cached(attachment_id));
        }
        let tree = entry.active_tree().ok_or_else(|| {
            ZendeskError::not_found(format!("no files found for attachment {}", attachment_id))
        })?;

        tracing::debug!(attachment_id, pattern, glob = %options.glob, "Searching attachment");

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            search_tree(attachment_id, &tree, &regex, &glob, &options)
        })
        .await?
    }
}

/// Compiles a search glob, where `*` matches across directories.
fn search_matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ZendeskError::invalid_argument(format!("invalid glob pattern: {}", e)))
}

fn search_tree(
    attachment_id: u64,
    tree: &Path,
    regex: &Regex,
    glob: &GlobMatcher,
    options: &SearchOptions,
) -> Result<SearchResult> {
    let mut scan = Scan {
        regex,
        context_lines: options.context_lines,
        max_results: options.max_results,
        matches: Vec::new(),
        total_matches: 0,
    };
    let mut files_searched = 0;

    for item in WalkDir::new(tree).min_depth(1).sort_by_file_name() {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(tree).to_path_buf();
            ZendeskError::io("walk", &path, e.into())
        })?;
        if !item.file_type().is_file() {
            continue;
        }
        let Some(path) = relative_path(tree, item.path()) else {
            continue;
        };
        if !glob.is_match(&path) {
            continue;
        }
        if classify(item.path()) != ContentKind::Text {
            continue;
        }

        files_searched += 1;
        scan.file(item.path(), &path);
    }

    Ok(SearchResult {
        attachment_id,
        truncated: scan.total_matches > scan.max_results,
        total_matches: scan.total_matches,
        matches: scan.matches,
        files_searched,
    })
}

struct Scan<'a> {
    regex: &'a Regex,
    context_lines: usize,
    max_results: usize,
    matches: Vec<SearchMatch>,
    total_matches: usize,
}

impl Scan<'_> {
    /// Scans one file line by line, keeping only `context_lines` of history.
    fn file(&mut self, file: &Path, path: &str) {
        let mut reader = match LineReader::open(file) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::debug!(path, error = %e, "Skipping unreadable file");
                return;
            }
        };

        let mut before: VecDeque<String> = VecDeque::new();
        // (index into self.matches, lines still wanted)
        let mut pending: Vec<(usize, usize)> = Vec::new();
        let mut line_number = 0;

        loop {
            let line = match reader.next_line() {
                Ok(Some(line)) => String::from_utf8_lossy(line).into_owned(),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(path, error = %e, "Stopped reading file");
                    break;
                }
            };
            line_number += 1;

            for (index, wanted) in pending.iter_mut() {
                self.matches[*index].context_after.push(line.clone());
                *wanted -= 1;
            }
            pending.retain(|&(_, wanted)| wanted > 0);

            if self.regex.is_match(&line) {
                self.total_matches += 1;
                if self.matches.len() < self.max_results {
                    if self.context_lines > 0 {
                        pending.push((self.matches.len(), self.context_lines));
                    }
                    self.matches.push(SearchMatch {
                        path: path.to_string(),
                        line: line_number,
                        content: line.clone(),
                        context_before: before.iter().cloned().collect(),
                        context_after: Vec::new(),
                    });
                }
            }

            before.push_back(line);
            if before.len() > self.context_lines {
                before.pop_front();
            }
        }
    }
}
