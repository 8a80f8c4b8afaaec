//! Tool input parameter structs for MCP tools.
//!
//! This module defines the input types for each MCP tool, with
//! JSON Schema derivation for MCP tool discovery.
//!
//! # Input Sanitization
//!
//! Input structs with free-text fields implement `sanitize()`, which trims
//! whitespace from paths and globs. Regex patterns are left untouched since
//! whitespace in them is significant.

use rmcp::schemars::{self, JsonSchema};
use serde::Deserialize;

use crate::attachment_store::{SearchOptions, DEFAULT_LIST_PATTERN};

/// Lines returned by `read_attachment_file` when no limit is given.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Upper bound on lines returned by a single read.
pub const MAX_READ_LIMIT: usize = 10_000;

/// Upper bound on context lines per side of a search match.
pub const MAX_CONTEXT_LINES: usize = 20;

/// Upper bound on matches retained by a single search.
pub const MAX_SEARCH_RESULTS: usize = 1000;

/// Helper function to trim an optional string.
fn trim_option(s: &Option<String>) -> Option<String> {
    s.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Input for tools that only need an attachment ID.
///
/// Used by get_attachment, store_attachment, store_and_extract_attachment
/// and delete_cached_attachment.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AttachmentIdInput {
    /// The Zendesk attachment ID (from get_attachment or ticket comments).
    pub attachment_id: u64,
}

/// Input parameters for the list_attachment_files tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListAttachmentFilesInput {
    /// The attachment ID.
    pub attachment_id: u64,

    /// Glob pattern to filter paths (default: "**/*"). `*` stays within one
    /// directory; use `**` to recurse, e.g. "**/*.log".
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ListAttachmentFilesInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            attachment_id: self.attachment_id,
            pattern: trim_option(&self.pattern),
        }
    }

    /// Pattern to list with, falling back to everything.
    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_LIST_PATTERN)
    }
}

/// Input parameters for the read_attachment_file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadAttachmentFileInput {
    /// The attachment ID.
    pub attachment_id: u64,

    /// Relative path within the attachment (from list_attachment_files).
    pub path: String,

    /// Zero-based line to start from (default: 0).
    #[serde(default)]
    pub offset: Option<usize>,

    /// Maximum number of lines to return (default: 2000, max: 10000).
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReadAttachmentFileInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            attachment_id: self.attachment_id,
            path: self.path.trim().to_string(),
            offset: self.offset,
            limit: self.limit,
        }
    }

    /// Offset and limit with defaults applied and the limit capped.
    pub fn window(&self) -> (usize, usize) {
        (
            self.offset.unwrap_or(0),
            self.limit.unwrap_or(DEFAULT_READ_LIMIT).min(MAX_READ_LIMIT),
        )
    }
}

/// Input parameters for the search_attachment_files tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchAttachmentFilesInput {
    /// The attachment ID.
    pub attachment_id: u64,

    /// Regular expression to search for (Rust regex syntax).
    pub pattern: String,

    /// Glob over relative paths to search within (default: "*", which
    /// matches every file; e.g. "*.log").
    #[serde(default)]
    pub glob: Option<String>,

    /// Lines of context before and after each match (default: 2, max: 20).
    #[serde(default)]
    pub context_lines: Option<usize>,

    /// Maximum matches to return (default: 100, max: 1000).
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl SearchAttachmentFilesInput {
    /// Sanitizes input by trimming whitespace from the glob.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            glob: trim_option(&self.glob),
            ..self
        }
    }

    /// Search options with defaults applied and limits capped.
    pub fn options(&self) -> SearchOptions {
        let defaults = SearchOptions::default();
        SearchOptions {
            glob: self.glob.clone().unwrap_or(defaults.glob),
            context_lines: self
                .context_lines
                .unwrap_or(defaults.context_lines)
                .min(MAX_CONTEXT_LINES),
            max_results: self
                .max_results
                .unwrap_or(defaults.max_results)
                .min(MAX_SEARCH_RESULTS),
        }
    }
}
