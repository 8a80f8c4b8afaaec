//! MCP server implementation for the Zendesk attachment tools.
//!
//! This module defines the `ZendeskServer` struct that implements the MCP
//! `ServerHandler` trait, exposing attachment metadata lookups and the
//! on-disk attachment cache as tools.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Serialize;

use crate::attachment_store::{AttachmentStore, Download, FileEntry, Metadata};
use crate::error::ZendeskError;
use crate::tools::{
    AttachmentIdInput, ListAttachmentFilesInput, ReadAttachmentFileInput,
    SearchAttachmentFilesInput,
};
use crate::zendesk_client::ZendeskClient;

/// Files reported by `store_and_extract_attachment`.
const MAX_LISTED_FILES: usize = 50;

/// The Zendesk MCP server.
#[derive(Clone)]
pub struct ZendeskServer {
    /// Zendesk API client.
    client: ZendeskClient,
    /// Local attachment cache.
    store: AttachmentStore,
    /// Tool router for MCP tool dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ZendeskServer {
    /// Creates a new server instance.
    pub fn new(client: ZendeskClient, store: AttachmentStore) -> Self {
        Self {
            client,
            store,
            tool_router: Self::tool_router(),
        }
    }

    /// A simple ping tool to verify the server is running.
    #[tool(description = "Test connectivity to the Zendesk MCP server. Returns 'pong' if the server is running correctly.")]
    fn ping(&self) -> String {
        tracing::debug!("ping tool called");
        "pong".to_string()
    }

    /// Fetches the attachment record from the Zendesk API.
    ///
    /// Always goes to the network; the cache is not consulted.
    #[tool(description = "Get attachment metadata by ID from Zendesk, including file name, size, content type and the download URL.")]
    async fn get_attachment(
        &self,
        Parameters(input): Parameters<AttachmentIdInput>,
    ) -> Result<String, String> {
        let id = input.attachment_id;
        tracing::debug!(attachment_id = id, "get_attachment tool called");

        let attachment = self
            .client
            .get_attachment(id)
            .await
            .map_err(|e| self.tool_error("get attachment", id, &e))?;

        to_json(&serde_json::json!({ "attachment": attachment }))
    }

    /// Caches an attachment on disk, downloading it only when absent.
    #[tool(description = "Download a Zendesk attachment and cache it on the server. Returns immediately with from_cache=true if it is already cached. Use get_attachment or ticket comments to find the attachment_id.")]
    async fn store_attachment(
        &self,
        Parameters(input): Parameters<AttachmentIdInput>,
    ) -> Result<String, String> {
        let id = input.attachment_id;
        tracing::debug!(attachment_id = id, "store_attachment tool called");

        let (metadata, from_cache) = self
            .ensure_cached(id)
            .await
            .map_err(|e| self.tool_error("store attachment", id, &e))?;

        to_json(&StoreSummary::new(&metadata, from_cache))
    }

    /// Caches an attachment and unpacks it if it is an archive.
    #[tool(description = "Download an archive attachment (.zip, .tar, .tar.gz, .tgz, .tar.bz2, .tbz2), cache it and extract it on the server. Returns the file count and the first 50 files. Then use list_attachment_files, read_attachment_file and search_attachment_files.")]
    async fn store_and_extract_attachment(
        &self,
        Parameters(input): Parameters<AttachmentIdInput>,
    ) -> Result<String, String> {
        let id = input.attachment_id;
        tracing::debug!(attachment_id = id, "store_and_extract_attachment tool called");

        let (_, blob_from_cache) = self
            .ensure_cached(id)
            .await
            .map_err(|e| self.tool_error("store attachment", id, &e))?;

        let result = self
            .store
            .extract(id)
            .await
            .map_err(|e| self.tool_error("extract attachment", id, &e))?;

        if !result.extracted {
            return to_json(&NotExtractedSummary {
                attachment_id: id,
                filename: result.filename,
                extracted: false,
                message: result
                    .message
                    .unwrap_or_else(|| "not an archive".to_string()),
                from_cache: blob_from_cache,
            });
        }

        let files: Vec<FileSummary> = result
            .files
            .unwrap_or_default()
            .into_iter()
            .filter(FileEntry::is_file)
            .map(FileSummary::from)
            .collect();

        to_json(&ExtractedSummary {
            attachment_id: id,
            filename: result.filename,
            extracted: true,
            file_count: files.len(),
            files: files.into_iter().take(MAX_LISTED_FILES).collect(),
            from_cache: result.already_extracted,
        })
    }

    /// Lists the active tree of a cached attachment.
    #[tool(description = "List files in a cached attachment. For extracted archives this lists the archive contents. Glob examples: '*.log' (top level only), '**/*.log' (any depth). Default '**/*' lists everything.")]
    async fn list_attachment_files(
        &self,
        Parameters(input): Parameters<ListAttachmentFilesInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        let id = input.attachment_id;
        tracing::debug!(
            attachment_id = id,
            pattern = input.pattern(),
            "list_attachment_files tool called"
        );

        let files = self
            .store
            .list(id, input.pattern())
            .await
            .map_err(|e| self.tool_error("list files", id, &e))?;

        to_json(&serde_json::json!({
            "attachment_id": id,
            "total": files.len(),
            "files": files,
        }))
    }

    /// Reads one file from a cached attachment.
    ///
    /// Text comes back as a numbered line window, binaries as base64.
    #[tool(description = "Read a file within a cached attachment. Text files return numbered lines starting at 'offset' (0-indexed, default 0), at most 'limit' lines (default 2000, max 10000); check has_more to page. Binary files are returned whole as base64.")]
    async fn read_attachment_file(
        &self,
        Parameters(input): Parameters<ReadAttachmentFileInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        let id = input.attachment_id;
        let (offset, limit) = input.window();
        tracing::debug!(
            attachment_id = id,
            path = %input.path,
            offset,
            limit,
            "read_attachment_file tool called"
        );

        let result = self
            .store
            .read(id, &input.path, offset, limit)
            .await
            .map_err(|e| self.tool_error("read file", id, &e))?;

        to_json(&result)
    }

    /// Greps the text files of a cached attachment.
    #[tool(description = "Search text files in a cached attachment with a regular expression, like grep. 'glob' filters files by relative path (default '*' searches every file). Returns matches with surrounding context lines (default 2, max 20), up to max_results (default 100, max 1000).")]
    async fn search_attachment_files(
        &self,
        Parameters(input): Parameters<SearchAttachmentFilesInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        let id = input.attachment_id;
        let options = input.options();
        tracing::debug!(attachment_id = id, ?options, "search_attachment_files tool called");

        let result = self
            .store
            .search(id, &input.pattern, options)
            .await
            .map_err(|e| self.tool_error("search files", id, &e))?;

        to_json(&result)
    }

    /// Removes a cached attachment from disk.
    #[tool(description = "Delete a cached attachment and any extracted files to free disk space.")]
    async fn delete_cached_attachment(
        &self,
        Parameters(input): Parameters<AttachmentIdInput>,
    ) -> Result<String, String> {
        let id = input.attachment_id;
        tracing::debug!(attachment_id = id, "delete_cached_attachment tool called");

        let deleted = self
            .store
            .delete(id)
            .await
            .map_err(|e| self.tool_error("delete attachment", id, &e))?;

        to_json(&serde_json::json!({ "attachment_id": id, "deleted": deleted }))
    }

    /// Returns cached metadata, or downloads the attachment into the cache.
    /// The flag is true when nothing was downloaded.
    async fn ensure_cached(&self, id: u64) -> Result<(Metadata, bool), ZendeskError> {
        if let Some(metadata) = self.store.get_metadata(id).await? {
            tracing::debug!(attachment_id = id, "Attachment served from cache");
            return Ok((metadata, true));
        }

        self.store
            .get_or_download(id, || self.open_attachment(id))
            .await
    }

    /// Looks up the attachment record and opens its download.
    async fn open_attachment(&self, id: u64) -> Result<Download, ZendeskError> {
        let attachment = self.client.get_attachment(id).await?;
        let content_url = attachment
            .content_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ZendeskError::not_found(format!("content_url for attachment {}", id))
            })?
            .to_string();

        let body = self.client.open_download(&content_url).await?;
        Ok(Download {
            filename: attachment.file_name_or_default(),
            content_type: attachment.content_type_or_default().to_string(),
            content_url,
            body,
        })
    }

    /// Logs a failure and turns it into a sanitized tool error message.
    fn tool_error(&self, action: &str, attachment_id: u64, error: &ZendeskError) -> String {
        let sanitized = error.sanitized_display(&self.client.secrets_for_sanitization());
        tracing::error!(error = %sanitized, attachment_id, "Failed to {}", action);
        format!("Failed to {} for attachment {}: {}", action, attachment_id, sanitized)
    }
}

#[tool_handler]
impl ServerHandler for ZendeskServer {
    /// Returns server information for the MCP initialize handshake.
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Zendesk attachment analysis. Use get_attachment for metadata, \
                 store_attachment to cache a file or store_and_extract_attachment \
                 to unpack an archive. Then explore it with list_attachment_files, \
                 read_attachment_file and search_attachment_files. Free space with \
                 delete_cached_attachment. Start with 'ping' to verify connectivity."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct StoreSummary {
    attachment_id: u64,
    filename: String,
    size: u64,
    content_type: String,
    from_cache: bool,
}

impl StoreSummary {
    fn new(metadata: &Metadata, from_cache: bool) -> Self {
        Self {
            attachment_id: metadata.attachment_id,
            filename: metadata.filename.clone(),
            size: metadata.size,
            content_type: metadata.content_type.clone(),
            from_cache,
        }
    }
}

#[derive(Debug, Serialize)]
struct FileSummary {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

impl From<FileEntry> for FileSummary {
    fn from(entry: FileEntry) -> Self {
        Self {
            path: entry.path,
            size: entry.size,
        }
    }
}

#[derive(Debug, Serialize)]
struct ExtractedSummary {
    attachment_id: u64,
    filename: String,
    extracted: bool,
    file_count: usize,
    files: Vec<FileSummary>,
    from_cache: bool,
}

#[derive(Debug, Serialize)]
struct NotExtractedSummary {
    attachment_id: u64,
    filename: String,
    extracted: bool,
    message: String,
    from_cache: bool,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialize tool response");
        format!("Failed to serialize response: {}", e)
    })
}
