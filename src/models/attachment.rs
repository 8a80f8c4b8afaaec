//! Attachment models for the Zendesk Support API.
//!
//! `GET /api/v2/attachments/{id}.json` returns `{"attachment": {...}}`.
//! Only the fields the server acts on are typed; everything else is kept
//! in `extra` so the full record can be handed back to callers.

use serde::{Deserialize, Serialize};

/// A file attached to a ticket comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment ID.
    pub id: u64,

    /// Original filename as uploaded.
    #[serde(default)]
    pub file_name: Option<String>,

    /// Pre-signed download URL.
    #[serde(default)]
    pub content_url: Option<String>,

    /// MIME type reported by Zendesk.
    #[serde(default)]
    pub content_type: Option<String>,

    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,

    /// Remaining fields (thumbnails, malware scan result, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Attachment {
    /// Filename to store the blob under, falling back to `attachment-{id}`.
    pub fn file_name_or_default(&self) -> String {
        self.file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("attachment-{}", self.id))
    }

    /// Content type, falling back to `application/octet-stream`.
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream")
    }
}

/// Response wrapper for the show-attachment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentResponse {
    /// The attachment record.
    pub attachment: Attachment,
}
