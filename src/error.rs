//! Error types for the Zendesk MCP server.
//!
//! This module defines `ZendeskError`, the unified error type used throughout
//! the crate: the REST client, the attachment store, and the tool layer.
//!
//! # Security
//!
//! All error messages are sanitized to ensure credentials are never leaked
//! in logs or error responses. Use `sanitize_message()` when constructing
//! error messages from external sources.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Zendesk MCP operations.
///
/// Attachment store failures use `NotFound`, `InvalidArgument`,
/// `ExternalTool` and `Io`. The remaining variants describe the remote API.
#[derive(Error, Debug)]
pub enum ZendeskError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request failed during transmission.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// HTTP client initialization failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// HTTP response returned a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code returned.
        status: reqwest::StatusCode,
        /// The response body, potentially containing error details.
        body: String,
    },

    /// Request timed out.
    #[error("request timed out after {duration:?} - the server may be slow or unreachable")]
    Timeout {
        /// How long we waited before timing out.
        duration: Duration,
        /// The operation that timed out.
        operation: String,
    },

    /// Rate limited by the server (HTTP 429).
    #[error("rate limited by server - please wait before retrying")]
    RateLimited {
        /// Suggested retry delay, if provided by server.
        retry_after: Option<Duration>,
    },

    /// Server temporarily unavailable (HTTP 502/503/504).
    #[error("service temporarily unavailable ({status}) - will retry automatically")]
    ServiceUnavailable {
        /// The specific status code.
        status: reqwest::StatusCode,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested attachment, entry, or file was not found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was missing.
        what: String,
    },

    /// Authentication failed - likely invalid credentials.
    #[error("authentication failed - check ZENDESK_EMAIL/ZENDESK_API_TOKEN or ZENDESK_OAUTH_TOKEN")]
    Authentication,

    /// Caller supplied an argument that cannot be used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An external decompression tool could not be run or exited non-zero.
    #[error("{tool} failed ({status}): {diagnostics}")]
    ExternalTool {
        /// Program name, e.g. `tar` or `unzip`.
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured diagnostic output.
        diagnostics: String,
    },

    /// Filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done, including the path involved.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("background task failed: {0}")]
    BackgroundTask(#[from] tokio::task::JoinError),

    /// Connection test failed.
    #[error("connection test failed: {message}")]
    ConnectionTest {
        /// Details about why the connection test failed.
        message: String,
    },
}

/// Convenience alias used by the attachment store.
pub type Result<T, E = ZendeskError> = std::result::Result<T, E>;

impl ZendeskError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        ZendeskError::Config(format!(
            "missing required environment variable: {}",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ZendeskError::Config(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ZendeskError::InvalidArgument(message.into())
    }

    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        ZendeskError::NotFound { what: what.into() }
    }

    /// Creates a not found error for an attachment that is not in the cache.
    pub fn attachment_not_cached(attachment_id: u64) -> Self {
        Self::not_found(format!("attachment {} not found in cache", attachment_id))
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration, operation: impl Into<String>) -> Self {
        ZendeskError::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Wraps an I/O error with the operation and path it concerns.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        ZendeskError::Io {
            context: format!("failed to {} {}", action, path.display()),
            source,
        }
    }

    /// Returns a closure that wraps an I/O error, for use with `map_err`.
    pub fn io_with<'a>(
        action: &'a str,
        path: &'a Path,
    ) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::io(action, path, source)
    }

    /// Creates an external tool failure.
    pub fn external_tool(
        tool: impl Into<String>,
        status: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        ZendeskError::ExternalTool {
            tool: tool.into(),
            status: status.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Creates a connection test error.
    pub fn connection_test(message: impl Into<String>) -> Self {
        ZendeskError::ConnectionTest {
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the operation should be retried.
    ///
    /// Retryable errors include:
    /// - Rate limiting (HTTP 429)
    /// - Service unavailable (HTTP 502, 503, 504)
    /// - Timeouts (may succeed on retry)
    ///
    /// Attachment store errors are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ZendeskError::RateLimited { .. } => true,
            ZendeskError::ServiceUnavailable { .. } => true,
            ZendeskError::Timeout { .. } => true,
            ZendeskError::Http(e) => e.is_timeout() || e.is_connect(),
            ZendeskError::HttpStatus { status, .. } => {
                status.as_u16() == 429 || status.is_server_error()
            }
            _ => false,
        }
    }

    /// Returns true if this is a rate limit error, indicating we should back off.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ZendeskError::RateLimited { .. })
            || matches!(self, ZendeskError::HttpStatus { status, .. } if status.as_u16() == 429)
    }

    /// Returns the suggested delay before retry, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ZendeskError::RateLimited { retry_after } => *retry_after,
            ZendeskError::ServiceUnavailable { .. } => Some(Duration::from_millis(500)),
            ZendeskError::Timeout { .. } => Some(Duration::from_millis(100)),
            _ => None,
        }
    }

    /// Sanitizes an error message to remove any occurrence of a secret.
    ///
    /// Credentials must never appear in logs, error messages, or responses
    /// to users. Every non-empty secret in `secrets` is replaced with
    /// `[REDACTED]`.
    #[must_use]
    pub fn sanitize_message(message: &str, secrets: &[&str]) -> String {
        secrets
            .iter()
            .filter(|s| !s.is_empty())
            .fold(message.to_string(), |msg, secret| {
                msg.replace(secret, "[REDACTED]")
            })
    }

    /// Creates a sanitized version of this error's display message.
    #[must_use]
    pub fn sanitized_display(&self, secrets: &[&str]) -> String {
        Self::sanitize_message(&self.to_string(), secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_error() {
        let err = ZendeskError::missing_env("ZENDESK_API_TOKEN");
        assert!(err.to_string().contains("ZENDESK_API_TOKEN"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = ZendeskError::invalid_argument("cannot read directory: logs");
        assert_eq!(
            err.to_string(),
            "invalid argument: cannot read directory: logs"
        );
    }

    #[test]
    fn test_attachment_not_cached() {
        let err = ZendeskError::attachment_not_cached(12345);
        assert_eq!(
            err.to_string(),
            "not found: attachment 12345 not found in cache"
        );
    }

    #[test]
    fn test_external_tool_carries_diagnostics() {
        let err = ZendeskError::external_tool("tar", "exit status: 2", "tar: Unexpected EOF");
        let msg = err.to_string();
        assert!(msg.starts_with("tar failed"));
        assert!(msg.contains("Unexpected EOF"));
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = ZendeskError::io(
            "read",
            Path::new("/tmp/cache/1/metadata.json"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("failed to read /tmp/cache/1/metadata.json"));
    }

    #[test]
    fn test_timeout_error() {
        let err = ZendeskError::timeout(Duration::from_secs(30), "get_attachment");
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn test_is_retryable_rate_limited() {
        let err = ZendeskError::RateLimited { retry_after: None };
        assert!(err.is_retryable());
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_is_retryable_service_unavailable() {
        let err = ZendeskError::ServiceUnavailable {
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert!(err.is_retryable());
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_store_errors_are_not_retryable() {
        assert!(!ZendeskError::attachment_not_cached(1).is_retryable());
        assert!(!ZendeskError::invalid_argument("bad regex").is_retryable());
        assert!(!ZendeskError::external_tool("unzip", "exit status: 9", "").is_retryable());
    }

    #[test]
    fn test_sanitize_message_removes_secrets() {
        let token = "super_secret_token_12345";
        let message = format!("Error connecting with token {} to server", token);
        let sanitized = ZendeskError::sanitize_message(&message, &[token, "other"]);
        assert!(!sanitized.contains(token));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_message_empty_secret() {
        let message = "Some error message";
        let sanitized = ZendeskError::sanitize_message(message, &[""]);
        assert_eq!(sanitized, message);
    }

    #[test]
    fn test_retry_after_rate_limited() {
        let err = ZendeskError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_connection_test_error() {
        let err = ZendeskError::connection_test("Could not reach server");
        let msg = err.to_string();
        assert!(msg.contains("connection test failed"));
        assert!(msg.contains("Could not reach server"));
    }
}
