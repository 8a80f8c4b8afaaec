//! HTTP client for the Zendesk Support API.
//!
//! This module provides the `ZendeskClient` struct for making authenticated
//! requests to the Zendesk REST API and for opening attachment downloads.
//!
//! # Retry Logic
//!
//! API calls automatically retry transient failures:
//! - HTTP 429 (rate limit): Exponential backoff starting at 100ms
//! - HTTP 502/503/504: Fixed 500ms delay
//! - Timeouts: Retried with backoff
//!
//! Client errors (4xx except 429) are not retried. Downloads are not
//! retried once the body has been handed to the caller.
//!
//! # Security
//!
//! Credentials are never logged. All error messages are sanitized before
//! logging. Attachment downloads go to pre-signed CDN URLs and are sent
//! without the `Authorization` header.

use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method, StatusCode};
use url::Url;

use crate::config::{Config, Credentials};
use crate::error::ZendeskError;
use crate::models::{Attachment, AttachmentResponse};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Timeout for a whole attachment download, body included.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum number of retry attempts for transient failures.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial delay for exponential backoff (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 100;

/// Delay before retrying after server error (milliseconds).
const SERVER_ERROR_DELAY_MS: u64 = 500;

/// Maximum length for HTTP error response bodies.
const MAX_ERROR_BODY_LEN: usize = 500;

/// HTTP client for the Zendesk API.
#[derive(Clone)]
pub struct ZendeskClient {
    /// The underlying HTTP client (cloning is cheap).
    http: Client,

    /// Base URL for the API (e.g., `https://acme.zendesk.com/api/v2`).
    base_url: String,

    /// Pre-computed `Authorization` header value.
    /// SECURITY: Never log this value!
    auth_header: String,

    /// Raw secret from the credentials, kept for sanitization only.
    secret: String,
}

impl ZendeskClient {
    /// Creates a new Zendesk client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ZendeskError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, ZendeskError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(ZendeskError::HttpClient)?;

        Ok(Self {
            http,
            base_url: Self::normalize_base_url(&config.base_url),
            auth_header: Self::auth_header(&config.credentials),
            secret: config.credentials.secret().to_string(),
        })
    }

    /// Ensures the base URL ends with `/api/v2`.
    fn normalize_base_url(url: &str) -> String {
        let url = url.trim_end_matches('/');
        if url.ends_with("/api/v2") {
            url.to_string()
        } else {
            format!("{}/api/v2", url)
        }
    }

    fn auth_header(credentials: &Credentials) -> String {
        match credentials {
            Credentials::OAuth { token } => format!("Bearer {}", token),
            Credentials::ApiToken { email, token } => {
                format!("Basic {}", STANDARD.encode(format!("{}/token:{}", email, token)))
            }
            Credentials::Password { email, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", email, password)))
            }
        }
    }

    /// Returns the values that must be scrubbed from any message.
    ///
    /// This should ONLY be used for sanitizing error messages, never for logging.
    pub(crate) fn secrets_for_sanitization(&self) -> [&str; 2] {
        [&self.secret, &self.auth_header]
    }

    fn sanitize(&self, message: &str) -> String {
        ZendeskError::sanitize_message(message, &self.secrets_for_sanitization())
    }

    /// Tests connectivity to the Zendesk instance.
    ///
    /// # Errors
    ///
    /// Returns `ZendeskError::ConnectionTest` if the connection fails,
    /// with details about the failure reason.
    pub async fn test_connection(&self) -> Result<(), ZendeskError> {
        tracing::debug!("Testing connection to Zendesk");

        let result: Result<serde_json::Value, ZendeskError> =
            self.request(Method::GET, "/users/me.json").await;

        match result {
            Ok(_) => {
                tracing::info!("Connection test successful");
                Ok(())
            }
            Err(ZendeskError::Authentication) => Err(ZendeskError::connection_test(
                "Authentication failed - verify ZENDESK_EMAIL/ZENDESK_API_TOKEN or ZENDESK_OAUTH_TOKEN",
            )),
            Err(ZendeskError::Timeout { duration, .. }) => {
                Err(ZendeskError::connection_test(format!(
                    "Connection timed out after {:?} - verify ZENDESK_SUBDOMAIN/ZENDESK_DOMAIN and that the server is reachable",
                    duration
                )))
            }
            Err(ZendeskError::Http(e)) => Err(ZendeskError::connection_test(format!(
                "HTTP error: {} - verify ZENDESK_SUBDOMAIN/ZENDESK_DOMAIN",
                self.sanitize(&e.to_string())
            ))),
            Err(e) => Err(ZendeskError::connection_test(
                self.sanitize(&e.to_string()),
            )),
        }
    }

    /// Executes an operation with retry logic for transient failures.
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, ZendeskError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ZendeskError>>,
    {
        let mut delay = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempts < MAX_RETRY_ATTEMPTS => {
                    let actual_delay = if e.is_rate_limit() {
                        e.retry_after().unwrap_or(delay)
                    } else if matches!(e, ZendeskError::ServiceUnavailable { .. }) {
                        Duration::from_millis(SERVER_ERROR_DELAY_MS)
                    } else {
                        delay
                    };

                    tracing::debug!(
                        operation = operation,
                        attempt = attempts,
                        max_attempts = MAX_RETRY_ATTEMPTS,
                        delay_ms = actual_delay.as_millis() as u64,
                        error = %self.sanitize(&e.to_string()),
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(actual_delay).await;

                    if e.is_rate_limit() {
                        delay *= 2;
                    }
                }
                Err(e) => {
                    if attempts > 1 {
                        tracing::debug!(
                            operation = operation,
                            attempts = attempts,
                            "All retry attempts exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Makes a single authenticated API request without retry.
    async fn request_inner<T>(&self, method: Method, path: &str) -> Result<T, ZendeskError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(method = %method, path = %path, "Making Zendesk API request");

        let response = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    return ZendeskError::timeout(
                        Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                        format!("{} {}", method, path),
                    );
                }
                ZendeskError::Http(e)
            })?;
        let status = response.status();

        if !status.is_success() {
            return Err(self.handle_http_error(status, response).await);
        }

        let body = response.text().await.map_err(ZendeskError::Http)?;
        tracing::trace!(bytes = body.len(), "Zendesk API response");

        serde_json::from_str(&body).map_err(ZendeskError::Serialization)
    }

    /// Makes an API request with automatic retry for transient failures.
    async fn request<T>(&self, method: Method, path: &str) -> Result<T, ZendeskError>
    where
        T: serde::de::DeserializeOwned,
    {
        let operation = format!("{} {}", method, path);
        self.with_retry(&operation, || self.request_inner(method.clone(), path))
            .await
    }

    /// Converts a non-success response into a `ZendeskError`.
    async fn handle_http_error(
        &self,
        status: StatusCode,
        response: reqwest::Response,
    ) -> ZendeskError {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = self.sanitize(&response.text().await.unwrap_or_default());
        let body = match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
            Some((cut, _)) => format!("{}...[truncated]", &body[..cut]),
            None => body,
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ZendeskError::Authentication,
            StatusCode::NOT_FOUND => ZendeskError::not_found("resource"),
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("Rate limited by Zendesk");
                ZendeskError::RateLimited { retry_after }
            }
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                tracing::warn!(status = %status, "Zendesk temporarily unavailable");
                ZendeskError::ServiceUnavailable { status }
            }
            _ => ZendeskError::HttpStatus { status, body },
        }
    }

    /// Fetches attachment metadata, including the pre-signed `content_url`.
    ///
    /// # Errors
    ///
    /// Returns `ZendeskError::NotFound` if the attachment doesn't exist.
    pub async fn get_attachment(&self, id: u64) -> Result<Attachment, ZendeskError> {
        let path = format!("/attachments/{}.json", id);

        let response: AttachmentResponse =
            self.request(Method::GET, &path).await.map_err(|e| {
                if matches!(e, ZendeskError::NotFound { .. }) {
                    ZendeskError::not_found(format!("attachment {}", id))
                } else {
                    e
                }
            })?;

        Ok(response.attachment)
    }

    /// Opens a download of an attachment's content.
    ///
    /// The request is unauthenticated and follows redirects. On success the
    /// response is returned with its body unread so the caller can stream
    /// it to disk.
    ///
    /// # Errors
    ///
    /// Returns `ZendeskError::InvalidArgument` for URLs that are not
    /// `http`/`https`, and the usual HTTP errors otherwise.
    pub async fn open_download(
        &self,
        content_url: &str,
    ) -> Result<reqwest::Response, ZendeskError> {
        let url = Url::parse(content_url).map_err(|e| {
            ZendeskError::invalid_argument(format!("invalid content URL: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ZendeskError::invalid_argument(format!(
                "unsupported content URL scheme: {}",
                url.scheme()
            )));
        }

        tracing::debug!(host = url.host_str().unwrap_or_default(), "Opening attachment download");

        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    return ZendeskError::timeout(DOWNLOAD_TIMEOUT, "attachment download");
                }
                ZendeskError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_http_error(status, response).await);
        }
        Ok(response)
    }
}
