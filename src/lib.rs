//! # Zendesk MCP
//!
//! An MCP (Model Context Protocol) server that lets AI assistants pull
//! Zendesk ticket attachments into a local cache and analyze them.
//!
//! Support bundles and log archives are often too large to hand to a model
//! directly. This server downloads them once, unpacks archives, and offers
//! bounded operations over the result: glob listing, paged line reads and
//! grep-style regex search with context.
//!
//! ## Features
//!
//! - **Streaming downloads**: attachment bodies go straight to disk
//! - **Archive extraction**: zip, tar, tar.gz and tar.bz2 via the system tools
//! - **Bounded reads**: every read and search has a hard upper limit
//! - **Concurrency**: per-attachment reader/writer locking
//! - **Security**: credentials are never logged or exposed in error messages
//!
//! ## Architecture
//!
//! - [`config`] - Configuration loading from environment variables
//! - [`error`] - Error types with security-conscious message sanitization
//! - [`zendesk_client`] - HTTP client for the Zendesk API
//! - [`attachment_store`] - The on-disk attachment cache
//! - [`server`] - MCP server implementation with tool routing
//! - [`models`] - Data models for Zendesk API responses
//! - [`tools`] - Tool input parameter structs
//!
//! ## Configuration
//!
//! - `ZENDESK_SUBDOMAIN` or `ZENDESK_DOMAIN`: the Zendesk instance
//! - `ZENDESK_OAUTH_TOKEN`, or `ZENDESK_EMAIL` with `ZENDESK_API_TOKEN` or
//!   `ZENDESK_PASSWORD`
//!
//! Optional:
//! - `ZENDESK_ATTACHMENT_CACHE_DIR`: cache root (default
//!   `<tmp>/zendesk-attachments`)
//! - `RUST_LOG`: Log level (e.g., `zendesk_mcp=debug`)
//!
//! ## Example
//!
//! Using the [`AttachmentStore`](attachment_store::AttachmentStore) directly:
//!
//! ```ignore
//! use zendesk_mcp::attachment_store::{AttachmentStore, SearchOptions};
//!
//! async fn example() -> Result<(), zendesk_mcp::error::ZendeskError> {
//!     let store = AttachmentStore::open(None)?;
//!     store.store(42, b"boot\nERROR disk full\n", "app.log", "text/plain", "").await?;
//!
//!     let result = store.search(42, "ERROR", SearchOptions::default()).await?;
//!     for m in result.matches {
//!         println!("{}:{}: {}", m.path, m.line, m.content);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod attachment_store;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;
pub mod zendesk_client;
