//! zendesk-mcp - MCP server for Zendesk attachment analysis
//!
//! This binary runs as an MCP server using stdio transport, allowing an
//! MCP client to cache, unpack, read and search Zendesk attachments.
//!
//! # Configuration
//!
//! Set the following environment variables (or use a `.env` file):
//!
//! - `ZENDESK_SUBDOMAIN` or `ZENDESK_DOMAIN`
//! - `ZENDESK_OAUTH_TOKEN`, or `ZENDESK_EMAIL` with `ZENDESK_API_TOKEN`
//! - `ZENDESK_ATTACHMENT_CACHE_DIR` (optional)
//!
//! # Usage
//!
//! ```bash
//! ZENDESK_SUBDOMAIN=acme ZENDESK_EMAIL=agent@acme.com ZENDESK_API_TOKEN=xxx ./zendesk-mcp
//! ```

use anyhow::{Context, Result};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{fmt, EnvFilter};

use zendesk_mcp::{attachment_store::AttachmentStore, config, server, zendesk_client};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout is reserved for MCP JSON-RPC messages
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("zendesk_mcp=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting zendesk-mcp v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env().context("Failed to load configuration")?;

    tracing::debug!("Configuration loaded, base_url: {}", config.base_url);

    let client =
        zendesk_client::ZendeskClient::new(&config).context("Failed to create Zendesk client")?;

    let store = AttachmentStore::open(config.attachment_cache_dir.as_deref())
        .context("Failed to open attachment cache")?;

    tracing::info!("Testing connection to Zendesk...");
    if let Err(e) = client.test_connection().await {
        tracing::error!(error = %e, "Connection test failed");
        tracing::warn!(
            "Server will start but may not be able to reach Zendesk. \
             Check configuration and network connectivity."
        );
    }

    let server = server::ZendeskServer::new(client, store);

    tracing::info!("Server initialized, starting stdio transport");

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })
        .context("Failed to start server")?;

    tracing::info!("Server running, waiting for requests");

    service
        .waiting()
        .await
        .context("Server error during operation")?;

    tracing::info!("Server shutting down");

    Ok(())
}
