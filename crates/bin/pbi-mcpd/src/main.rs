//! Daemon entry point for the Power BI MCP server.
//!
//! Loads configuration from `.env`, the environment and CLI flags, builds the
//! control plane, and serves MCP over stdio or streamable HTTP.

mod bootstrap;
mod config;

use std::sync::Arc;

use pbi_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::build_control_plane;
use crate::config::PbiConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // stdout carries the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PbiConfig::from_args()?;
    let control = Arc::new(build_control_plane(&config)?);

    if config.enable_stdio {
        serve_stdio(control).await
    } else {
        serve_streamable_http(control, McpHttpServerConfig::new(config.mcp_http_addr)).await
    }
}
