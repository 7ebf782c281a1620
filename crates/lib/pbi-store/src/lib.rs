//! Tabular model types and catalog helpers for pbi-mcp.
//!
//! This crate defines the table descriptors, result rows, and analysis context
//! shared by the connector, the context primer, and the tool surface.

pub mod models;
pub mod schema;

pub use models::*;
