//! MCP tool modules.
//!
//! Tools are grouped the way the control plane is: connection, table metadata,
//! raw queries, and the natural-language tools that need the language model.

pub mod connection;
pub mod language;
pub mod query;
pub mod tables;
