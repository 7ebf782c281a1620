//! Core services for pbi-mcp.
//!
//! This crate owns the connection to a tabular model, the worker pool that runs
//! blocking driver and language-model calls, background priming of the analysis
//! context, and the control plane that turns tool calls into text replies.

pub mod analyst;
pub mod connector;
pub mod control;
pub mod driver;
pub mod pool;
pub mod primer;
pub mod sanitize;
