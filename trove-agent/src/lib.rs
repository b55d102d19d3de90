//! # Trove Agent
//!
//! HTTP transport, command-line surface and progress reporting for the
//! Trove exploration agent. The `trove` binary wires these to the
//! orchestrator in `trove-core`.

pub mod cli;
pub mod http;
pub mod reporter;
pub mod wire;

pub use cli::Cli;
pub use http::HttpTransport;
