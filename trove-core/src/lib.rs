//! # Trove Core
//!
//! Core library for the Trove exploration agent: it drives a remote
//! treasure-field service to find, dig up and cash every treasure hidden in
//! a two-dimensional field while respecting the service's permit and
//! concurrency limits.
//!
//! ## Overview
//!
//! - **Dispatch**: a bounded, priority-ordered, multi-worker pipeline that
//!   turns logical requests into transport calls ([`dispatch`])
//! - **Search**: a region tree that ranks unexplored areas by expected
//!   treasure density and deduces counts it does not need to probe
//!   ([`search`])
//! - **Extraction**: a small pool of reusable dig permits with a
//!   deepest-first overflow queue ([`ledger`], [`deferred`])
//! - **Orchestration**: the single control loop tying the pieces together
//!   ([`orchestrator`])
//!
//! The service itself is reached through the [`transport::Transport`]
//! trait; the `trove-agent` crate provides the HTTP implementation.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use trove_core::{Orchestrator, RunContext, TroveConfig, transport::Transport};
//!
//! async fn explore<T: Transport>(transport: T) -> trove_core::Result<()> {
//!     let ctx = RunContext::new(TroveConfig::default());
//!     let mut orchestrator = Orchestrator::new(&ctx, Arc::new(transport));
//!     let summary = orchestrator.run().await?;
//!     println!("cashed {} coins", summary.stats.coins_cashed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod request;
pub mod search;
pub mod stats;
pub mod transport;

pub use config::{RegionShape, TroveConfig};
pub use context::RunContext;
pub use error::{Result, TroveError};
pub use orchestrator::{Orchestrator, RunSummary, StopReason};
pub use stats::{RunStats, StatsSnapshot};
