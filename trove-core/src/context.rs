use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::TroveConfig;
use crate::stats::RunStats;

/// Everything a run shares: configuration, counters and the stop signal.
/// Built once by the binary and handed to the dispatcher and orchestrator.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub config: Arc<TroveConfig>,
    pub stats: Arc<RunStats>,
    pub shutdown: CancellationToken,
}

impl RunContext {
    pub fn new(config: TroveConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(RunStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &TroveConfig {
        &self.config
    }

    /// Request a graceful stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
