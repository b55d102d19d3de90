//! Periodic progress reports under the `trove::stats` target.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use trove_core::{RunStats, RunSummary, StatsSnapshot};

/// Log a snapshot every `period` until `shutdown` fires.
pub fn spawn_reporter(
    stats: Arc<RunStats>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => log_snapshot(&stats.snapshot()),
            }
        }
    })
}

pub fn log_snapshot(snapshot: &StatsSnapshot) {
    tracing::info!(
        target: "trove::stats",
        requests = snapshot.total_requests(),
        explored_area = snapshot.explored_area,
        deduced = snapshot.deduced_regions,
        treasures = snapshot.treasures_found,
        coins = snapshot.coins_cashed,
        permits_in_use = snapshot.permits_in_use,
        coin_balance = snapshot.coin_balance,
        timeouts = snapshot.timeouts,
        server_errors = snapshot.server_errors,
        "progress"
    );

    if tracing::enabled!(target: "trove::stats", tracing::Level::DEBUG) {
        match serde_json::to_string(snapshot) {
            Ok(json) => tracing::debug!(target: "trove::stats", snapshot = %json, "full snapshot"),
            Err(e) => tracing::warn!(target: "trove::stats", "failed to encode snapshot: {}", e),
        }
    }
}

pub fn log_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    tracing::info!(
        target: "trove::stats",
        reason = ?summary.reason,
        requests = stats.total_requests(),
        treasures = stats.treasures_found,
        coins = stats.coins_cashed,
        skipped = stats.conversions_skipped,
        abandoned_cells = stats.abandoned_cells,
        permits = stats.permits_issued,
        paid_permits = stats.paid_permits,
        duplicates = stats.duplicate_results,
        "run summary"
    );
    for (kind, requests) in &stats.requests {
        tracing::info!(
            target: "trove::stats",
            kind = %kind,
            completed = requests.completed,
            resubmitted = requests.resubmitted,
            mean_latency_ms = requests.mean_latency_ms,
            "requests"
        );
    }
}
