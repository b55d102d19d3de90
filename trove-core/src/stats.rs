//! Run-wide counters.
//!
//! Workers and the orchestrator bump these with relaxed atomics; readers
//! take a [`StatsSnapshot`] when they want a consistent-enough view.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::request::{ApiOutcome, RequestKind};

/// Depth buckets in the treasure histogram; deeper finds land in the last.
pub const DEPTH_BUCKETS: usize = 16;

#[derive(Debug, Default)]
pub struct RunStats {
    submitted: [AtomicU64; RequestKind::COUNT],
    completed: [AtomicU64; RequestKind::COUNT],
    latency_micros: [AtomicU64; RequestKind::COUNT],
    resubmitted: [AtomicU64; RequestKind::COUNT],
    successes: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    timeouts: AtomicU64,
    transport_failures: AtomicU64,
    queue_rejections: AtomicU64,
    explored_area: AtomicU64,
    deduced_regions: AtomicU64,
    duplicate_results: AtomicU64,
    pruned_regions: AtomicU64,
    permits_issued: AtomicU64,
    paid_permits: AtomicU64,
    treasures_by_depth: [AtomicU64; DEPTH_BUCKETS],
    coins_cashed: AtomicU64,
    conversions_skipped: AtomicU64,
    abandoned_cells: AtomicU64,
    permits_in_use: AtomicU64,
    coin_balance: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self, kind: RequestKind) {
        bump(&self.submitted[kind.index()], 1);
    }

    pub fn record_resubmitted(&self, kind: RequestKind) {
        bump(&self.resubmitted[kind.index()], 1);
    }

    pub fn record_queue_rejection(&self) {
        bump(&self.queue_rejections, 1);
    }

    /// Classify a finished call by status family.
    pub fn record_outcome(&self, kind: RequestKind, outcome: &ApiOutcome) {
        bump(&self.completed[kind.index()], 1);
        if let Some(latency) = outcome.latency() {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            bump(&self.latency_micros[kind.index()], micros);
        }

        match outcome.status() {
            Some(status) if status.is_success() => bump(&self.successes, 1),
            Some(status) if status.is_client_error() => bump(&self.client_errors, 1),
            Some(_) => bump(&self.server_errors, 1),
            None if outcome.is_timeout() => bump(&self.timeouts, 1),
            None => bump(&self.transport_failures, 1),
        }
    }

    pub fn record_explored(&self, cells: u64) {
        bump(&self.explored_area, cells);
    }

    pub fn record_deduced(&self, regions: u64) {
        bump(&self.deduced_regions, regions);
    }

    pub fn record_duplicate(&self) {
        bump(&self.duplicate_results, 1);
    }

    pub fn record_pruned(&self, regions: u64) {
        bump(&self.pruned_regions, regions);
    }

    pub fn record_permit_issued(&self, paid: bool) {
        bump(&self.permits_issued, 1);
        if paid {
            bump(&self.paid_permits, 1);
        }
    }

    pub fn record_treasures(&self, depth: u8, count: u64) {
        let bucket = usize::from(depth).min(DEPTH_BUCKETS - 1);
        bump(&self.treasures_by_depth[bucket], count);
    }

    pub fn record_coins(&self, count: u64) {
        bump(&self.coins_cashed, count);
    }

    pub fn record_conversion_skipped(&self) {
        bump(&self.conversions_skipped, 1);
    }

    pub fn record_abandoned_cell(&self) {
        bump(&self.abandoned_cells, 1);
    }

    pub fn set_permits_in_use(&self, permits: usize) {
        self.permits_in_use.store(permits as u64, Ordering::Relaxed);
    }

    pub fn set_coin_balance(&self, coins: usize) {
        self.coin_balance.store(coins as u64, Ordering::Relaxed);
    }

    pub fn timeouts(&self) -> u64 {
        read(&self.timeouts)
    }

    pub fn submitted(&self, kind: RequestKind) -> u64 {
        read(&self.submitted[kind.index()])
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let requests = RequestKind::ALL
            .into_iter()
            .map(|kind| {
                let completed = read(&self.completed[kind.index()]);
                let latency = read(&self.latency_micros[kind.index()]);
                let mean_latency = if completed == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_micros(latency / completed)
                };
                let counters = KindSnapshot {
                    submitted: read(&self.submitted[kind.index()]),
                    completed,
                    resubmitted: read(&self.resubmitted[kind.index()]),
                    mean_latency_ms: mean_latency.as_secs_f64() * 1000.0,
                };
                (kind, counters)
            })
            .collect();

        let treasures_by_depth: Vec<u64> =
            self.treasures_by_depth.iter().map(read).collect();

        StatsSnapshot {
            captured_at: Utc::now(),
            requests,
            successes: read(&self.successes),
            client_errors: read(&self.client_errors),
            server_errors: read(&self.server_errors),
            timeouts: read(&self.timeouts),
            transport_failures: read(&self.transport_failures),
            queue_rejections: read(&self.queue_rejections),
            explored_area: read(&self.explored_area),
            deduced_regions: read(&self.deduced_regions),
            duplicate_results: read(&self.duplicate_results),
            pruned_regions: read(&self.pruned_regions),
            permits_issued: read(&self.permits_issued),
            paid_permits: read(&self.paid_permits),
            treasures_found: treasures_by_depth.iter().sum(),
            treasures_by_depth,
            coins_cashed: read(&self.coins_cashed),
            conversions_skipped: read(&self.conversions_skipped),
            abandoned_cells: read(&self.abandoned_cells),
            permits_in_use: read(&self.permits_in_use),
            coin_balance: read(&self.coin_balance),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct KindSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub resubmitted: u64,
    pub mean_latency_ms: f64,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub requests: BTreeMap<RequestKind, KindSnapshot>,
    pub successes: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub timeouts: u64,
    pub transport_failures: u64,
    pub queue_rejections: u64,
    pub explored_area: u64,
    pub deduced_regions: u64,
    pub duplicate_results: u64,
    pub pruned_regions: u64,
    pub permits_issued: u64,
    pub paid_permits: u64,
    pub treasures_found: u64,
    /// Index is the dig depth; the last bucket collects everything deeper.
    pub treasures_by_depth: Vec<u64>,
    pub coins_cashed: u64,
    pub conversions_skipped: u64,
    pub abandoned_cells: u64,
    pub permits_in_use: u64,
    pub coin_balance: u64,
}

impl StatsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.requests.values().map(|kind| kind.completed).sum()
    }
}
