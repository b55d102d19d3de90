//! Run configuration.
//!
//! Every section carries defaults so a bare invocation against a local
//! service works without a configuration file. Loading and validation live
//! in the `trove-config` crate.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Area;
use crate::request::{PriorityTable, RequestKind};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TroveConfig {
    /// Where the exploration service lives and how long a call may take.
    pub service: ServiceConfig,
    /// Worker pool sizing, queue capacity and request priorities.
    pub dispatcher: DispatcherConfig,
    /// Field geometry and the region subdivision table.
    pub search: SearchConfig,
    /// Permit pool and dig/cash thresholds.
    pub extraction: ExtractionConfig,
    /// Logging filter and stats reporting cadence.
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub scheme: String,
    /// Host name or IP of the service.
    pub address: String,
    pub port: u16,
    /// Per-call timeout. Expiry is reported as a retryable outcome.
    pub request_timeout_ms: u64,
}

impl ServiceConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.address, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            address: "localhost".into(),
            port: 8000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Size of the generic worker pool that serves every request kind.
    pub workers: usize,
    /// Upper bound on pending requests across all kinds.
    pub queue_capacity: usize,
    /// Extra workers that only serve one request kind.
    pub dedicated_workers: BTreeMap<RequestKind, usize>,
    /// Dispatch order between request kinds.
    pub priorities: PriorityTable,
    /// Optional cap on summed request cost within any one-second window.
    pub max_cost_per_second: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            queue_capacity: 1_000_000,
            dedicated_workers: BTreeMap::new(),
            priorities: PriorityTable::default(),
            max_cost_per_second: None,
        }
    }
}

/// Grid cell size used when subdividing a region. `height` spans the x
/// axis and `width` the y axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionShape {
    pub height: u32,
    pub width: u32,
}

impl RegionShape {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn is_unit(&self) -> bool {
        self.height == 1 && self.width == 1
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub field_size_x: u32,
    pub field_size_y: u32,
    /// Total treasure hidden in the field, known up front.
    pub assumed_treasures: u64,
    /// Region probes kept in flight at once.
    pub explore_concurrency: usize,
    /// Subdivision table. Entry `d` is the child cell size for regions at
    /// depth `d`; the last entry should be a unit cell.
    pub shapes: Vec<RegionShape>,
}

impl SearchConfig {
    pub fn field(&self) -> Area {
        Area::new(0, 0, self.field_size_x, self.field_size_y)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            field_size_x: 3500,
            field_size_y: 3500,
            assumed_treasures: 490_000,
            explore_concurrency: 10,
            shapes: default_shapes(),
        }
    }
}

pub fn default_shapes() -> Vec<RegionShape> {
    [3500, 875, 219, 55, 14, 7, 4, 2, 1]
        .into_iter()
        .map(|height| RegionShape::new(height, 1))
        .collect()
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Number of permit slots held at once.
    pub max_permits: usize,
    /// Treasures found above this depth are kept instead of cashed.
    pub min_depth_to_convert: u8,
    /// Deepest level a cell is dug before it is abandoned.
    pub max_dig_depth: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_permits: 10,
            min_depth_to_convert: 2,
            max_dig_depth: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Interval between stats reports. Zero disables the reporter.
    pub stats_interval_secs: u64,
}

impl TelemetryConfig {
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0)
            .then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "trove=info,trove_agent=info,trove_core=info".into(),
            stats_interval_secs: 10,
        }
    }
}

impl DispatcherConfig {
    /// Dedicated worker count for `kind`, zero when none are configured.
    pub fn dedicated_for(&self, kind: RequestKind) -> usize {
        self.dedicated_workers.get(&kind).copied().unwrap_or(0)
    }
}
