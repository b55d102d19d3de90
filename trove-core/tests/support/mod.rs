#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use trove_core::config::{RegionShape, TroveConfig};
use trove_core::model::{ApiError, Area, CoinId, ExploreReport, License, PermitId, TreasureId};
use trove_core::request::{DigRequest, RequestKind};
use trove_core::transport::{CallResult, Reply, Transport, TransportError};

pub const FREE_DIGS: u32 = 3;
pub const PAID_DIGS: u32 = 5;

#[derive(Debug, Default)]
struct Field {
    /// Depths of the treasures still buried in each cell.
    buried: HashMap<(i32, i32), Vec<u8>>,
    /// Attempts allowed and used per license.
    licenses: HashMap<u64, (u32, u32)>,
    next_license: u64,
    next_coin: u32,
    next_treasure: u64,
    explore_timeouts: usize,
    cash_failures: usize,
}

/// In-memory treasure field that answers like the real service.
#[derive(Debug, Default)]
pub struct FakeService {
    field: Mutex<Field>,
    calls: Mutex<HashMap<RequestKind, usize>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide `count` treasures in a cell at the given depth.
    pub fn bury(self, x: i32, y: i32, depth: u8, count: usize) -> Self {
        {
            let mut field = self.field.lock().expect("field lock");
            let cell = field.buried.entry((x, y)).or_default();
            cell.extend(std::iter::repeat_n(depth, count));
        }
        self
    }

    /// Make the next `count` explore calls time out.
    pub fn with_explore_timeouts(self, count: usize) -> Self {
        self.field.lock().expect("field lock").explore_timeouts = count;
        self
    }

    /// Answer the next `count` cash calls with 503.
    pub fn with_cash_failures(self, count: usize) -> Self {
        self.field.lock().expect("field lock").cash_failures = count;
        self
    }

    pub fn calls(&self, kind: RequestKind) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn still_buried(&self) -> usize {
        self.field
            .lock()
            .expect("field lock")
            .buried
            .values()
            .map(Vec::len)
            .sum()
    }

    fn record(&self, kind: RequestKind) {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(kind)
            .or_default() += 1;
    }
}

fn forbidden(message: &str) -> Reply<Vec<TreasureId>> {
    Reply::error(
        StatusCode::FORBIDDEN,
        ApiError {
            code: 403,
            message: message.to_string(),
        },
    )
}

#[async_trait]
impl Transport for FakeService {
    async fn health_check(&self) -> CallResult<String> {
        self.record(RequestKind::Health);
        Ok(Reply::ok("ok".to_string()))
    }

    async fn explore(&self, area: Area) -> CallResult<ExploreReport> {
        self.record(RequestKind::Explore);
        let mut field = self.field.lock().expect("field lock");
        if field.explore_timeouts > 0 {
            field.explore_timeouts -= 1;
            return Err(TransportError::Timeout);
        }

        let x_end = area.x + area.size_x as i32;
        let y_end = area.y + area.size_y as i32;
        let amount: u32 = field
            .buried
            .iter()
            .filter(|((x, y), _)| (area.x..x_end).contains(x) && (area.y..y_end).contains(y))
            .map(|(_, depths)| depths.len() as u32)
            .sum();
        Ok(Reply::ok(ExploreReport { area, amount }))
    }

    async fn issue_license(&self, coins: Vec<CoinId>) -> CallResult<License> {
        let kind = if coins.is_empty() {
            RequestKind::IssueFreeLicense
        } else {
            RequestKind::IssuePaidLicense
        };
        self.record(kind);

        let allowed = if coins.is_empty() { FREE_DIGS } else { PAID_DIGS };
        let mut field = self.field.lock().expect("field lock");
        field.next_license += 1;
        let id = field.next_license;
        field.licenses.insert(id, (allowed, 0));
        Ok(Reply::ok(License {
            id: PermitId(id),
            dig_allowed: allowed,
            dig_used: 0,
        }))
    }

    async fn dig(&self, request: DigRequest) -> CallResult<Vec<TreasureId>> {
        self.record(RequestKind::Dig);
        let mut field = self.field.lock().expect("field lock");
        let Some((allowed, used)) = field.licenses.get_mut(&request.license_id.0) else {
            return Ok(forbidden("no such license"));
        };
        if *used >= *allowed {
            return Ok(forbidden("license exhausted"));
        }
        *used += 1;

        let depths = field
            .buried
            .remove(&(request.x, request.y))
            .unwrap_or_default();
        let (found, rest): (Vec<u8>, Vec<u8>) =
            depths.into_iter().partition(|depth| *depth == request.depth);
        if !rest.is_empty() {
            field.buried.insert((request.x, request.y), rest);
        }
        if found.is_empty() {
            return Ok(Reply::error(StatusCode::NOT_FOUND, ApiError::unknown()));
        }

        let treasures: Vec<TreasureId> = found
            .iter()
            .map(|_| {
                field.next_treasure += 1;
                TreasureId::new(format!(
                    "t-{}-{}-{}",
                    request.x, request.y, field.next_treasure
                ))
            })
            .collect();
        Ok(Reply::ok(treasures))
    }

    async fn cash(&self, _treasure: TreasureId) -> CallResult<Vec<CoinId>> {
        self.record(RequestKind::Cash);
        let mut field = self.field.lock().expect("field lock");
        if field.cash_failures > 0 {
            field.cash_failures -= 1;
            return Ok(Reply::error(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::unknown(),
            ));
        }
        field.next_coin += 1;
        Ok(Reply::ok(vec![CoinId(field.next_coin)]))
    }
}

/// Small field configuration with a handful of workers.
pub fn field_config(
    size: u32,
    treasures: u64,
    shapes: &[(u32, u32)],
) -> TroveConfig {
    let mut config = TroveConfig::default();
    config.search.field_size_x = size;
    config.search.field_size_y = size;
    config.search.assumed_treasures = treasures;
    config.search.explore_concurrency = 10;
    config.search.shapes = shapes
        .iter()
        .map(|(height, width)| RegionShape::new(*height, *width))
        .collect();
    config.dispatcher.workers = 4;
    config.dispatcher.queue_capacity = 256;
    config.extraction.max_permits = 2;
    config.extraction.min_depth_to_convert = 2;
    config
}
