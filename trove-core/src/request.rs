//! Logical requests and their outcomes.
//!
//! A request is a value object created by the orchestrator and consumed
//! exactly once by a dispatcher worker, which pairs it with the transport
//! outcome in an [`ApiResponse`].

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::model::{Area, CoinId, ExploreReport, License, PermitId, TreasureId};
use crate::search::RegionId;
use crate::transport::{CallResult, Transport, TransportError};

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Health,
    Explore,
    IssueFreeLicense,
    IssuePaidLicense,
    Dig,
    Cash,
}

impl RequestKind {
    pub const COUNT: usize = 6;

    pub const ALL: [RequestKind; Self::COUNT] = [
        RequestKind::Health,
        RequestKind::Explore,
        RequestKind::IssueFreeLicense,
        RequestKind::IssuePaidLicense,
        RequestKind::Dig,
        RequestKind::Cash,
    ];

    /// Dense index for per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            RequestKind::Health => 0,
            RequestKind::Explore => 1,
            RequestKind::IssueFreeLicense => 2,
            RequestKind::IssuePaidLicense => 3,
            RequestKind::Dig => 4,
            RequestKind::Cash => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RequestKind::Health => "health",
            RequestKind::Explore => "explore",
            RequestKind::IssueFreeLicense => "issue_free_license",
            RequestKind::IssuePaidLicense => "issue_paid_license",
            RequestKind::Dig => "dig",
            RequestKind::Cash => "cash",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch rank per request family. Higher ranks are served first; equal
/// ranks fall back to arrival order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTable {
    /// Cashing treasures for coins.
    pub conversion: u8,
    /// Free and paid permit issuance.
    pub issuance: u8,
    pub extraction: u8,
    pub probe: u8,
    pub health: u8,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            conversion: 5,
            issuance: 4,
            extraction: 3,
            probe: 2,
            health: 1,
        }
    }
}

impl PriorityTable {
    pub fn rank(&self, kind: RequestKind) -> u8 {
        match kind {
            RequestKind::Cash => self.conversion,
            RequestKind::IssueFreeLicense | RequestKind::IssuePaidLicense => {
                self.issuance
            }
            RequestKind::Dig => self.extraction,
            RequestKind::Explore => self.probe,
            RequestKind::Health => self.health,
        }
    }
}

/// One extraction attempt at a cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DigRequest {
    pub license_id: PermitId,
    pub x: i32,
    pub y: i32,
    pub depth: u8,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiRequest {
    Health,
    Explore { region: RegionId, area: Area },
    IssueFreeLicense,
    IssuePaidLicense { coin: CoinId },
    Dig(DigRequest),
    /// `depth` is where the treasure was dug; kept for accounting.
    Cash { treasure: TreasureId, depth: u8 },
}

/// Probe cost reported for areas past the service's largest bucket.
pub const OVERSIZED_PROBE_COST: u64 = 1 << 40;

/// Largest area exponent the service prices; areas of `2^18` cells and up
/// are rejected.
const MAX_PRICED_AREA_LOG2: u32 = 18;

impl ApiRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ApiRequest::Health => RequestKind::Health,
            ApiRequest::Explore { .. } => RequestKind::Explore,
            ApiRequest::IssueFreeLicense => RequestKind::IssueFreeLicense,
            ApiRequest::IssuePaidLicense { .. } => RequestKind::IssuePaidLicense,
            ApiRequest::Dig(_) => RequestKind::Dig,
            ApiRequest::Cash { .. } => RequestKind::Cash,
        }
    }

    /// Cost the service charges for this call.
    pub fn cost(&self) -> u64 {
        match self {
            ApiRequest::Explore { area, .. } => probe_cost(area.cells()),
            ApiRequest::Dig(dig) => u64::from(dig.depth.max(1)),
            _ => 1,
        }
    }

    /// Issue the matching transport call.
    pub async fn execute<T>(&self, transport: &T) -> ApiOutcome
    where
        T: Transport + ?Sized,
    {
        match self {
            ApiRequest::Health => ApiOutcome::Health(transport.health_check().await),
            ApiRequest::Explore { area, .. } => {
                ApiOutcome::Explore(transport.explore(*area).await)
            }
            ApiRequest::IssueFreeLicense => {
                ApiOutcome::License(transport.issue_license(Vec::new()).await)
            }
            ApiRequest::IssuePaidLicense { coin } => {
                ApiOutcome::License(transport.issue_license(vec![*coin]).await)
            }
            ApiRequest::Dig(dig) => ApiOutcome::Dig(transport.dig(*dig).await),
            ApiRequest::Cash { treasure, .. } => {
                ApiOutcome::Cash(transport.cash(treasure.clone()).await)
            }
        }
    }
}

fn probe_cost(cells: u64) -> u64 {
    match cells {
        0 => 0,
        1..=3 => 1,
        _ => {
            let log2 = cells.ilog2();
            if log2 >= MAX_PRICED_AREA_LOG2 {
                OVERSIZED_PROBE_COST
            } else {
                u64::from(log2)
            }
        }
    }
}

#[derive(Debug)]
pub enum ApiOutcome {
    Health(CallResult<String>),
    Explore(CallResult<ExploreReport>),
    License(CallResult<License>),
    Dig(CallResult<Vec<TreasureId>>),
    Cash(CallResult<Vec<CoinId>>),
}

impl ApiOutcome {
    /// Status code of the reply, `None` for transport failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiOutcome::Health(result) => result.as_ref().ok().map(|r| r.status),
            ApiOutcome::Explore(result) => result.as_ref().ok().map(|r| r.status),
            ApiOutcome::License(result) => result.as_ref().ok().map(|r| r.status),
            ApiOutcome::Dig(result) => result.as_ref().ok().map(|r| r.status),
            ApiOutcome::Cash(result) => result.as_ref().ok().map(|r| r.status),
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            ApiOutcome::Health(result) => result.as_ref().ok().map(|r| r.latency),
            ApiOutcome::Explore(result) => result.as_ref().ok().map(|r| r.latency),
            ApiOutcome::License(result) => result.as_ref().ok().map(|r| r.latency),
            ApiOutcome::Dig(result) => result.as_ref().ok().map(|r| r.latency),
            ApiOutcome::Cash(result) => result.as_ref().ok().map(|r| r.latency),
        }
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ApiOutcome::Health(result) => result.as_ref().err(),
            ApiOutcome::Explore(result) => result.as_ref().err(),
            ApiOutcome::License(result) => result.as_ref().err(),
            ApiOutcome::Dig(result) => result.as_ref().err(),
            ApiOutcome::Cash(result) => result.as_ref().err(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.transport_error(), Some(TransportError::Timeout))
    }

    /// Name of the outcome family, used when reporting mismatches.
    pub fn label(&self) -> &'static str {
        match self {
            ApiOutcome::Health(_) => "health",
            ApiOutcome::Explore(_) => "explore",
            ApiOutcome::License(_) => "license",
            ApiOutcome::Dig(_) => "dig",
            ApiOutcome::Cash(_) => "cash",
        }
    }
}

/// A request paired with what happened when it was sent.
#[derive(Debug)]
pub struct ApiResponse {
    pub request: ApiRequest,
    pub outcome: ApiOutcome,
}
