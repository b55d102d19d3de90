//! Entities exchanged with the exploration service.
//!
//! These mirror the service's vocabulary (areas, licenses, treasures and
//! coins). Serde names follow the service's JSON so transports can decode
//! straight into them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle of the field. `size_x` spans the x axis and
/// `size_y` the y axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Area {
    #[serde(rename = "posX")]
    pub x: i32,
    #[serde(rename = "posY")]
    pub y: i32,
    #[serde(rename = "sizeX")]
    pub size_x: u32,
    #[serde(rename = "sizeY")]
    pub size_y: u32,
}

impl Area {
    pub const fn new(x: i32, y: i32, size_x: u32, size_y: u32) -> Self {
        Self {
            x,
            y,
            size_x,
            size_y,
        }
    }

    /// Number of unit cells covered by the rectangle.
    pub fn cells(&self) -> u64 {
        u64::from(self.size_x) * u64::from(self.size_y)
    }

    pub fn is_unit(&self) -> bool {
        self.cells() == 1
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.x, self.y, self.size_x, self.size_y
        )
    }
}

/// Result of probing an area.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExploreReport {
    pub area: Area,
    pub amount: u32,
}

/// Identifier the service assigns to an extraction permit.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PermitId(pub u64);

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permit as issued by the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: PermitId,
    #[serde(rename = "digAllowed")]
    pub dig_allowed: u32,
    #[serde(rename = "digUsed")]
    pub dig_used: u32,
}

/// Opaque spendable currency unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinId(pub u32);

/// Opaque handle for an extracted treasure, exchanged for coins.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreasureId(pub String);

impl TreasureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TreasureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error body returned by the service for non-success statuses.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

impl ApiError {
    /// Code used when the service returned an error body that could not be
    /// decoded.
    pub const UNKNOWN_CODE: i32 = 1;

    pub fn unknown() -> Self {
        Self {
            code: Self::UNKNOWN_CODE,
            message: String::new(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api error {}: {}", self.code, self.message)
    }
}
