use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::model::Area;

/// Index of a region in the tree's arena.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RegionId(u32);

impl RegionId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A rectangle of the field at some search depth, plus the bookkeeping
/// needed to decide where undiscovered treasure is likely to be.
#[derive(Clone, Debug)]
pub struct Region {
    pub(crate) area: Area,
    pub(crate) depth: u8,
    pub(crate) parent: Option<RegionId>,
    pub(crate) children: Vec<RegionId>,
    /// Treasure count once probed or deduced.
    pub(crate) actual: Option<u64>,
    pub(crate) explored_child_count: u64,
    pub(crate) unexplored_child_area: u64,
    pub(crate) unexplored_children: usize,
    /// Unexplored children that are not waiting on a probe.
    pub(crate) idle_children: usize,
    pub(crate) in_flight: bool,
    /// Key under which the region currently sits in the frontier.
    pub(crate) frontier_key: Option<OrderedFloat<f64>>,
}

impl Region {
    pub(crate) fn new(area: Area, depth: u8, parent: Option<RegionId>) -> Self {
        Self {
            area,
            depth,
            parent,
            children: Vec::new(),
            actual: None,
            explored_child_count: 0,
            unexplored_child_area: 0,
            unexplored_children: 0,
            idle_children: 0,
            in_flight: false,
            frontier_key: None,
        }
    }

    pub fn area(&self) -> Area {
        self.area
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    pub fn children(&self) -> &[RegionId] {
        &self.children
    }

    pub fn actual_count(&self) -> Option<u64> {
        self.actual
    }

    pub fn is_explored(&self) -> bool {
        self.actual.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn explored_child_count(&self) -> u64 {
        self.explored_child_count
    }

    pub fn unexplored_child_area(&self) -> u64 {
        self.unexplored_child_area
    }

    pub fn unexplored_children(&self) -> usize {
        self.unexplored_children
    }

    /// Treasure not yet attributed to an explored child.
    pub fn remaining(&self) -> u64 {
        self.actual
            .unwrap_or(0)
            .saturating_sub(self.explored_child_count)
    }

    /// Remaining treasure per unexplored cell.
    pub fn density(&self) -> f64 {
        if self.unexplored_child_area == 0 {
            return 0.0;
        }
        self.remaining() as f64 / self.unexplored_child_area as f64
    }
}
