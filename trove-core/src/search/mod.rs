//! Adaptive spatial search over the field.
//!
//! The field is split into a tree of regions following a depth-indexed
//! shape table. Probed counts propagate into parents, which lets the tree
//! rank unexplored children by expected density and deduce the last child
//! of any parent without probing it.

mod region;
mod tree;

pub use region::{Region, RegionId};
pub use tree::{RegionTree, Resolution, Subdivision, TreasureCell};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("search tree is already seeded")]
    AlreadySeeded,

    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("no subdivision shape registered for depth {0}")]
    NoShapeForDepth(usize),

    #[error("region {0} cannot be subdivided")]
    NotSubdividable(RegionId),

    #[error(
        "children of {parent} report {explored} treasures but the region holds {actual}"
    )]
    CountOverflow {
        parent: RegionId,
        explored: u64,
        actual: u64,
    },
}
