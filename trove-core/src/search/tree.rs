use std::cmp::Reverse;
use std::collections::BTreeSet;

use ordered_float::OrderedFloat;

use super::{Region, RegionId, TreeError};
use crate::config::RegionShape;
use crate::model::Area;

/// Frontier ordering: densest first, then lowest region index.
type FrontierKey = (Reverse<OrderedFloat<f64>>, RegionId);

/// A unit cell known to hold treasure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TreasureCell {
    pub x: i32,
    pub y: i32,
    pub amount: u64,
}

/// What a single probe result (or the seed) settled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The region had already been explored; nothing changed.
    pub duplicate: bool,
    /// Unit cells with positive counts, ready for extraction.
    pub cells: Vec<TreasureCell>,
    /// Regions resolved without a probe.
    pub deduced: u64,
    /// Regions resolved to zero.
    pub pruned: u64,
    /// Area covered by every region settled here.
    pub explored_cells: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Subdivision {
    /// Several children were created and the region joined the frontier.
    Frontier { children: usize },
    /// Exactly one child covers the region; its count follows from the
    /// parent's.
    Single(RegionId),
}

/// Arena-backed region tree plus the density-ordered frontier.
#[derive(Debug)]
pub struct RegionTree {
    regions: Vec<Region>,
    frontier: BTreeSet<FrontierKey>,
    shapes: Vec<RegionShape>,
    root: Option<RegionId>,
    in_flight: usize,
    duplicates: u64,
}

impl RegionTree {
    pub fn new(shapes: Vec<RegionShape>) -> Self {
        Self {
            regions: Vec::new(),
            frontier: BTreeSet::new(),
            shapes,
            root: None,
            in_flight: 0,
            duplicates: 0,
        }
    }

    /// Register the whole field with its known treasure total and expand it
    /// as far as it can go without probing.
    pub fn seed(
        &mut self,
        field: Area,
        assumed_total: u64,
    ) -> Result<Resolution, TreeError> {
        if self.root.is_some() {
            return Err(TreeError::AlreadySeeded);
        }

        let root = self.push(Region::new(field, 0, None));
        self.regions[root.index()].actual = Some(assumed_total);
        self.root = Some(root);

        let mut resolution = Resolution {
            explored_cells: field.cells(),
            ..Resolution::default()
        };
        self.settle(vec![root], &mut resolution)?;
        Ok(resolution)
    }

    /// Apply a probe result and everything that follows from it.
    pub fn resolve(
        &mut self,
        region: RegionId,
        count: u64,
    ) -> Result<Resolution, TreeError> {
        let mut resolution = Resolution::default();
        if !self.mark_explored(region, count)? {
            resolution.duplicate = true;
            return Ok(resolution);
        }
        resolution.explored_cells = self.regions[region.index()].area.cells();
        self.settle(vec![region], &mut resolution)?;
        Ok(resolution)
    }

    /// Split an explored region into a grid of children using the shape
    /// registered for its depth. Edge cells are clipped to the region.
    pub fn subdivide(&mut self, id: RegionId) -> Result<Subdivision, TreeError> {
        let region = self.get(id)?;
        if region.actual.unwrap_or(0) == 0
            || region.area.cells() <= 1
            || !region.children.is_empty()
        {
            return Err(TreeError::NotSubdividable(id));
        }

        let depth = region.depth;
        let shape = self
            .shapes
            .get(usize::from(depth))
            .copied()
            .ok_or(TreeError::NoShapeForDepth(usize::from(depth)))?;
        let area = region.area;
        let step_x = shape.height.max(1);
        let step_y = shape.width.max(1);

        let mut children = Vec::new();
        let mut dx = 0;
        while dx < area.size_x {
            let size_x = step_x.min(area.size_x - dx);
            let mut dy = 0;
            while dy < area.size_y {
                let size_y = step_y.min(area.size_y - dy);
                let cell = Area::new(
                    area.x + dx as i32,
                    area.y + dy as i32,
                    size_x,
                    size_y,
                );
                children.push(self.push(Region::new(
                    cell,
                    depth.saturating_add(1),
                    Some(id),
                )));
                dy += size_y;
            }
            dx += size_x;
        }

        let count = children.len();
        let parent = &mut self.regions[id.index()];
        parent.unexplored_child_area = area.cells();
        parent.unexplored_children = count;
        parent.idle_children = count;
        parent.explored_child_count = 0;
        parent.children = children;

        match count {
            0 => Err(TreeError::NotSubdividable(id)),
            1 => Ok(Subdivision::Single(parent.children[0])),
            _ => {
                self.refresh_frontier(id);
                tracing::trace!(
                    target: "trove::search",
                    region = %id,
                    depth,
                    children = count,
                    "region subdivided"
                );
                Ok(Subdivision::Frontier { children: count })
            }
        }
    }

    /// Pick the next child worth probing and mark it in flight.
    ///
    /// A parent's last idle child is never handed out: it is deduced once
    /// its siblings are known.
    pub fn frontier_next(&mut self) -> Option<(RegionId, Area)> {
        let parent = self
            .frontier
            .iter()
            .map(|(_, id)| *id)
            .find(|id| self.regions[id.index()].idle_children >= 2)?;

        let child = self.regions[parent.index()]
            .children
            .iter()
            .copied()
            .find(|child| {
                let region = &self.regions[child.index()];
                !region.is_explored() && !region.in_flight
            })?;

        self.regions[child.index()].in_flight = true;
        self.regions[parent.index()].idle_children -= 1;
        self.in_flight += 1;
        Some((child, self.regions[child.index()].area))
    }

    /// Record a count for a region and fold it into its parent. Returns
    /// `false` when the region was already explored.
    pub fn mark_explored(
        &mut self,
        id: RegionId,
        count: u64,
    ) -> Result<bool, TreeError> {
        let region = self.get(id)?;
        if region.is_explored() {
            self.duplicates += 1;
            tracing::debug!(
                target: "trove::search",
                region = %id,
                count,
                "duplicate result ignored"
            );
            return Ok(false);
        }

        let cells = region.area.cells();
        let parent = region.parent;
        let was_in_flight = region.in_flight;

        if let Some(parent_id) = parent {
            let parent = &self.regions[parent_id.index()];
            let explored = parent.explored_child_count + count;
            let actual = parent.actual.unwrap_or(0);
            if explored > actual {
                return Err(TreeError::CountOverflow {
                    parent: parent_id,
                    explored,
                    actual,
                });
            }
        }

        let region = &mut self.regions[id.index()];
        region.actual = Some(count);
        region.in_flight = false;
        if was_in_flight {
            self.in_flight -= 1;
        }

        if let Some(parent_id) = parent {
            let parent = &mut self.regions[parent_id.index()];
            parent.explored_child_count += count;
            parent.unexplored_child_area =
                parent.unexplored_child_area.saturating_sub(cells);
            parent.unexplored_children -= 1;
            if !was_in_flight {
                parent.idle_children -= 1;
            }
            self.refresh_frontier(parent_id);
        }
        Ok(true)
    }

    /// Resolve the only unexplored child of `parent` from the parent's
    /// remaining count, if there is exactly one and it is idle.
    pub fn deduce_last_sibling(
        &mut self,
        parent: RegionId,
    ) -> Result<Option<(RegionId, u64)>, TreeError> {
        let region = self.get(parent)?;
        if region.unexplored_children != 1 {
            return Ok(None);
        }
        let remaining = region.remaining();
        let Some(child) = self.idle_children_of(parent).next() else {
            return Ok(None);
        };
        self.mark_explored(child, remaining)?;
        Ok(Some((child, remaining)))
    }

    /// Return an in-flight region to the idle pool, for probes that will
    /// never be answered.
    pub fn release(&mut self, id: RegionId) -> Result<Resolution, TreeError> {
        let region = self.get(id)?;
        let mut resolution = Resolution::default();
        if !region.in_flight {
            return Ok(resolution);
        }
        let parent = region.parent;

        self.regions[id.index()].in_flight = false;
        self.in_flight -= 1;
        if let Some(parent_id) = parent {
            self.regions[parent_id.index()].idle_children += 1;
            self.refresh_frontier(parent_id);
            let deduced = self.settle_siblings(parent_id, &mut resolution)?;
            self.settle(deduced, &mut resolution)?;
        }
        Ok(resolution)
    }

    /// Work through freshly explored regions: prune, report cells,
    /// subdivide, and deduce whatever the new counts determine.
    fn settle(
        &mut self,
        mut work: Vec<RegionId>,
        resolution: &mut Resolution,
    ) -> Result<(), TreeError> {
        while let Some(id) = work.pop() {
            let region = &self.regions[id.index()];
            let count = region.actual.unwrap_or(0);
            let area = region.area;
            let parent = region.parent;

            if count == 0 {
                resolution.pruned += 1;
            } else if area.cells() == 1 {
                resolution.cells.push(TreasureCell {
                    x: area.x,
                    y: area.y,
                    amount: count,
                });
            } else if let Subdivision::Single(child) = self.subdivide(id)? {
                self.mark_explored(child, count)?;
                resolution.deduced += 1;
                resolution.explored_cells += self.regions[child.index()].area.cells();
                work.push(child);
            }

            if let Some(parent) = parent {
                work.extend(self.settle_siblings(parent, resolution)?);
            }
        }
        Ok(())
    }

    /// Deduce the idle children of `parent` whose counts are now forced:
    /// every idle child once nothing remains, or the single unexplored one.
    fn settle_siblings(
        &mut self,
        parent: RegionId,
        resolution: &mut Resolution,
    ) -> Result<Vec<RegionId>, TreeError> {
        let region = &self.regions[parent.index()];
        let remaining = region.remaining();
        let forced: Vec<(RegionId, u64)> = if region.unexplored_children == 0 {
            Vec::new()
        } else if remaining == 0 {
            self.idle_children_of(parent).map(|id| (id, 0)).collect()
        } else if region.unexplored_children == 1 {
            self.idle_children_of(parent)
                .take(1)
                .map(|id| (id, remaining))
                .collect()
        } else {
            Vec::new()
        };

        let mut deduced = Vec::with_capacity(forced.len());
        for (sibling, count) in forced {
            if self.mark_explored(sibling, count)? {
                resolution.deduced += 1;
                resolution.explored_cells +=
                    self.regions[sibling.index()].area.cells();
                deduced.push(sibling);
            }
        }
        Ok(deduced)
    }

    fn idle_children_of(
        &self,
        parent: RegionId,
    ) -> impl Iterator<Item = RegionId> + '_ {
        self.regions[parent.index()]
            .children
            .iter()
            .copied()
            .filter(|child| {
                let region = &self.regions[child.index()];
                !region.is_explored() && !region.in_flight
            })
    }

    /// Re-key a region in the frontier after its counts changed.
    fn refresh_frontier(&mut self, id: RegionId) {
        let region = &mut self.regions[id.index()];
        if let Some(key) = region.frontier_key.take() {
            self.frontier.remove(&(Reverse(key), id));
        }
        if region.remaining() > 0 && region.idle_children > 0 {
            let key = OrderedFloat(region.density());
            region.frontier_key = Some(key);
            self.frontier.insert((Reverse(key), id));
        }
    }

    fn push(&mut self, region: Region) -> RegionId {
        let id = RegionId::new(self.regions.len() as u32);
        self.regions.push(region);
        id
    }

    fn get(&self, id: RegionId) -> Result<&Region, TreeError> {
        self.regions
            .get(id.index())
            .ok_or(TreeError::UnknownRegion(id))
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.index())
    }

    pub fn root(&self) -> Option<RegionId> {
        self.root
    }

    /// Regions handed out by [`RegionTree::frontier_next`] and not yet
    /// resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn duplicate_results(&self) -> u64 {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Seeded, nothing left to probe and nothing awaiting a result.
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.frontier.is_empty() && self.in_flight == 0
    }
}
