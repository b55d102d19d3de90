use std::cmp::Reverse;
use std::collections::VecDeque;

use crate::request::{ApiRequest, PriorityTable, RequestKind};

#[derive(Debug)]
struct Queued {
    request: ApiRequest,
    sequence: u64, // arrival order across lanes
}

/// Bounded set of pending requests, one FIFO lane per request kind.
///
/// `pop` serves the lane with the highest rank; among lanes of equal rank
/// the head that arrived first wins, so ordering is (rank, arrival).
#[derive(Debug)]
pub struct PendingQueue {
    lanes: [VecDeque<Queued>; RequestKind::COUNT],
    priorities: PriorityTable,
    capacity: usize,
    len: usize,
    sequence: u64,
}

impl PendingQueue {
    pub fn new(capacity: usize, priorities: PriorityTable) -> Self {
        Self {
            lanes: Default::default(),
            priorities,
            capacity,
            len: 0,
            sequence: 0,
        }
    }

    /// Add a request, handing it back when the queue is at capacity.
    pub fn push(&mut self, request: ApiRequest) -> Result<(), ApiRequest> {
        if self.len >= self.capacity {
            return Err(request);
        }
        let lane = request.kind().index();
        self.lanes[lane].push_back(Queued {
            request,
            sequence: self.sequence,
        });
        self.sequence += 1;
        self.len += 1;
        Ok(())
    }

    /// Remove the highest-priority request.
    pub fn pop(&mut self) -> Option<ApiRequest> {
        let mut best: Option<(u8, u64, usize)> = None;
        for kind in RequestKind::ALL {
            let Some(head) = self.lanes[kind.index()].front() else {
                continue;
            };
            let rank = self.priorities.rank(kind);
            let better = match best {
                None => true,
                Some((best_rank, best_seq, _)) => {
                    rank > best_rank
                        || (rank == best_rank && head.sequence < best_seq)
                }
            };
            if better {
                best = Some((rank, head.sequence, kind.index()));
            }
        }
        let (_, _, lane) = best?;
        self.take_from(lane)
    }

    /// Remove the oldest request of one kind.
    pub fn pop_kind(&mut self, kind: RequestKind) -> Option<ApiRequest> {
        self.take_from(kind.index())
    }

    fn take_from(&mut self, lane: usize) -> Option<ApiRequest> {
        let queued = self.lanes[lane].pop_front()?;
        self.len -= 1;
        Some(queued.request)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn depth(&self, kind: RequestKind) -> usize {
        self.lanes[kind.index()].len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Unbounded overflow for requests the dispatcher turned away.
///
/// Kinds drain in priority order and each kind in arrival order, so a
/// parked conversion never waits behind parked probes.
#[derive(Debug)]
pub struct Backlog {
    lanes: [VecDeque<ApiRequest>; RequestKind::COUNT],
    order: [RequestKind; RequestKind::COUNT],
    len: usize,
}

impl Backlog {
    pub fn new(priorities: PriorityTable) -> Self {
        let mut order = RequestKind::ALL;
        order.sort_by_key(|kind| Reverse(priorities.rank(*kind)));
        Self {
            lanes: Default::default(),
            order,
            len: 0,
        }
    }

    pub fn push(&mut self, request: ApiRequest) {
        self.lanes[request.kind().index()].push_back(request);
        self.len += 1;
    }

    /// Put back a request that was just popped but could not be sent.
    pub fn push_front(&mut self, request: ApiRequest) {
        self.lanes[request.kind().index()].push_front(request);
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<ApiRequest> {
        let request = self
            .order
            .iter()
            .find_map(|kind| self.lanes[kind.index()].pop_front())?;
        self.len -= 1;
        Some(request)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn depth(&self, kind: RequestKind) -> usize {
        self.lanes[kind.index()].len()
    }
}
