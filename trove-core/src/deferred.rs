//! Digs waiting for a permit.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A dig that could not be sent for lack of a permit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeferredDig {
    pub x: i32,
    pub y: i32,
    pub depth: u8,
}

#[derive(Debug, Eq, PartialEq)]
struct Entry {
    dig: DeferredDig,
    sequence: u64, // FIFO among equal depths
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Deeper first, then earlier sequence
        match self.dig.depth.cmp(&other.dig.depth) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Deepest-first queue, so extractions already under way finish before
/// new cells are started.
#[derive(Debug, Default)]
pub struct DeferredDigQueue {
    heap: BinaryHeap<Entry>,
    sequence: u64,
}

impl DeferredDigQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, x: i32, y: i32, depth: u8) {
        self.heap.push(Entry {
            dig: DeferredDig { x, y, depth },
            sequence: self.sequence,
        });
        self.sequence += 1;
    }

    pub fn has_pending(&self) -> bool {
        !self.heap.is_empty()
    }

    pub fn dequeue_deepest_first(&mut self) -> Option<DeferredDig> {
        self.heap.pop().map(|entry| entry.dig)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
