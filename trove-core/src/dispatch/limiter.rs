//! Sliding-window cost limiter shared by dispatcher workers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Caps the summed cost of calls started within any one-second window.
///
/// A single call costing more than the cap is admitted once the window is
/// empty, otherwise it could never run.
pub struct CostLimiter {
    max_per_window: u64,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    spent: VecDeque<(Instant, u64)>,
    total: u64,
}

impl WindowState {
    fn evict(&mut self, now: Instant) {
        while let Some(&(at, cost)) = self.spent.front() {
            if now.duration_since(at) < WINDOW {
                break;
            }
            self.spent.pop_front();
            self.total -= cost;
        }
    }
}

impl fmt::Debug for CostLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CostLimiter");
        debug.field("max_per_window", &self.max_per_window);

        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("in_window", &state.total)
                    .field("entries", &state.spent.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }

        debug.finish()
    }
}

impl CostLimiter {
    pub fn new(max_per_window: u64) -> Self {
        Self {
            max_per_window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Record `cost` without waiting if it fits in the current window.
    pub fn try_acquire(&self, cost: u64) -> Result<(), Duration> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.evict(now);

        let fits = state.total.saturating_add(cost) <= self.max_per_window;
        if fits || state.spent.is_empty() {
            state.spent.push_back((now, cost));
            state.total += cost;
            return Ok(());
        }

        let oldest = state.spent.front().map(|(at, _)| *at).unwrap_or(now);
        Err((oldest + WINDOW).saturating_duration_since(now))
    }

    /// Wait until `cost` fits in the window, then record it.
    pub async fn acquire(&self, cost: u64) {
        while let Err(wait) = self.try_acquire(cost) {
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    pub fn in_window(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.evict(Instant::now());
        state.total
    }
}
