use std::any::type_name;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{CostLimiter, DispatchError, PendingQueue};
use crate::config::DispatcherConfig;
use crate::context::RunContext;
use crate::request::{ApiRequest, ApiResponse, RequestKind};
use crate::stats::RunStats;
use crate::transport::Transport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the submitting side and the workers.
struct Shared {
    pending: Mutex<PendingQueue>,
    generic_ready: Notify,
    lane_ready: [Notify; RequestKind::COUNT],
    dedicated: [bool; RequestKind::COUNT],
    completed: Mutex<VecDeque<ApiResponse>>,
    completed_ready: Notify,
    shutdown: CancellationToken,
    stats: Arc<RunStats>,
    limiter: Option<CostLimiter>,
}

impl Shared {
    fn ready_signal(&self, lane: Option<RequestKind>) -> &Notify {
        match lane {
            Some(kind) => &self.lane_ready[kind.index()],
            None => &self.generic_ready,
        }
    }

    fn take_next(&self, lane: Option<RequestKind>) -> Option<ApiRequest> {
        let mut pending = lock(&self.pending);
        match lane {
            Some(kind) => pending.pop_kind(kind),
            None => pending.pop(),
        }
    }

    fn publish(&self, response: ApiResponse) {
        lock(&self.completed).push_back(response);
        self.completed_ready.notify_one();
    }

    fn wake_all(&self) {
        self.generic_ready.notify_waiters();
        for signal in &self.lane_ready {
            signal.notify_waiters();
        }
        self.completed_ready.notify_waiters();
    }
}

/// Multi-worker pipeline turning logical requests into transport calls.
///
/// `submit` never blocks; results are drained by a single consumer through
/// [`Dispatcher::next_result`]. Workers are spawned by [`Dispatcher::start`]
/// so callers can queue an initial batch before anything is sent.
pub struct Dispatcher<T: Transport> {
    shared: Arc<Shared>,
    transport: Arc<T>,
    config: DispatcherConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .shared
            .pending
            .try_lock()
            .map(|queue| queue.len())
            .unwrap_or_default();
        let completed = self
            .shared
            .completed
            .try_lock()
            .map(|queue| queue.len())
            .unwrap_or_default();
        let worker_count = self
            .workers
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();

        f.debug_struct("Dispatcher")
            .field("transport_type", &type_name::<T>())
            .field("config", &self.config)
            .field("pending", &pending)
            .field("completed", &completed)
            .field("worker_count", &worker_count)
            .field("limiter", &self.shared.limiter)
            .field("shutdown_cancelled", &self.shared.shutdown.is_cancelled())
            .finish()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Build a dispatcher whose shutdown also follows the run's stop signal.
    pub fn new(ctx: &RunContext, transport: Arc<T>) -> Self {
        let config = ctx.config.dispatcher.clone();
        let mut dedicated = [false; RequestKind::COUNT];
        for kind in RequestKind::ALL {
            dedicated[kind.index()] = config.dedicated_for(kind) > 0;
        }

        let shared = Shared {
            pending: Mutex::new(PendingQueue::new(
                config.queue_capacity,
                config.priorities,
            )),
            generic_ready: Notify::new(),
            lane_ready: Default::default(),
            dedicated,
            completed: Mutex::new(VecDeque::new()),
            completed_ready: Notify::new(),
            shutdown: ctx.shutdown.child_token(),
            stats: Arc::clone(&ctx.stats),
            limiter: config.max_cost_per_second.map(CostLimiter::new),
        };

        Self {
            shared: Arc::new(shared),
            transport,
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the generic pool and any dedicated per-kind workers. Calling
    /// this twice is a no-op.
    pub fn start(&self) {
        let mut handles = lock(&self.workers);
        if !handles.is_empty() {
            return;
        }

        let group = std::process::id();
        for i in 0..self.config.workers {
            let worker_id = format!("dispatch-{group}-w{i}");
            handles.push(self.spawn_worker(None, worker_id));
        }
        for (kind, count) in &self.config.dedicated_workers {
            for i in 0..*count {
                let worker_id = format!("dispatch-{group}-{kind}-w{i}");
                handles.push(self.spawn_worker(Some(*kind), worker_id));
            }
        }

        tracing::info!(
            target: "trove::dispatch",
            workers = handles.len(),
            capacity = self.config.queue_capacity,
            rate_limited = self.shared.limiter.is_some(),
            "dispatcher started"
        );
    }

    fn spawn_worker(
        &self,
        lane: Option<RequestKind>,
        worker_id: String,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(run_worker(shared, transport, lane, worker_id))
    }

    /// Queue a request. Fails fast when the queue is full or stopping.
    pub fn submit(&self, request: ApiRequest) -> Result<(), DispatchError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown {
                request: Box::new(request),
            });
        }

        let kind = request.kind();
        {
            let mut pending = lock(&self.shared.pending);
            if let Err(request) = pending.push(request) {
                self.shared.stats.record_queue_rejection();
                return Err(DispatchError::QueueFull {
                    capacity: pending.capacity(),
                    request: Box::new(request),
                });
            }
        }

        self.shared.stats.record_submitted(kind);
        self.shared.generic_ready.notify_one();
        if self.shared.dedicated[kind.index()] {
            self.shared.lane_ready[kind.index()].notify_one();
        }
        Ok(())
    }

    /// Wait for the next completed response. Returns `None` once the
    /// dispatcher is shutting down.
    pub async fn next_result(&self) -> Option<ApiResponse> {
        loop {
            let notified = self.shared.completed_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.shutdown.is_cancelled() {
                return None;
            }
            if let Some(response) = lock(&self.shared.completed).pop_front() {
                return Some(response);
            }

            tokio::select! {
                _ = self.shared.shutdown.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn pending_depth(&self, kind: RequestKind) -> usize {
        lock(&self.shared.pending).depth(kind)
    }

    pub fn completed_len(&self) -> usize {
        lock(&self.shared.completed).len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Stop accepting work, wake every waiter and join all workers. Calls
    /// already in flight run to completion first.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.wake_all();

        let handles = std::mem::take(&mut *lock(&self.workers));
        let joined = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(
                    target: "trove::dispatch",
                    "dispatch worker failed: {:?}",
                    e
                );
            }
        }

        tracing::info!(
            target: "trove::dispatch",
            workers = joined,
            abandoned = self.pending_len(),
            "dispatcher stopped"
        );
    }
}

async fn run_worker<T: Transport>(
    shared: Arc<Shared>,
    transport: Arc<T>,
    lane: Option<RequestKind>,
    worker_id: String,
) {
    loop {
        let notified = shared.ready_signal(lane).notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if shared.shutdown.is_cancelled() {
            break;
        }

        let Some(request) = shared.take_next(lane) else {
            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                _ = &mut notified => continue,
            }
        };

        if let Some(limiter) = &shared.limiter {
            limiter.acquire(request.cost()).await;
        }

        let kind = request.kind();
        tracing::trace!(
            target: "trove::dispatch",
            worker = %worker_id,
            kind = %kind,
            cost = request.cost(),
            "sending request"
        );

        let outcome = request.execute(transport.as_ref()).await;
        shared.stats.record_outcome(kind, &outcome);

        tracing::trace!(
            target: "trove::dispatch",
            worker = %worker_id,
            kind = %kind,
            status = ?outcome.status(),
            latency = ?outcome.latency(),
            "request finished"
        );

        shared.publish(ApiResponse { request, outcome });
    }

    tracing::debug!(
        target: "trove::dispatch",
        worker = %worker_id,
        "worker shutting down"
    );
}
