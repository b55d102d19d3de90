//! The single control loop that turns responses into follow-up work.
//!
//! The orchestrator owns the region tree, permit ledger, deferred digs and
//! per-cell remaining counts by value. Workers only ever see requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::{ExtractionConfig, SearchConfig};
use crate::context::RunContext;
use crate::deferred::DeferredDigQueue;
use crate::dispatch::{Backlog, DispatchError, Dispatcher};
use crate::ledger::{LedgerError, Permit, PermitLedger};
use crate::model::{ApiError, Area, CoinId, ExploreReport, License, TreasureId};
use crate::request::{ApiOutcome, ApiRequest, ApiResponse, DigRequest, RequestKind};
use crate::search::{RegionId, RegionTree, TreasureCell, TreeError};
use crate::stats::{RunStats, StatsSnapshot};
use crate::transport::{CallResult, Reply, Transport, TransportError};

/// Conditions that end a run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{request} request answered with a {outcome} outcome")]
    MismatchedResponse {
        request: RequestKind,
        outcome: &'static str,
    },

    #[error("{kind} request failed: {source}")]
    Transport {
        kind: RequestKind,
        #[source]
        source: TransportError,
    },

    #[error("permit issuance rejected with {status}: {error}")]
    PermitRejected { status: StatusCode, error: ApiError },

    #[error("dig at ({x}, {y}) depth {depth} answered with {status}: {error}")]
    UnexpectedDigStatus {
        x: i32,
        y: i32,
        depth: u8,
        status: StatusCode,
        error: ApiError,
    },

    #[error("cashing {treasure} rejected with {status}: {error}")]
    CashRejected {
        treasure: TreasureId,
        status: StatusCode,
        error: ApiError,
    },

    #[error(
        "dig at ({x}, {y}) returned {found} treasures but only {expected} were left"
    )]
    RemainingUnderflow {
        x: i32,
        y: i32,
        found: u64,
        expected: u64,
    },

    #[error("search stalled with {frontier} regions on the frontier")]
    SearchStalled { frontier: usize },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Seeding,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// The whole field was resolved and nothing is left to send.
    Completed,
    /// The run's stop signal fired.
    Signalled,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub reason: StopReason,
    pub stats: StatsSnapshot,
}

pub struct Orchestrator<T: Transport> {
    dispatcher: Dispatcher<T>,
    tree: RegionTree,
    ledger: PermitLedger,
    deferred: DeferredDigQueue,
    /// Treasure still buried per cell being dug.
    remaining: HashMap<(i32, i32), u64>,
    /// Requests the dispatcher turned away, sent before the next wait.
    backlog: Backlog,
    /// Accepted or parked requests whose response has not been handled.
    outstanding: usize,
    search: SearchConfig,
    extraction: ExtractionConfig,
    stats: Arc<RunStats>,
    state: RunState,
}

impl<T: Transport> fmt::Debug for Orchestrator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("dispatcher", &self.dispatcher)
            .field("regions", &self.tree.len())
            .field("frontier", &self.tree.frontier_len())
            .field("probes_in_flight", &self.tree.in_flight())
            .field("permits_in_use", &self.ledger.in_use_count())
            .field("coins", &self.ledger.coin_count())
            .field("deferred", &self.deferred.len())
            .field("cells_in_progress", &self.remaining.len())
            .field("backlog", &self.backlog.len())
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(ctx: &RunContext, transport: Arc<T>) -> Self {
        let config = ctx.config();
        Self {
            dispatcher: Dispatcher::new(ctx, transport),
            tree: RegionTree::new(config.search.shapes.clone()),
            ledger: PermitLedger::new(config.extraction.max_permits),
            deferred: DeferredDigQueue::new(),
            remaining: HashMap::new(),
            backlog: Backlog::new(config.dispatcher.priorities),
            outstanding: 0,
            search: config.search.clone(),
            extraction: config.extraction,
            stats: Arc::clone(&ctx.stats),
            state: RunState::Seeding,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn tree(&self) -> &RegionTree {
        &self.tree
    }

    pub fn ledger(&self) -> &PermitLedger {
        &self.ledger
    }

    /// Seed, then process responses until the field is exhausted, the stop
    /// signal fires, or a fatal condition is hit. Workers are joined before
    /// this returns.
    pub async fn run(&mut self) -> Result<RunSummary, OrchestratorError> {
        self.dispatcher.start();
        let outcome = match self.seed() {
            Ok(()) => {
                self.state = RunState::Running;
                self.drive().await
            }
            Err(e) => Err(e),
        };

        self.state = RunState::Stopped;
        self.dispatcher.shutdown().await;
        self.publish_gauges();

        let reason = outcome?;
        tracing::info!(
            target: "trove::extract",
            reason = ?reason,
            duplicates = self.tree.duplicate_results(),
            "run finished"
        );
        Ok(RunSummary {
            reason,
            stats: self.stats.snapshot(),
        })
    }

    async fn drive(&mut self) -> Result<StopReason, OrchestratorError> {
        loop {
            self.flush_backlog();
            if self.is_finished() {
                return Ok(StopReason::Completed);
            }

            let Some(response) = self.dispatcher.next_result().await else {
                return Ok(StopReason::Signalled);
            };
            self.outstanding = self.outstanding.saturating_sub(1);
            self.handle(response)?;
            self.publish_gauges();
        }
    }

    fn seed(&mut self) -> Result<(), OrchestratorError> {
        let field = self.search.field();
        let seeded = self.tree.seed(field, self.search.assumed_treasures)?;
        self.stats.record_deduced(seeded.deduced);
        self.stats.record_pruned(seeded.pruned);

        tracing::info!(
            target: "trove::search",
            field = %field,
            treasures = self.search.assumed_treasures,
            regions = self.tree.len(),
            "field seeded"
        );

        for _ in 0..self.ledger.slot_count() {
            self.request_permit();
        }
        self.submit(ApiRequest::Health);
        self.schedule_cells(seeded.cells);
        self.top_up_probes()
    }

    fn is_finished(&self) -> bool {
        self.outstanding == 0
            && self.backlog.is_empty()
            && !self.deferred.has_pending()
            && self.tree.is_complete()
    }

    fn handle(&mut self, response: ApiResponse) -> Result<(), OrchestratorError> {
        let ApiResponse { request, outcome } = response;
        if outcome.is_timeout() {
            tracing::debug!(
                target: "trove::dispatch",
                kind = %request.kind(),
                "request timed out, resending"
            );
            self.resubmit(request);
            return Ok(());
        }

        match (request, outcome) {
            (ApiRequest::Health, ApiOutcome::Health(result)) => {
                self.on_health(result)
            }
            (ApiRequest::Explore { region, area }, ApiOutcome::Explore(result)) => {
                self.on_explore(region, area, result)
            }
            (
                request @ (ApiRequest::IssueFreeLicense
                | ApiRequest::IssuePaidLicense { .. }),
                ApiOutcome::License(result),
            ) => self.on_license(request, result),
            (ApiRequest::Dig(dig), ApiOutcome::Dig(result)) => self.on_dig(dig, result),
            (ApiRequest::Cash { treasure, depth }, ApiOutcome::Cash(result)) => {
                self.on_cash(treasure, depth, result)
            }
            (request, outcome) => Err(OrchestratorError::MismatchedResponse {
                request: request.kind(),
                outcome: outcome.label(),
            }),
        }
    }

    fn on_health(
        &mut self,
        result: CallResult<String>,
    ) -> Result<(), OrchestratorError> {
        let reply = unwrap_transport(RequestKind::Health, result)?;
        tracing::info!(
            target: "trove::dispatch",
            status = %reply.status,
            latency = ?reply.latency,
            "service health checked"
        );
        Ok(())
    }

    fn on_explore(
        &mut self,
        region: RegionId,
        area: Area,
        result: CallResult<ExploreReport>,
    ) -> Result<(), OrchestratorError> {
        let reply = unwrap_transport(RequestKind::Explore, result)?;
        let report = match reply.into_success() {
            Ok(report) => report,
            Err((status, error)) => {
                tracing::debug!(
                    target: "trove::search",
                    region = %region,
                    %status,
                    code = error.code,
                    "probe failed, resending"
                );
                self.resubmit(ApiRequest::Explore { region, area });
                return Ok(());
            }
        };

        self.apply_probe(region, u64::from(report.amount))?;
        self.top_up_probes()
    }

    fn apply_probe(
        &mut self,
        region: RegionId,
        amount: u64,
    ) -> Result<(), OrchestratorError> {
        let resolution = self.tree.resolve(region, amount)?;
        if resolution.duplicate {
            self.stats.record_duplicate();
            return Ok(());
        }

        self.stats.record_explored(resolution.explored_cells);
        self.stats.record_deduced(resolution.deduced);
        self.stats.record_pruned(resolution.pruned);
        tracing::trace!(
            target: "trove::search",
            region = %region,
            amount,
            cells = resolution.cells.len(),
            deduced = resolution.deduced,
            "probe resolved"
        );
        self.schedule_cells(resolution.cells);
        Ok(())
    }

    /// Keep `explore_concurrency` probes in flight.
    fn top_up_probes(&mut self) -> Result<(), OrchestratorError> {
        if self.dispatcher.is_shutting_down() {
            return Ok(());
        }
        while self.tree.in_flight() < self.search.explore_concurrency {
            let Some((region, area)) = self.tree.frontier_next() else {
                break;
            };
            self.submit(ApiRequest::Explore { region, area });
        }

        if self.tree.in_flight() == 0 && self.tree.frontier_len() > 0 {
            return Err(OrchestratorError::SearchStalled {
                frontier: self.tree.frontier_len(),
            });
        }
        Ok(())
    }

    fn on_license(
        &mut self,
        request: ApiRequest,
        result: CallResult<License>,
    ) -> Result<(), OrchestratorError> {
        let reply = unwrap_transport(request.kind(), result)?;
        let license = match reply.into_success() {
            Ok(license) => license,
            Err((status, error)) if status.is_client_error() => {
                return Err(OrchestratorError::PermitRejected { status, error });
            }
            Err((status, _)) => {
                tracing::debug!(
                    target: "trove::extract",
                    %status,
                    "permit issuance failed, resending"
                );
                self.resubmit(request);
                return Ok(());
            }
        };

        let paid = matches!(request, ApiRequest::IssuePaidLicense { .. });
        let spent = Permit::from(license).is_exhausted();
        self.ledger.issue(license)?;
        self.stats.record_permit_issued(paid);
        if spent {
            // Never confirmed, so it would never be replaced.
            self.request_permit();
        }
        tracing::debug!(
            target: "trove::extract",
            permit = %license.id,
            allowed = license.dig_allowed,
            paid,
            "permit issued"
        );
        self.drain_deferred();
        Ok(())
    }

    /// Send deferred digs while permits have attempts left.
    fn drain_deferred(&mut self) {
        while self.deferred.has_pending() && self.ledger.has_available_permit() {
            let Some(dig) = self.deferred.dequeue_deepest_first() else {
                break;
            };
            self.schedule_dig(dig.x, dig.y, dig.depth);
        }
    }

    fn on_dig(
        &mut self,
        dig: DigRequest,
        result: CallResult<Vec<TreasureId>>,
    ) -> Result<(), OrchestratorError> {
        let reply = unwrap_transport(RequestKind::Dig, result)?;
        let status = reply.status;
        if status != StatusCode::OK && status != StatusCode::NOT_FOUND {
            let error = reply.body.err().unwrap_or_else(ApiError::unknown);
            return Err(OrchestratorError::UnexpectedDigStatus {
                x: dig.x,
                y: dig.y,
                depth: dig.depth,
                status,
                error,
            });
        }

        if self.ledger.confirm_attempt(dig.license_id)? {
            self.request_permit();
        }

        if status == StatusCode::NOT_FOUND {
            self.schedule_dig(dig.x, dig.y, dig.depth.saturating_add(1));
            return Ok(());
        }

        let treasures = match reply.body {
            Ok(treasures) => treasures,
            Err(error) => {
                return Err(OrchestratorError::UnexpectedDigStatus {
                    x: dig.x,
                    y: dig.y,
                    depth: dig.depth,
                    status,
                    error,
                });
            }
        };
        self.collect(dig, treasures)
    }

    fn collect(
        &mut self,
        dig: DigRequest,
        treasures: Vec<TreasureId>,
    ) -> Result<(), OrchestratorError> {
        let found = treasures.len() as u64;
        self.stats.record_treasures(dig.depth, found);

        for treasure in treasures {
            if dig.depth >= self.extraction.min_depth_to_convert {
                self.submit(ApiRequest::Cash {
                    treasure,
                    depth: dig.depth,
                });
            } else {
                self.stats.record_conversion_skipped();
            }
        }

        let cell = (dig.x, dig.y);
        let expected = self.remaining.get(&cell).copied().unwrap_or(0);
        let left = expected.checked_sub(found).ok_or(
            OrchestratorError::RemainingUnderflow {
                x: dig.x,
                y: dig.y,
                found,
                expected,
            },
        )?;

        tracing::trace!(
            target: "trove::extract",
            x = dig.x,
            y = dig.y,
            depth = dig.depth,
            found,
            left,
            "dig answered"
        );

        if left > 0 {
            self.remaining.insert(cell, left);
            self.schedule_dig(dig.x, dig.y, dig.depth.saturating_add(1));
        } else {
            self.remaining.remove(&cell);
        }
        Ok(())
    }

    fn on_cash(
        &mut self,
        treasure: TreasureId,
        depth: u8,
        result: CallResult<Vec<CoinId>>,
    ) -> Result<(), OrchestratorError> {
        let reply = unwrap_transport(RequestKind::Cash, result)?;
        match reply.into_success() {
            Ok(coins) => {
                self.stats.record_coins(coins.len() as u64);
                self.ledger.add_currency(coins);
                Ok(())
            }
            Err((status, _)) if status.is_server_error() => {
                self.resubmit(ApiRequest::Cash { treasure, depth });
                Ok(())
            }
            Err((status, error)) => Err(OrchestratorError::CashRejected {
                treasure,
                status,
                error,
            }),
        }
    }

    fn schedule_cells(&mut self, cells: Vec<TreasureCell>) {
        for cell in cells {
            self.remaining.insert((cell.x, cell.y), cell.amount);
            self.schedule_dig(cell.x, cell.y, 1);
        }
    }

    /// Send a dig if a permit has room, otherwise defer it.
    fn schedule_dig(&mut self, x: i32, y: i32, depth: u8) {
        if depth > self.extraction.max_dig_depth {
            let left = self.remaining.remove(&(x, y)).unwrap_or(0);
            self.stats.record_abandoned_cell();
            tracing::warn!(
                target: "trove::extract",
                x,
                y,
                depth,
                left,
                "cell abandoned past the maximum dig depth"
            );
            return;
        }

        match self.ledger.reserve() {
            Ok(license_id) => self.submit(ApiRequest::Dig(DigRequest {
                license_id,
                x,
                y,
                depth,
            })),
            Err(_) => self.deferred.enqueue(x, y, depth),
        }
    }

    fn request_permit(&mut self) {
        let request = self.ledger.next_issuance();
        self.submit(request);
    }

    fn resubmit(&mut self, request: ApiRequest) {
        self.stats.record_resubmitted(request.kind());
        self.submit(request);
    }

    fn submit(&mut self, request: ApiRequest) {
        self.outstanding += 1;
        if self.backlog.is_empty() {
            if let Err(e) = self.dispatcher.submit(request) {
                self.park(e);
            }
            return;
        }
        // Parked work goes first, highest priority first.
        self.backlog.push(request);
        self.flush_backlog();
    }

    fn park(&mut self, error: DispatchError) {
        match error {
            DispatchError::QueueFull { request, .. } => self.backlog.push(*request),
            DispatchError::ShuttingDown { request } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if let ApiRequest::Explore { region, .. } = *request {
                    self.release_probe(region);
                }
            }
        }
    }

    /// Return a probe that will never be sent. This only happens while
    /// stopping, so deduced cells are counted but not dug.
    fn release_probe(&mut self, region: RegionId) {
        match self.tree.release(region) {
            Ok(resolution) => {
                self.stats.record_explored(resolution.explored_cells);
                self.stats.record_deduced(resolution.deduced);
                self.stats.record_pruned(resolution.pruned);
                if !resolution.cells.is_empty() {
                    tracing::debug!(
                        target: "trove::search",
                        region = %region,
                        cells = resolution.cells.len(),
                        "cells deduced while stopping are left buried"
                    );
                }
            }
            Err(e) => tracing::warn!(
                target: "trove::search",
                region = %region,
                "failed to release probe: {}",
                e
            ),
        }
    }

    /// Move parked requests into the dispatcher until it is full again.
    fn flush_backlog(&mut self) {
        while let Some(request) = self.backlog.pop() {
            match self.dispatcher.submit(request) {
                Ok(()) => {}
                Err(DispatchError::QueueFull { request, .. }) => {
                    self.backlog.push_front(*request);
                    break;
                }
                Err(e) => self.park(e),
            }
        }
    }

    fn publish_gauges(&self) {
        self.stats.set_permits_in_use(self.ledger.in_use_count());
        self.stats.set_coin_balance(self.ledger.coin_count());
    }
}

/// Treat transport failures other than timeouts as fatal.
fn unwrap_transport<R>(
    kind: RequestKind,
    result: CallResult<R>,
) -> Result<Reply<R>, OrchestratorError> {
    result.map_err(|source| OrchestratorError::Transport { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegionShape, TroveConfig};
    use crate::model::PermitId;
    use crate::transport::MockTransport;

    fn orchestrator(configure: impl FnOnce(&mut TroveConfig)) -> Orchestrator<MockTransport> {
        orchestrator_in(configure).1
    }

    fn orchestrator_in(
        configure: impl FnOnce(&mut TroveConfig),
    ) -> (RunContext, Orchestrator<MockTransport>) {
        let mut config = TroveConfig::default();
        config.extraction.max_permits = 1;
        config.dispatcher.queue_capacity = 64;
        configure(&mut config);
        let ctx = RunContext::new(config);
        let orch = Orchestrator::new(&ctx, Arc::new(MockTransport::new()));
        (ctx, orch)
    }

    fn license_reply(license: License) -> ApiResponse {
        ApiResponse {
            request: ApiRequest::IssueFreeLicense,
            outcome: ApiOutcome::License(Ok(Reply::ok(license))),
        }
    }

    fn license(id: u64, allowed: u32) -> License {
        License {
            id: PermitId(id),
            dig_allowed: allowed,
            dig_used: 0,
        }
    }

    fn dig(license: u64, x: i32, depth: u8) -> DigRequest {
        DigRequest {
            license_id: PermitId(license),
            x,
            y: 0,
            depth,
        }
    }

    fn dig_reply(request: DigRequest, reply: Reply<Vec<TreasureId>>) -> ApiResponse {
        ApiResponse {
            request: ApiRequest::Dig(request),
            outcome: ApiOutcome::Dig(Ok(reply)),
        }
    }

    fn treasure(name: &str) -> Reply<Vec<TreasureId>> {
        Reply::ok(vec![TreasureId::new(name)])
    }

    fn not_found() -> Reply<Vec<TreasureId>> {
        Reply::error(StatusCode::NOT_FOUND, ApiError::unknown())
    }

    #[test]
    fn fourth_dig_waits_for_a_reissued_permit() {
        let mut orch = orchestrator(|_| {});
        orch.ledger.issue(license(7, 3)).expect("slot free");

        for (x, depth) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            orch.remaining.insert((x, 0), 1);
            orch.schedule_dig(x, 0, depth);
        }
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 3);
        assert_eq!(orch.deferred.len(), 1);

        for (x, depth) in [(0, 1), (1, 2), (2, 3)] {
            orch.handle(dig_reply(dig(7, x, depth), treasure("gold")))
                .expect("dig handled");
        }
        assert_eq!(
            orch.dispatcher.pending_depth(RequestKind::IssueFreeLicense),
            1
        );
        assert_eq!(orch.deferred.len(), 1, "still waiting for the new permit");

        orch.handle(ApiResponse {
            request: ApiRequest::IssueFreeLicense,
            outcome: ApiOutcome::License(Ok(Reply::ok(license(8, 3)))),
        })
        .expect("permit installed");

        assert!(!orch.deferred.has_pending());
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 4);
        assert_eq!(orch.ledger.permit(PermitId(8)).map(|p| p.used), Some(1));
    }

    #[test]
    fn shallow_treasure_is_kept_and_deep_treasure_cashed() {
        let mut orch = orchestrator(|_| {});
        orch.ledger.issue(license(1, 5)).expect("slot free");
        orch.remaining.insert((0, 0), 2);
        orch.remaining.insert((1, 0), 1);
        orch.ledger.reserve().expect("attempt");
        orch.ledger.reserve().expect("attempt");

        orch.handle(dig_reply(dig(1, 0, 1), treasure("shallow")))
            .expect("depth 1");
        orch.handle(dig_reply(dig(1, 1, 2), treasure("deep")))
            .expect("depth 2");

        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Cash), 1);
        assert_eq!(orch.stats.snapshot().conversions_skipped, 1);
        assert_eq!(orch.remaining.get(&(0, 0)), Some(&1));
        assert!(!orch.remaining.contains_key(&(1, 0)));
        // The first cell still holds treasure, so digging continues.
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 1);
    }

    #[test]
    fn more_treasure_than_reported_is_fatal() {
        let mut orch = orchestrator(|_| {});
        orch.ledger.issue(license(1, 3)).expect("slot free");
        orch.remaining.insert((5, 0), 1);
        orch.ledger.reserve().expect("attempt");

        let reply = Reply::ok(vec![TreasureId::new("a"), TreasureId::new("b")]);
        let err = orch
            .handle(dig_reply(dig(1, 5, 1), reply))
            .expect_err("count went negative");
        assert!(matches!(
            err,
            OrchestratorError::RemainingUnderflow {
                found: 2,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn empty_dig_goes_deeper_until_the_limit() {
        let mut orch = orchestrator(|config| config.extraction.max_dig_depth = 2);
        orch.ledger.issue(license(1, 5)).expect("slot free");
        orch.remaining.insert((3, 0), 1);
        orch.ledger.reserve().expect("attempt");
        orch.ledger.reserve().expect("attempt");

        orch.handle(dig_reply(dig(1, 3, 1), not_found()))
            .expect("depth 1 empty");
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 1);

        orch.handle(dig_reply(dig(1, 3, 2), not_found()))
            .expect("depth 2 empty");
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 1);
        assert!(orch.remaining.is_empty());
        assert_eq!(orch.stats.snapshot().abandoned_cells, 1);
    }

    #[test]
    fn unexpected_dig_status_is_fatal() {
        let mut orch = orchestrator(|_| {});
        let reply = Reply::error(StatusCode::FORBIDDEN, ApiError::unknown());
        let err = orch
            .handle(dig_reply(dig(1, 0, 1), reply))
            .expect_err("403 ends the run");
        assert!(matches!(
            err,
            OrchestratorError::UnexpectedDigStatus {
                status: StatusCode::FORBIDDEN,
                ..
            }
        ));
    }

    #[test]
    fn timeouts_and_server_errors_are_resent() {
        let mut orch = orchestrator(|_| {});
        let probe = ApiRequest::Explore {
            region: RegionId::new(3),
            area: Area::new(0, 0, 2, 2),
        };
        orch.handle(ApiResponse {
            request: probe,
            outcome: ApiOutcome::Explore(Err(TransportError::Timeout)),
        })
        .expect("timeout is retried");
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Explore), 1);

        orch.handle(ApiResponse {
            request: ApiRequest::Cash {
                treasure: TreasureId::new("t"),
                depth: 3,
            },
            outcome: ApiOutcome::Cash(Ok(Reply::error(
                StatusCode::BAD_GATEWAY,
                ApiError::unknown(),
            ))),
        })
        .expect("5xx cash is retried");
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Cash), 1);

        orch.handle(ApiResponse {
            request: ApiRequest::IssueFreeLicense,
            outcome: ApiOutcome::License(Ok(Reply::error(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::unknown(),
            ))),
        })
        .expect("5xx issuance is retried");
        assert_eq!(
            orch.dispatcher.pending_depth(RequestKind::IssueFreeLicense),
            1
        );

        let snapshot = orch.stats.snapshot();
        assert_eq!(snapshot.requests[&RequestKind::Explore].resubmitted, 1);
        assert_eq!(snapshot.requests[&RequestKind::Cash].resubmitted, 1);
    }

    #[test]
    fn rejected_issuance_and_cash_are_fatal() {
        let mut orch = orchestrator(|_| {});
        let err = orch
            .handle(ApiResponse {
                request: ApiRequest::IssuePaidLicense { coin: CoinId(1) },
                outcome: ApiOutcome::License(Ok(Reply::error(
                    StatusCode::PAYMENT_REQUIRED,
                    ApiError::unknown(),
                ))),
            })
            .expect_err("4xx issuance");
        assert!(matches!(err, OrchestratorError::PermitRejected { .. }));

        let err = orch
            .handle(ApiResponse {
                request: ApiRequest::Cash {
                    treasure: TreasureId::new("fake"),
                    depth: 2,
                },
                outcome: ApiOutcome::Cash(Ok(Reply::error(
                    StatusCode::CONFLICT,
                    ApiError::unknown(),
                ))),
            })
            .expect_err("4xx cash");
        assert!(matches!(err, OrchestratorError::CashRejected { .. }));
    }

    #[test]
    fn mismatched_outcome_is_fatal() {
        let mut orch = orchestrator(|_| {});
        let err = orch
            .handle(ApiResponse {
                request: ApiRequest::Health,
                outcome: ApiOutcome::Cash(Ok(Reply::ok(Vec::new()))),
            })
            .expect_err("health answered with coins");
        assert!(matches!(
            err,
            OrchestratorError::MismatchedResponse {
                request: RequestKind::Health,
                outcome: "cash",
            }
        ));
    }

    #[test]
    fn full_dispatch_queue_parks_requests() {
        let mut orch = orchestrator(|config| config.dispatcher.queue_capacity = 1);
        orch.submit(ApiRequest::Health);
        orch.submit(ApiRequest::IssueFreeLicense);
        orch.submit(ApiRequest::Health);

        assert_eq!(orch.dispatcher.pending_len(), 1);
        assert_eq!(orch.backlog.len(), 2);
        assert_eq!(orch.outstanding, 3);

        orch.flush_backlog();
        assert_eq!(orch.backlog.len(), 2, "queue is still full");
    }

    #[test]
    fn spent_license_is_replaced_at_once() {
        let mut orch = orchestrator(|_| {});
        orch.remaining.insert((2, 0), 1);
        orch.schedule_dig(2, 0, 1);
        assert_eq!(orch.deferred.len(), 1);

        orch.handle(license_reply(License {
            id: PermitId(4),
            dig_allowed: 3,
            dig_used: 3,
        }))
        .expect("spent permit installed");
        assert!(!orch.ledger.has_available_permit());
        assert_eq!(
            orch.dispatcher.pending_depth(RequestKind::IssueFreeLicense),
            1
        );
        assert_eq!(orch.deferred.len(), 1);

        orch.handle(license_reply(license(5, 3)))
            .expect("replacement installed");
        assert!(!orch.deferred.has_pending());
        assert_eq!(orch.dispatcher.pending_depth(RequestKind::Dig), 1);
        assert_eq!(orch.ledger.permit(PermitId(5)).map(|p| p.used), Some(1));
    }

    #[test]
    fn parked_requests_reenter_by_priority() {
        let mut orch = orchestrator(|config| config.dispatcher.queue_capacity = 1);
        orch.submit(ApiRequest::Health);
        orch.submit(ApiRequest::Explore {
            region: RegionId::new(1),
            area: Area::new(0, 0, 2, 2),
        });
        orch.submit(ApiRequest::Health);
        orch.submit(ApiRequest::Cash {
            treasure: TreasureId::new("t"),
            depth: 2,
        });
        orch.submit(ApiRequest::IssueFreeLicense);
        assert_eq!(orch.backlog.len(), 4);
        assert_eq!(orch.outstanding, 5);

        let order: Vec<RequestKind> = std::iter::from_fn(|| orch.backlog.pop())
            .map(|request| request.kind())
            .collect();
        assert_eq!(
            order,
            vec![
                RequestKind::Cash,
                RequestKind::IssueFreeLicense,
                RequestKind::Explore,
                RequestKind::Health,
            ]
        );
    }

    #[test]
    fn explore_refused_while_stopping_settles_its_siblings() {
        let (ctx, mut orch) = orchestrator_in(|config| {
            config.search.field_size_x = 2;
            config.search.field_size_y = 2;
            config.search.assumed_treasures = 4;
            config.search.shapes = vec![RegionShape::new(1, 1)];
        });
        orch.tree.seed(orch.search.field(), 4).expect("seed");
        let probes: Vec<(RegionId, Area)> =
            std::iter::from_fn(|| orch.tree.frontier_next()).collect();
        assert_eq!(probes.len(), 3);
        // Everything sits in the first cell, so the rest of the field is empty.
        orch.tree.resolve(probes[0].0, 4).expect("first cell");

        ctx.stop();
        let (region, area) = probes[1];
        orch.submit(ApiRequest::Explore { region, area });

        assert_eq!(orch.outstanding, 0);
        assert_eq!(orch.tree.in_flight(), 1);
        assert_eq!(
            orch.tree.region(region).and_then(|r| r.actual_count()),
            Some(0)
        );
        let snapshot = orch.stats.snapshot();
        assert_eq!(snapshot.deduced_regions, 1);
        assert_eq!(snapshot.pruned_regions, 1);
        assert_eq!(snapshot.explored_area, 1);
    }
}
