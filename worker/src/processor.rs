// ==============================================================================
// processor.rs - Request Processing Loop
// ==============================================================================
// Description: Polls the contract for pending requests and drives each one
//              through fetch -> analyze -> submit with retries and dedup
// Author: Matt Barham
// Created: 2025-11-16
// Modified: 2025-12-02
// Version: 1.2.0
// ==============================================================================
// The contract's status gate is the source of truth; the in-flight set is
// an advisory deduplicator for one process lifetime. Ids that reach a
// terminal state stay claimed so a later poll never reprocesses them. The
// only path that releases an id is the one where no terminal action could
// be landed on-chain, so a later poll can retry afresh.
// ==============================================================================

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kinship_analyzer::analyzer::PairAnalyzer;
use kinship_analyzer::models::AnalysisReport;
use primitive_types::U256;
use rand::Rng;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::contract::{ContractClient, ContractError, RequestStatus};
use crate::host::HostTransport;

/// Hard ceiling for a single retry delay
const RETRY_DELAY_CAP: Duration = Duration::from_secs(30);

/// Hard ceiling for the poll backoff
const POLL_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Completed reports kept for the status API
const RESULT_CACHE_CAP: usize = 256;

/// Monotonic process counters
#[derive(Debug, Default)]
pub struct Metrics {
    pub polls: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.polls.load(Ordering::Relaxed),
            self.completed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }
}

/// Bounded cache of completed reports, oldest evicted first
#[derive(Debug, Default)]
struct ResultCache {
    reports: HashMap<U256, AnalysisReport>,
    order: VecDeque<U256>,
}

impl ResultCache {
    fn insert(&mut self, id: U256, report: AnalysisReport) {
        if self.reports.insert(id, report).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > RESULT_CACHE_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.reports.remove(&evicted);
            }
        }
    }
}

/// Shared processor state, also read by the status API
#[derive(Debug, Default)]
pub struct ProcessorState {
    in_flight: Mutex<HashSet<U256>>,
    results: Mutex<ResultCache>,
    pub metrics: Metrics,
}

impl ProcessorState {
    /// Claim an id for processing; false when it is already claimed
    async fn try_claim(&self, id: U256) -> bool {
        self.in_flight.lock().await.insert(id)
    }

    /// Release an id so a later poll can pick it up again
    async fn release(&self, id: U256) {
        self.in_flight.lock().await.remove(&id);
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    pub async fn result(&self, id: U256) -> Option<AnalysisReport> {
        self.results.lock().await.reports.get(&id).cloned()
    }

    pub(crate) async fn cache_result(&self, id: U256, report: AnalysisReport) {
        self.results.lock().await.insert(id, report);
    }
}

/// Terminal dispositions of one request attempt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disposition {
    /// Result submitted and accepted
    Completed,
    /// The contract (or a status pre-check) says someone already finished it
    AlreadyProcessed,
    /// markAnalysisFailed landed
    MarkedFailed,
    /// Bug-class failure; id stays claimed, nothing submitted
    Skipped,
    /// Shutdown observed before submission
    Cancelled,
    /// No terminal action landed; id released for a later poll
    Released,
}

/// The polling loop and per-request state machine
pub struct RequestProcessor<T: HostTransport> {
    contract: ContractClient<T>,
    analyzer: PairAnalyzer,
    state: Arc<ProcessorState>,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
    retry_max: u32,
    retry_backoff_base: Duration,
    request_deadline: Duration,
    shutdown_grace: Duration,
}

impl<T: HostTransport> RequestProcessor<T> {
    pub fn new(
        contract: ContractClient<T>,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            contract,
            analyzer: PairAnalyzer::new(),
            state: Arc::new(ProcessorState::default()),
            semaphore: Arc::new(Semaphore::new(config.max_parallel)),
            shutdown,
            poll_interval: config.poll_interval,
            retry_max: config.retry_max,
            retry_backoff_base: config.retry_backoff_base,
            request_deadline: config.request_deadline,
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn state(&self) -> Arc<ProcessorState> {
        Arc::clone(&self.state)
    }

    /// Run until shutdown, then drain in-flight work within the grace period
    pub async fn run(self: Arc<Self>) {
        info!(poll = ?self.poll_interval, "request processor started");
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut delay = self.poll_interval;

        loop {
            if self.is_shutting_down() {
                break;
            }

            match Arc::clone(&self).poll_once(&mut tasks).await {
                Ok(spawned) => {
                    if spawned > 0 {
                        info!(spawned, "scheduled newly observed requests");
                    }
                    delay = self.poll_interval;
                }
                Err(err) => {
                    delay = next_poll_backoff(delay);
                    warn!(retry_in = ?delay, "pending poll failed: {err}");
                }
            }

            // Reap whatever finished since the last tick
            while tasks.try_join_next().is_some() {}

            if self.sleep_or_shutdown(delay).await {
                break;
            }
        }

        self.drain(tasks).await;
    }

    /// One poll tick: fetch the pending set and schedule every id not
    /// already claimed. Returns the number of newly scheduled requests.
    pub(crate) async fn poll_once(
        self: Arc<Self>,
        tasks: &mut JoinSet<()>,
    ) -> Result<usize, ContractError> {
        self.state.metrics.polls.fetch_add(1, Ordering::Relaxed);
        let pending = self.contract.get_pending_requests().await?;
        debug!(pending = pending.len(), "poll tick");

        let mut spawned = 0;
        for id in pending {
            if self.is_shutting_down() {
                break;
            }
            if !self.state.try_claim(id).await {
                continue;
            }
            let processor = Arc::clone(&self);
            tasks.spawn(async move { processor.process_request(id).await });
            spawned += 1;
        }
        Ok(spawned)
    }

    /// Process one claimed request under the per-id deadline
    async fn process_request(self: Arc<Self>, id: U256) {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let disposition = match tokio::time::timeout(self.request_deadline, self.drive(id)).await {
            Ok(disposition) => disposition,
            Err(_) => {
                warn!(%id, deadline = ?self.request_deadline, "request deadline exceeded");
                match self
                    .contract
                    .mark_analysis_failed(id, "timeout: request deadline exceeded")
                    .await
                {
                    Ok(_) => Disposition::MarkedFailed,
                    Err(ContractError::StateRejection(_)) => Disposition::AlreadyProcessed,
                    Err(err) => {
                        warn!(%id, "failure mark after deadline also failed: {err}");
                        Disposition::Released
                    }
                }
            }
        };
        drop(permit);

        debug!(%id, ?disposition, "request finished");
        match disposition {
            Disposition::Completed => {
                self.state.metrics.completed.fetch_add(1, Ordering::Relaxed);
            }
            Disposition::MarkedFailed => {
                self.state.metrics.failed.fetch_add(1, Ordering::Relaxed);
            }
            Disposition::AlreadyProcessed => {
                self.state.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Disposition::Skipped => {}
            Disposition::Cancelled | Disposition::Released => {
                self.state.release(id).await;
            }
        }
    }

    /// The per-request state machine: pre-check, fetch, analyze, submit
    async fn drive(&self, id: U256) -> Disposition {
        // Pre-check against the authoritative status gate
        let request = match self
            .with_retries("getAnalysisRequest", || self.contract.get_analysis_request(id))
            .await
        {
            Ok(request) => request,
            Err(ContractError::Encode(err)) => {
                error!(%id, "call encoding failed: {err}");
                return Disposition::Skipped;
            }
            Err(ContractError::Decode(err)) => {
                error!(%id, "status decode failed: {err}");
                return self.mark_failed(id, &format!("decode error: {err}")).await;
            }
            Err(err) => {
                warn!(%id, "status check failed: {err}; releasing");
                return Disposition::Released;
            }
        };

        if request.status != RequestStatus::Pending {
            debug!(%id, status = ?request.status, "request no longer pending; skipping");
            return Disposition::AlreadyProcessed;
        }
        if !request.result.is_empty() {
            // Contract bug surface: pending id with a populated result
            warn!(%id, "pending request already carries a result; treating as done");
            return Disposition::AlreadyProcessed;
        }

        // Privileged fetch of both datasets
        let (user1_raw, user2_raw) = match self
            .with_retries("getSNPDataForAnalysis", || self.contract.get_snp_data(id))
            .await
        {
            Ok(pair) => pair,
            Err(ContractError::Encode(err)) => {
                error!(%id, "call encoding failed: {err}");
                return Disposition::Skipped;
            }
            Err(ContractError::Decode(err)) => {
                error!(%id, "SNP payload decode failed: {err}");
                return self.mark_failed(id, &format!("decode error: {err}")).await;
            }
            Err(err) => {
                warn!(%id, "SNP fetch failed after retries: {err}");
                return self.mark_failed(id, &format!("fetch failed: {err}")).await;
            }
        };

        if self.is_shutting_down() {
            return Disposition::Cancelled;
        }

        // CPU-bound analysis runs on the blocking pool; the raw datasets
        // move into the task and are dropped with it
        let analyzer = self.analyzer;
        let analysis =
            tokio::task::spawn_blocking(move || analyzer.analyze(&user1_raw, &user2_raw)).await;

        let report = match analysis {
            Ok(Ok(report)) => report,
            Ok(Err(reason)) => {
                info!(%id, %reason, "analysis rejected the datasets");
                return self.mark_failed(id, &reason.to_string()).await;
            }
            Err(join_err) => {
                error!(%id, "analysis task did not complete: {join_err}");
                return self.mark_failed(id, "analysis task did not complete").await;
            }
        };

        // A shutdown observed during analysis must never submit
        if self.is_shutting_down() {
            info!(%id, "shutdown during analysis; discarding result");
            return Disposition::Cancelled;
        }

        let result_json = match report.to_json() {
            Ok(json) => json,
            Err(err) => {
                error!(%id, "result serialization failed: {err}");
                return Disposition::Skipped;
            }
        };

        match self
            .with_retries("submitAnalysisResult", || {
                self.contract.submit_analysis_result(
                    id,
                    &result_json,
                    report.confidence_percent(),
                    &report.relationship,
                )
            })
            .await
        {
            Ok(hash) => {
                info!(%id, %hash, relationship = %report.relationship, "analysis result submitted");
                self.state.cache_result(id, report).await;
                Disposition::Completed
            }
            Err(ContractError::StateRejection(message)) => {
                info!(%id, %message, "submission rejected as already processed");
                Disposition::AlreadyProcessed
            }
            Err(ContractError::Encode(err)) => {
                error!(%id, "submit encoding failed: {err}");
                Disposition::Skipped
            }
            Err(err) => {
                warn!(%id, "submission failed after retries: {err}");
                self.mark_failed(id, &format!("submit failed: {err}")).await
            }
        }
    }

    /// Land a failure mark; when even that fails, release the id so a
    /// later poll retries from scratch
    async fn mark_failed(&self, id: U256, reason: &str) -> Disposition {
        match self
            .with_retries("markAnalysisFailed", || {
                self.contract.mark_analysis_failed(id, reason)
            })
            .await
        {
            Ok(hash) => {
                info!(%id, %reason, %hash, "request marked failed");
                Disposition::MarkedFailed
            }
            Err(ContractError::StateRejection(message)) => {
                info!(%id, %message, "failure mark rejected as already processed");
                Disposition::AlreadyProcessed
            }
            Err(err) => {
                warn!(%id, "failure mark did not land: {err}; releasing");
                Disposition::Released
            }
        }
    }

    /// Retry a transient-failing operation within the per-id budget
    async fn with_retries<R, F, Fut>(&self, what: &str, mut op: F) -> Result<R, ContractError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, ContractError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry_max => {
                    attempt += 1;
                    let delay = retry_delay(self.retry_backoff_base, attempt);
                    warn!(what, attempt, max = self.retry_max, retry_in = ?delay, "transient failure: {err}");
                    if self.sleep_or_shutdown(delay).await {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, waking early on shutdown; returns true when shutting down
    async fn sleep_or_shutdown(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown.wait_for(|stop| *stop) => true,
        }
    }

    /// Let in-flight work finish within the grace period, then abort
    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            info!("request processor stopped; no work in flight");
            return;
        }
        info!(in_flight = tasks.len(), grace = ?self.shutdown_grace, "draining in-flight work");
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("grace period expired; aborting remaining work");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        info!("request processor stopped");
    }
}

/// Exponential per-operation retry delay with jitter, capped
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6);
    let scaled = base.saturating_mul(1u32 << exponent).min(RETRY_DELAY_CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=scaled.as_millis() as u64 / 2);
    scaled + Duration::from_millis(jitter_ms)
}

/// Doubled poll backoff with jitter, capped at five minutes
fn next_poll_backoff(current: Duration) -> Duration {
    let doubled = current.saturating_mul(2).min(POLL_BACKOFF_CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=doubled.as_millis() as u64 / 10);
    doubled - Duration::from_millis(jitter_ms)
}
