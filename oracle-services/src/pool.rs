//! Oracle pool orchestration
//!
//! Selects the pool, resolves the fee once, then runs one independent worker
//! per account: register, fetch indices, subscribe, answer matching requests.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use oracle_chain::OracleContract;
use oracle_core::{
    select_oracle_candidates, Account, EventPosition, OracleAccount, OracleResult, RequestEvent,
};

use crate::config::OracleConfig;
use crate::dispatcher::ResponseDispatcher;
use crate::fee::{FeeResolver, ResolvedFee};
use crate::health::{HealthMonitor, OracleMetrics, OracleState, OracleStatus, PoolHealth};
use crate::registrar::OracleRegistrar;
use crate::subscription::{resubscribe_delay, RequestSubscription};

/// How often `wait_until_settled` re-checks the pool
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A subscription that stayed open this long resets the resubscribe backoff
const STABLE_SUBSCRIPTION: Duration = Duration::from_secs(60);

pub struct OraclePool {
    config: OracleConfig,
    contract: Arc<dyn OracleContract>,
}

impl OraclePool {
    pub fn new(config: OracleConfig, contract: Arc<dyn OracleContract>) -> Self {
        Self { config, contract }
    }

    /// Start every oracle worker
    ///
    /// Fails on an unreadable account list or when the ledger has fewer
    /// accounts than the pool needs. Everything after that is contained per
    /// oracle and never fails the pool.
    pub async fn start(&self) -> OracleResult<PoolHandle> {
        let all_accounts = self.contract.accounts().await?;
        let candidates = select_oracle_candidates(&all_accounts, self.config.pool_size)?;
        info!(
            "[Pool] Selected {} oracle accounts out of {}",
            candidates.len(),
            all_accounts.len()
        );

        let fee = FeeResolver::new(self.contract.clone(), self.config.default_fee)
            .resolve()
            .await;

        warn!(
            "[Pool] Request subscriptions replay history from block {}; \
             requests answered by a previous run will be answered again",
            self.config.from_block
        );

        let registrar = OracleRegistrar::new(self.contract.clone());
        let dispatcher = ResponseDispatcher::new(self.contract.clone());

        let mut metrics = Vec::with_capacity(candidates.len());
        let mut workers = Vec::with_capacity(candidates.len());

        for account in candidates {
            let oracle_metrics = Arc::new(OracleMetrics::new(account));
            let worker = OracleWorker {
                account,
                fee: fee.amount,
                registrar: registrar.clone(),
                dispatcher: dispatcher.clone(),
                subscription: RequestSubscription::new(
                    self.contract.clone(),
                    account,
                    self.config.from_block,
                ),
                metrics: oracle_metrics.clone(),
            };

            metrics.push(oracle_metrics);
            workers.push(tokio::spawn(worker.run()));
        }

        info!("[Pool] Spawned {} oracle workers", workers.len());

        Ok(PoolHandle {
            fee,
            monitor: HealthMonitor::new(metrics),
            workers,
        })
    }
}

/// A running pool
#[derive(Debug)]
pub struct PoolHandle {
    fee: ResolvedFee,
    monitor: HealthMonitor,
    workers: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    /// The fee every registration in this pool paid
    pub fn fee(&self) -> ResolvedFee {
        self.fee
    }

    pub fn health(&self) -> PoolHealth {
        self.monitor.snapshot()
    }

    pub fn monitor(&self) -> HealthMonitor {
        self.monitor.clone()
    }

    pub fn oracle(&self, account: Account) -> Option<OracleStatus> {
        self.monitor.oracle(account)
    }

    /// Wait until every oracle has failed registration or is listening
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let settled = async {
            while !self.monitor.snapshot().is_settled() {
                tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, settled).await.is_ok()
    }

    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }

    /// Wait for every worker to exit
    ///
    /// Workers of registered oracles run until aborted.
    pub async fn join(self) {
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("[Pool] Oracle worker panicked: {}", e);
                }
            }
        }
    }
}

/// One oracle account's lifecycle, run as its own task
struct OracleWorker {
    account: Account,
    fee: U256,
    registrar: OracleRegistrar,
    dispatcher: ResponseDispatcher,
    subscription: RequestSubscription,
    metrics: Arc<OracleMetrics>,
}

impl OracleWorker {
    async fn run(self) {
        self.metrics.set_state(OracleState::Registering);

        let oracle = self.registrar.enroll(self.account, self.fee).await;
        if !oracle.is_registered() {
            self.metrics.set_state(OracleState::RegistrationFailed);
            return;
        }

        self.metrics.set_indices(oracle.indices.clone());
        self.metrics.set_state(OracleState::Registered);

        let oracle = Arc::new(oracle);
        let mut last_handled: Option<EventPosition> = None;
        let mut attempt = 0u32;

        loop {
            let opened = match last_handled {
                Some(position) => self.subscription.resume(position).await,
                None => self.subscription.open().await,
            };

            match opened {
                Ok(mut stream) => {
                    self.metrics.set_state(OracleState::Listening);
                    let opened_at = Instant::now();
                    let mut delivered = 0usize;

                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(event) => {
                                delivered += 1;
                                last_handled = last_handled.max(event.position);
                                self.handle_event(&oracle, event);
                            }
                            Err(e) => warn!(
                                "[Oracle] {} skipping undeliverable request event: {}",
                                self.account, e
                            ),
                        }
                    }

                    warn!(
                        "[Oracle] {} request stream ended after {} new events",
                        self.account, delivered
                    );
                    self.metrics.set_state(OracleState::Registered);

                    if delivered > 0 || opened_at.elapsed() >= STABLE_SUBSCRIPTION {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    error!("[Oracle] {} failed to subscribe: {}", self.account, e);
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = resubscribe_delay(attempt);
            match last_handled {
                Some(position) => info!(
                    "[Oracle] {} resubscribing after block {} in {:?}",
                    self.account, position.block, delay
                ),
                None => info!(
                    "[Oracle] {} resubscribing from block {} in {:?}",
                    self.account,
                    self.subscription.from_block(),
                    delay
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Each matching event is submitted on its own task
    fn handle_event(&self, oracle: &Arc<OracleAccount>, event: RequestEvent) {
        self.metrics.record_event();

        if !ResponseDispatcher::matches(oracle, &event) {
            return;
        }

        debug!(
            "[Oracle] {} matched request index={} flight={}",
            self.account, event.index, event.flight_name
        );

        self.metrics.begin_response();
        let dispatcher = self.dispatcher.clone();
        let oracle = oracle.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let outcome = dispatcher.on_event(&oracle, &event).await;
            metrics.finish_response(outcome.is_submitted());
        });
    }
}
