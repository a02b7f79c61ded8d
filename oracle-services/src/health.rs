//! Per-oracle metrics and the aggregated pool health

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use oracle_core::{Account, AssignedIndices};

/// Lifecycle of a single oracle worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OracleState {
    Unregistered = 0,
    Registering = 1,
    Registered = 2,
    RegistrationFailed = 3,
    Listening = 4,
    Responding = 5,
}

impl OracleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => OracleState::Registering,
            2 => OracleState::Registered,
            3 => OracleState::RegistrationFailed,
            4 => OracleState::Listening,
            5 => OracleState::Responding,
            _ => OracleState::Unregistered,
        }
    }
}

impl fmt::Display for OracleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OracleState::Unregistered => "unregistered",
            OracleState::Registering => "registering",
            OracleState::Registered => "registered",
            OracleState::RegistrationFailed => "registration failed",
            OracleState::Listening => "listening",
            OracleState::Responding => "responding",
        };
        write!(f, "{}", name)
    }
}

/// Health metrics for a single oracle (atomic for thread-safe access)
#[derive(Debug)]
pub struct OracleMetrics {
    account: Account,
    state: AtomicU8,
    indices: RwLock<AssignedIndices>,
    events_seen: AtomicU64,
    responses_submitted: AtomicU64,
    responses_failed: AtomicU64,
    in_flight: AtomicU64,
}

impl OracleMetrics {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            state: AtomicU8::new(OracleState::Unregistered as u8),
            indices: RwLock::new(AssignedIndices::empty()),
            events_seen: AtomicU64::new(0),
            responses_submitted: AtomicU64::new(0),
            responses_failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    pub fn account(&self) -> Account {
        self.account
    }

    pub(crate) fn set_state(&self, state: OracleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn set_indices(&self, indices: AssignedIndices) {
        *self.indices.write() = indices;
    }

    pub(crate) fn record_event(&self) {
        self.events_seen.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn begin_response(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn finish_response(&self, submitted: bool) {
        if submitted {
            self.responses_submitted.fetch_add(1, Ordering::SeqCst);
        } else {
            self.responses_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Current state; a listening oracle with submissions in flight is responding
    pub fn state(&self) -> OracleState {
        let state = OracleState::from_u8(self.state.load(Ordering::SeqCst));
        if state == OracleState::Listening && self.in_flight.load(Ordering::SeqCst) > 0 {
            OracleState::Responding
        } else {
            state
        }
    }

    pub fn status(&self) -> OracleStatus {
        OracleStatus {
            account: self.account,
            state: self.state(),
            indices: self.indices.read().iter().collect(),
            events_seen: self.events_seen.load(Ordering::SeqCst),
            responses_submitted: self.responses_submitted.load(Ordering::SeqCst),
            responses_failed: self.responses_failed.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of one oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleStatus {
    pub account: Account,
    pub state: OracleState,
    pub indices: Vec<u8>,
    pub events_seen: u64,
    pub responses_submitted: u64,
    pub responses_failed: u64,
}

impl OracleStatus {
    pub fn is_registered(&self) -> bool {
        matches!(
            self.state,
            OracleState::Registered | OracleState::Listening | OracleState::Responding
        )
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, OracleState::Listening | OracleState::Responding)
    }

    /// Registered but never able to match a request
    pub fn is_inert(&self) -> bool {
        self.is_registered() && self.indices.is_empty()
    }
}

/// Aggregated health across the whole pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    pub total: usize,
    pub registered: usize,
    pub registration_failed: usize,
    pub listening: usize,
    pub inert: usize,
    pub responses_submitted: u64,
    pub responses_failed: u64,
    /// At least one oracle is listening with indices to answer
    pub healthy: bool,
    pub oracles: Vec<OracleStatus>,
}

impl PoolHealth {
    pub fn from_statuses(oracles: Vec<OracleStatus>) -> Self {
        let registered = oracles.iter().filter(|o| o.is_registered()).count();
        let registration_failed = oracles
            .iter()
            .filter(|o| o.state == OracleState::RegistrationFailed)
            .count();
        let listening = oracles.iter().filter(|o| o.is_listening()).count();
        let inert = oracles.iter().filter(|o| o.is_inert()).count();
        let healthy = oracles.iter().any(|o| o.is_listening() && !o.is_inert());

        Self {
            total: oracles.len(),
            registered,
            registration_failed,
            listening,
            inert,
            responses_submitted: oracles.iter().map(|o| o.responses_submitted).sum(),
            responses_failed: oracles.iter().map(|o| o.responses_failed).sum(),
            healthy,
            oracles,
        }
    }

    /// Every oracle has left the registration phase
    pub fn is_settled(&self) -> bool {
        self.oracles.iter().all(|o| {
            matches!(
                o.state,
                OracleState::RegistrationFailed | OracleState::Listening | OracleState::Responding
            )
        })
    }
}

/// Read side of the pool's metrics, cheap to clone
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    metrics: Arc<Vec<Arc<OracleMetrics>>>,
}

impl HealthMonitor {
    pub fn new(metrics: Vec<Arc<OracleMetrics>>) -> Self {
        Self {
            metrics: Arc::new(metrics),
        }
    }

    pub fn snapshot(&self) -> PoolHealth {
        PoolHealth::from_statuses(self.metrics.iter().map(|m| m.status()).collect())
    }

    pub fn oracle(&self, account: Account) -> Option<OracleStatus> {
        self.metrics
            .iter()
            .find(|m| m.account() == account)
            .map(|m| m.status())
    }

    /// Log the pool health every `interval`, forever
    pub async fn run_reporter(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let health = self.snapshot();

            if health.healthy {
                info!(
                    "[Health] {}/{} oracles listening ({} inert, {} registration failures), responses: {} submitted, {} failed",
                    health.listening,
                    health.total,
                    health.inert,
                    health.registration_failed,
                    health.responses_submitted,
                    health.responses_failed
                );
            } else {
                warn!(
                    "[Health] No oracle is able to answer requests ({} registered, {} registration failures, {} inert)",
                    health.registered, health.registration_failed, health.inert
                );
            }
        }
    }
}
