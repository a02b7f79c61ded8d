//! In-process FlightSuretyApp ledger
//!
//! Mimics the parts of the contract oracles interact with: fee-gated
//! registration, three random indices per oracle, request events and
//! index-checked responses. Faults and latency can be injected per account
//! so callers can exercise every failure path without a node.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use oracle_core::{
    Account, EventPosition, OracleError, OracleResponse, OracleResult, RequestEvent,
};

use crate::contract::{OracleContract, RequestStream};

/// Indices are drawn from `0..=MAX_INDEX`, as the contract does
pub const MAX_INDEX: u8 = 9;

/// 1 ether, the contract's registration fee
const DEFAULT_FEE_WEI: u128 = 1_000_000_000_000_000_000;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Faults injected by tests
#[derive(Debug, Default)]
struct Faults {
    accounts_query: bool,
    fee_query: bool,
    rejected_registrations: HashSet<Account>,
    failed_index_fetches: HashSet<Account>,
    rejected_responses: HashSet<Account>,
    registration_delays: HashMap<Account, Duration>,
    response_delays: HashMap<Account, Duration>,
    /// Subscriptions close after yielding this many events
    stream_event_limit: Option<usize>,
}

#[derive(Debug)]
struct LedgerState {
    accounts: Vec<Account>,
    fee: U256,
    oracles: HashMap<Account, [u8; 3]>,
    preset_indexes: HashMap<Account, [u8; 3]>,
    /// (block number, event); one request per block
    requests: Vec<(u64, RequestEvent)>,
    responses: Vec<(Account, OracleResponse)>,
    rng: StdRng,
    faults: Faults,
}

/// A simulated ledger hosting one FlightSuretyApp contract
pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
    requests_tx: broadcast::Sender<RequestEvent>,
    subscriptions_opened: AtomicUsize,
    submissions_in_flight: AtomicUsize,
    peak_submissions_in_flight: AtomicUsize,
}

impl SimulatedLedger {
    /// Create a ledger with `account_count` unlocked accounts
    pub fn new(account_count: usize) -> Self {
        Self::with_seed(account_count, 0x0f1e_c0de)
    }

    /// Same as `new` but with an explicit seed for index assignment
    pub fn with_seed(account_count: usize, seed: u64) -> Self {
        let accounts = (0..account_count).map(simulated_account).collect();
        let (requests_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Mutex::new(LedgerState {
                accounts,
                fee: U256::from(DEFAULT_FEE_WEI),
                oracles: HashMap::new(),
                preset_indexes: HashMap::new(),
                requests: Vec::new(),
                responses: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
                faults: Faults::default(),
            }),
            requests_tx,
            subscriptions_opened: AtomicUsize::new(0),
            submissions_in_flight: AtomicUsize::new(0),
            peak_submissions_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_fee(&self, fee: U256) {
        self.state.lock().fee = fee;
    }

    /// Snapshot of the ledger's account list
    pub fn account_list(&self) -> Vec<Account> {
        self.state.lock().accounts.clone()
    }

    pub fn fail_accounts_query(&self, fail: bool) {
        self.state.lock().faults.accounts_query = fail;
    }

    pub fn fail_fee_query(&self, fail: bool) {
        self.state.lock().faults.fee_query = fail;
    }

    pub fn reject_registration(&self, account: Account) {
        self.state.lock().faults.rejected_registrations.insert(account);
    }

    pub fn fail_index_fetch(&self, account: Account) {
        self.state.lock().faults.failed_index_fetches.insert(account);
    }

    pub fn reject_responses(&self, account: Account) {
        self.state.lock().faults.rejected_responses.insert(account);
    }

    /// Hold `account`'s registrations for `delay` before the ledger sees them
    pub fn delay_registration(&self, account: Account, delay: Duration) {
        self.state
            .lock()
            .faults
            .registration_delays
            .insert(account, delay);
    }

    /// Hold `account`'s response submissions for `delay` before the ledger sees them
    pub fn delay_responses(&self, account: Account, delay: Duration) {
        self.state.lock().faults.response_delays.insert(account, delay);
    }

    /// Close every subscription opened from now on after it yields `events` items
    pub fn end_streams_after(&self, events: usize) {
        self.state.lock().faults.stream_event_limit = Some(events);
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// Most response submissions the ledger has held at the same time
    pub fn peak_submissions_in_flight(&self) -> usize {
        self.peak_submissions_in_flight.load(Ordering::SeqCst)
    }

    /// Fix the indices `account` receives when it registers
    pub fn assign_indexes(&self, account: Account, indexes: [u8; 3]) {
        self.state.lock().preset_indexes.insert(account, indexes);
    }

    pub fn is_registered(&self, account: Account) -> bool {
        self.state.lock().oracles.contains_key(&account)
    }

    pub fn registered_count(&self) -> usize {
        self.state.lock().oracles.len()
    }

    /// Emit a request for a specific index
    pub fn request_status_with_index(
        &self,
        index: u8,
        airline: Address,
        flight: &str,
        timestamp: U256,
    ) -> RequestEvent {
        // Append and publish under the lock so subscribers see each event exactly once
        let mut state = self.state.lock();
        let block = state.requests.len() as u64 + 1;
        let event = RequestEvent {
            index,
            airline,
            flight_name: flight.to_string(),
            timestamp,
            position: Some(EventPosition::new(block, 0)),
        };
        state.requests.push((block, event.clone()));
        let _ = self.requests_tx.send(event.clone());
        drop(state);

        debug!(
            "[Simulated] OracleRequest index={} flight={} block={}",
            index, flight, block
        );
        event
    }

    /// All accepted responses, in submission order
    pub fn responses(&self) -> Vec<(Account, OracleResponse)> {
        self.state.lock().responses.clone()
    }

    pub fn responses_from(&self, account: Account) -> Vec<OracleResponse> {
        self.state
            .lock()
            .responses
            .iter()
            .filter(|(from, _)| *from == account)
            .map(|(_, response)| response.clone())
            .collect()
    }
}

#[async_trait]
impl OracleContract for SimulatedLedger {
    async fn accounts(&self) -> OracleResult<Vec<Account>> {
        let state = self.state.lock();
        if state.faults.accounts_query {
            return Err(OracleError::transport("eth_accounts: connection refused"));
        }
        Ok(state.accounts.clone())
    }

    async fn registration_fee(&self) -> OracleResult<U256> {
        let state = self.state.lock();
        if state.faults.fee_query {
            return Err(OracleError::transport("REGISTRATION_FEE: connection refused"));
        }
        Ok(state.fee)
    }

    async fn register_oracle(&self, from: Account, fee: U256) -> OracleResult<()> {
        let delay = self.state.lock().faults.registration_delays.get(&from).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        if !state.accounts.contains(&from) {
            return Err(OracleError::rejected(format!("unknown account {}", from)));
        }
        if state.faults.rejected_registrations.contains(&from) {
            return Err(OracleError::rejected("transaction reverted"));
        }
        if fee < state.fee {
            return Err(OracleError::rejected("Registration fee is required"));
        }
        if state.oracles.contains_key(&from) {
            return Err(OracleError::rejected("Oracle already registered"));
        }

        let preset = state.preset_indexes.get(&from).copied();
        let indexes = match preset {
            Some(preset) => preset,
            None => random_indexes(&mut state.rng),
        };
        state.oracles.insert(from, indexes);
        Ok(())
    }

    async fn my_indexes(&self, account: Account) -> OracleResult<[u8; 3]> {
        let state = self.state.lock();
        if state.faults.failed_index_fetches.contains(&account) {
            return Err(OracleError::transport("getMyIndexes: connection reset"));
        }
        state
            .oracles
            .get(&account)
            .copied()
            .ok_or_else(|| OracleError::transport("Not registered as an oracle"))
    }

    async fn subscribe_requests(&self, from_block: u64) -> OracleResult<RequestStream> {
        self.subscriptions_opened.fetch_add(1, Ordering::SeqCst);

        let (history, rx, limit) = {
            let state = self.state.lock();
            let history: Vec<RequestEvent> = state
                .requests
                .iter()
                .filter(|(block, _)| *block >= from_block)
                .map(|(_, event)| event.clone())
                .collect();
            (
                history,
                self.requests_tx.subscribe(),
                state.faults.stream_event_limit,
            )
        };

        let live = BroadcastStream::new(rx).map(|item| match item {
            Ok(event) => Ok(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Err(OracleError::transport(
                format!("subscription lagged, {} events dropped", skipped),
            )),
        });

        let events = stream::iter(history.into_iter().map(Ok))
            .chain(live)
            .chain(stream::pending());

        Ok(match limit {
            Some(limit) => events.take(limit).boxed(),
            None => events.boxed(),
        })
    }

    async fn submit_response(&self, from: Account, response: &OracleResponse) -> OracleResult<()> {
        let delay = self.state.lock().faults.response_delays.get(&from).copied();

        let in_flight = self.submissions_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_submissions_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.record_response(from, response);
        self.submissions_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl SimulatedLedger {
    /// Validate a response the way `submitOracleResponse` does and record it
    fn record_response(&self, from: Account, response: &OracleResponse) -> OracleResult<()> {
        let mut state = self.state.lock();

        if state.faults.rejected_responses.contains(&from) {
            return Err(OracleError::rejected("transaction reverted"));
        }

        let indexes = state
            .oracles
            .get(&from)
            .ok_or_else(|| OracleError::rejected("Not registered as an oracle"))?;
        if !indexes.contains(&response.index) {
            return Err(OracleError::rejected("Index does not match oracle request"));
        }

        let open = state.requests.iter().any(|(_, request)| {
            request.index == response.index
                && request.airline == response.airline
                && request.flight_name == response.flight_name
                && request.timestamp == response.timestamp
        });
        if !open {
            return Err(OracleError::rejected("Flight or timestamp do not match oracle request"));
        }

        state.responses.push((from, response.clone()));
        Ok(())
    }
}

/// Deterministic account address for position `i`
fn simulated_account(i: usize) -> Account {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xac;
    bytes[12..].copy_from_slice(&(i as u64 + 1).to_be_bytes());
    Address::from(bytes)
}

/// Three distinct indices, as the contract's `generateIndexes` produces
fn random_indexes(rng: &mut StdRng) -> [u8; 3] {
    let first = rng.random_range(0..=MAX_INDEX);

    let mut second = first;
    while second == first {
        second = rng.random_range(0..=MAX_INDEX);
    }

    let mut third = first;
    while third == first || third == second {
        third = rng.random_range(0..=MAX_INDEX);
    }

    [first, second, third]
}
