//! End-to-end pool behaviour against the simulated ledger

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use tokio_test::{assert_err, assert_ok};

use oracle_chain::{SimulatedLedger, MAX_INDEX};
use oracle_core::{Account, OracleError, STATUS_CODES};
use oracle_services::{FeeSource, OracleConfig, OraclePool, OracleState, PoolHandle};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn one_ether() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

fn config(pool_size: usize) -> OracleConfig {
    OracleConfig {
        pool_size,
        default_fee: one_ether(),
        ..OracleConfig::default()
    }
}

fn airline() -> Address {
    Address::with_last_byte(1)
}

async fn start(ledger: &Arc<SimulatedLedger>, pool_size: usize) -> PoolHandle {
    let pool = OraclePool::new(config(pool_size), ledger.clone());
    let handle = assert_ok!(pool.start().await);
    assert!(handle.wait_until_settled(SETTLE_TIMEOUT).await, "pool never settled");
    handle
}

/// Poll until the ledger has recorded at least `count` responses
async fn wait_for_responses(ledger: &SimulatedLedger, count: usize) {
    let waited = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while ledger.responses().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        waited.is_ok(),
        "expected {} responses, got {}",
        count,
        ledger.responses().len()
    );
}

/// Emit one request for every index the contract can assign
fn request_every_index(ledger: &SimulatedLedger, flight: &str) {
    for index in 0..=MAX_INDEX {
        ledger.request_status_with_index(index, airline(), flight, U256::from(index as u64 + 100));
    }
}

/// The last `count` accounts, reversed, as the pool selects them
fn pool_accounts(ledger: &SimulatedLedger, count: usize) -> Vec<Account> {
    ledger.account_list().into_iter().rev().take(count).collect()
}

#[tokio::test]
async fn test_oracle_answers_only_assigned_indices() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);

    let handle = start(&ledger, 1).await;

    ledger.request_status_with_index(3, airline(), "ND1309", U256::from(1u64));
    ledger.request_status_with_index(5, airline(), "ND1309", U256::from(2u64));
    wait_for_responses(&ledger, 1).await;

    let responses = ledger.responses_from(oracle);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].index, 5);
    assert_eq!(responses[0].status_code, 50);
    assert_eq!(responses[0].timestamp, U256::from(2u64));

    let status = handle.oracle(oracle).unwrap();
    assert_eq!(status.events_seen, 2);
    assert_eq!(status.responses_failed, 0);

    handle.abort();
}

#[tokio::test]
async fn test_oracles_sharing_an_index_agree() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let accounts = pool_accounts(&ledger, 2);
    ledger.assign_indexes(accounts[0], [5, 1, 2]);
    ledger.assign_indexes(accounts[1], [5, 3, 4]);

    let handle = start(&ledger, 2).await;

    ledger.request_status_with_index(5, airline(), "ND1309", U256::from(1u64));
    wait_for_responses(&ledger, 2).await;

    let first = ledger.responses_from(accounts[0]);
    let second = ledger.responses_from(accounts[1]);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0], second[0]);
    assert!(STATUS_CODES.contains(&first[0].status_code));

    handle.abort();
}

#[tokio::test]
async fn test_fee_failure_falls_back_to_default() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    ledger.fail_fee_query(true);

    let handle = start(&ledger, 3).await;

    assert_eq!(handle.fee().source, FeeSource::Fallback);
    assert_eq!(handle.fee().amount, one_ether());
    assert_eq!(ledger.registered_count(), 3);
    assert_eq!(handle.health().registered, 3);

    handle.abort();
}

#[tokio::test]
async fn test_stale_fallback_fee_fails_registrations_not_startup() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    ledger.set_fee(one_ether() * U256::from(2u64));
    ledger.fail_fee_query(true);

    let handle = start(&ledger, 3).await;
    let health = handle.health();

    assert_eq!(health.registration_failed, 3);
    assert!(!health.healthy);
    assert_eq!(ledger.registered_count(), 0);
}

#[tokio::test]
async fn test_index_fetch_failure_leaves_oracle_inert() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let accounts = pool_accounts(&ledger, 5);
    let inert = accounts[2];
    ledger.fail_index_fetch(inert);

    let handle = start(&ledger, 5).await;

    request_every_index(&ledger, "ND1309");
    wait_for_responses(&ledger, 4 * 3).await;

    assert!(ledger.responses_from(inert).is_empty());
    for account in accounts.iter().filter(|a| **a != inert) {
        assert_eq!(ledger.responses_from(*account).len(), 3);
    }

    let status = handle.oracle(inert).unwrap();
    assert_eq!(status.state, OracleState::Listening);
    assert!(status.is_inert());
    assert_eq!(handle.health().inert, 1);
    assert!(handle.health().healthy);

    handle.abort();
}

#[tokio::test]
async fn test_pool_of_twenty_with_five_registration_failures() {
    let ledger = Arc::new(SimulatedLedger::new(30));
    let accounts = pool_accounts(&ledger, 20);
    let rejected: HashSet<Account> = accounts.iter().step_by(4).copied().collect();
    assert_eq!(rejected.len(), 5);
    for account in &rejected {
        ledger.reject_registration(*account);
    }

    let handle = start(&ledger, 20).await;
    let health = handle.health();
    assert_eq!(health.total, 20);
    assert_eq!(health.registration_failed, 5);
    assert_eq!(health.registered, 15);
    assert_eq!(health.listening, 15);

    request_every_index(&ledger, "ND1309");
    wait_for_responses(&ledger, 15 * 3).await;

    for account in &accounts {
        let answered = ledger.responses_from(*account).len();
        if rejected.contains(account) {
            assert_eq!(answered, 0);
        } else {
            assert_eq!(answered, 3);
        }
    }

    // The first ten accounts belong to other roles and never act as oracles
    for account in &ledger.account_list()[..10] {
        assert!(!ledger.is_registered(*account));
    }

    handle.abort();
}

#[tokio::test]
async fn test_insufficient_accounts_is_fatal() {
    let ledger = Arc::new(SimulatedLedger::new(10));

    let pool = OraclePool::new(config(20), ledger.clone());
    let err = assert_err!(pool.start().await);

    assert_eq!(
        err,
        OracleError::InsufficientAccounts {
            available: 10,
            requested: 20
        }
    );
    assert!(err.is_fatal());
    assert_eq!(ledger.registered_count(), 0);
}

#[tokio::test]
async fn test_history_is_answered_on_start() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);
    ledger.request_status_with_index(9, airline(), "ND1309", U256::from(1u64));

    let handle = start(&ledger, 1).await;
    wait_for_responses(&ledger, 1).await;

    let responses = ledger.responses_from(oracle);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status_code, 30);

    handle.abort();
}

#[tokio::test]
async fn test_second_start_on_same_ledger_fails_registration() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);
    ledger.request_status_with_index(5, airline(), "ND1309", U256::from(1u64));

    let first = start(&ledger, 1).await;
    wait_for_responses(&ledger, 1).await;
    first.abort();

    // The contract refuses a second registration, so the new worker stops there
    let second = start(&ledger, 1).await;
    let health = second.health();
    assert_eq!(health.registration_failed, 1);
    assert_eq!(health.listening, 0);
    assert!(!health.healthy);
    assert_eq!(
        second.oracle(oracle).unwrap().state,
        OracleState::RegistrationFailed
    );

    ledger.request_status_with_index(9, airline(), "ND1309", U256::from(2u64));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ledger.responses_from(oracle).len(), 1);
}

#[tokio::test]
async fn test_stalled_registration_does_not_hold_back_other_oracles() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let accounts = pool_accounts(&ledger, 3);
    let stalled = accounts[0];
    ledger.delay_registration(stalled, Duration::from_secs(3600));

    let pool = OraclePool::new(config(3), ledger.clone());
    let handle = assert_ok!(pool.start().await);

    let others_listening = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while handle.health().listening < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(others_listening.is_ok(), "other oracles never started listening");
    assert_eq!(
        handle.oracle(stalled).unwrap().state,
        OracleState::Registering
    );

    request_every_index(&ledger, "ND1309");
    wait_for_responses(&ledger, 2 * 3).await;
    assert!(ledger.responses_from(stalled).is_empty());
    assert!(!handle.wait_until_settled(Duration::from_millis(100)).await);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_submissions_for_one_oracle_overlap() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);
    ledger.delay_responses(oracle, Duration::from_secs(5));

    let handle = start(&ledger, 1).await;

    ledger.request_status_with_index(2, airline(), "ND1309", U256::from(1u64));
    ledger.request_status_with_index(5, airline(), "ND1310", U256::from(2u64));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(ledger.peak_submissions_in_flight(), 2);
    assert!(ledger.responses().is_empty());
    assert_eq!(handle.oracle(oracle).unwrap().state, OracleState::Responding);

    wait_for_responses(&ledger, 2).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = handle.oracle(oracle).unwrap();
    assert_eq!(status.state, OracleState::Listening);
    assert_eq!(status.responses_submitted, 2);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_resubscribing_does_not_answer_a_request_twice() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);
    ledger.request_status_with_index(5, airline(), "ND1309", U256::from(1u64));
    ledger.end_streams_after(1);

    // Each stream closes as soon as it is opened, so the pool never stays settled
    let pool = OraclePool::new(config(1), ledger.clone());
    let handle = assert_ok!(pool.start().await);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(ledger.responses_from(oracle).len(), 1);

    // Reopened at about 1s, 3s, 7s, 15s and 31s: the delay doubles while
    // reopened streams bring nothing new
    let opened = ledger.subscriptions_opened();
    assert!(
        (5..=7).contains(&opened),
        "expected backoff to space out resubscriptions, got {} opens",
        opened
    );

    let status = handle.oracle(oracle).unwrap();
    assert_eq!(status.events_seen, 1);
    assert_eq!(status.responses_submitted, 1);

    handle.abort();
}

#[tokio::test]
async fn test_resubscribed_oracle_answers_new_requests() {
    let ledger = Arc::new(SimulatedLedger::new(10));
    let oracle = pool_accounts(&ledger, 1)[0];
    ledger.assign_indexes(oracle, [2, 5, 9]);
    ledger.request_status_with_index(5, airline(), "ND1309", U256::from(1u64));
    ledger.end_streams_after(2);

    let handle = start(&ledger, 1).await;
    wait_for_responses(&ledger, 1).await;

    // Delivered live on the first stream, which then closes
    ledger.request_status_with_index(9, airline(), "ND1310", U256::from(2u64));
    wait_for_responses(&ledger, 2).await;

    // Only reachable through a resumed subscription
    tokio::time::sleep(Duration::from_millis(1500)).await;
    ledger.request_status_with_index(2, airline(), "ND1311", U256::from(3u64));
    wait_for_responses(&ledger, 3).await;

    let indices: Vec<u8> = ledger
        .responses_from(oracle)
        .iter()
        .map(|response| response.index)
        .collect();
    assert_eq!(indices, vec![5, 9, 2]);
    assert!(ledger.subscriptions_opened() >= 2);

    handle.abort();
}
