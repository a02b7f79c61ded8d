//! Matching request events to an oracle and submitting its answer

use std::sync::Arc;

use tracing::{debug, info, warn};

use oracle_chain::OracleContract;
use oracle_core::{FlightStatus, OracleAccount, OracleError, OracleResponse, RequestEvent};

/// What happened to one event for one oracle
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The event's index is not assigned to this oracle
    Ignored,
    Submitted { status_code: u8 },
    /// Submission failed; never retried
    Failed(OracleError),
}

impl DispatchOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, DispatchOutcome::Submitted { .. })
    }
}

#[derive(Clone)]
pub struct ResponseDispatcher {
    contract: Arc<dyn OracleContract>,
}

impl ResponseDispatcher {
    pub fn new(contract: Arc<dyn OracleContract>) -> Self {
        Self { contract }
    }

    /// Whether `oracle` should answer `event` at all
    pub fn matches(oracle: &OracleAccount, event: &RequestEvent) -> bool {
        oracle.accepts(event.index)
    }

    /// Answer `event` on behalf of `oracle` if one of its indices matches
    pub async fn on_event(&self, oracle: &OracleAccount, event: &RequestEvent) -> DispatchOutcome {
        if !Self::matches(oracle, event) {
            return DispatchOutcome::Ignored;
        }

        let response = OracleResponse::for_event(event);
        let status = FlightStatus::from_code(response.status_code)
            .map(|s| s.display_name())
            .unwrap_or("unknown");

        debug!(
            "[Dispatcher] {} answering index={} flight={} with {} ({})",
            oracle.account, event.index, event.flight_name, response.status_code, status
        );

        match self.contract.submit_response(oracle.account, &response).await {
            Ok(()) => {
                info!(
                    "[Dispatcher] {} submitted status {} for flight {} (index {})",
                    oracle.account, response.status_code, event.flight_name, event.index
                );
                DispatchOutcome::Submitted {
                    status_code: response.status_code,
                }
            }
            Err(e) => {
                warn!(
                    "[Dispatcher] {} failed to submit response for flight {} (index {}): {}",
                    oracle.account, event.flight_name, event.index, e
                );
                DispatchOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use oracle_chain::SimulatedLedger;
    use oracle_core::{AssignedIndices, RegistrationState};

    fn registered(account: Address, indices: [u8; 3]) -> OracleAccount {
        OracleAccount {
            account,
            state: RegistrationState::Registered,
            indices: AssignedIndices::from(indices),
        }
    }

    async fn ledger_with_oracle(indices: [u8; 3]) -> (Arc<SimulatedLedger>, OracleAccount) {
        let ledger = Arc::new(SimulatedLedger::new(3));
        let account = ledger.account_list()[2];
        ledger.assign_indexes(account, indices);
        ledger
            .register_oracle(account, U256::from(1_000_000_000_000_000_000u128))
            .await
            .unwrap();
        (ledger, registered(account, indices))
    }

    #[tokio::test]
    async fn test_matching_index_submits() {
        let (ledger, oracle) = ledger_with_oracle([2, 5, 9]).await;
        let event = ledger.request_status_with_index(
            5,
            Address::with_last_byte(1),
            "ND1309",
            U256::from(1u64),
        );

        let dispatcher = ResponseDispatcher::new(ledger.clone());
        let outcome = dispatcher.on_event(&oracle, &event).await;

        assert_eq!(outcome, DispatchOutcome::Submitted { status_code: 50 });
        let responses = ledger.responses_from(oracle.account);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, 50);
    }

    #[tokio::test]
    async fn test_unassigned_index_is_ignored() {
        let (ledger, oracle) = ledger_with_oracle([2, 5, 9]).await;
        let event = ledger.request_status_with_index(
            3,
            Address::with_last_byte(1),
            "ND1309",
            U256::from(1u64),
        );

        let dispatcher = ResponseDispatcher::new(ledger.clone());
        let outcome = dispatcher.on_event(&oracle, &event).await;

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(ledger.responses().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_oracle_is_ignored() {
        let ledger = Arc::new(SimulatedLedger::new(3));
        let mut oracle = registered(ledger.account_list()[2], [2, 5, 9]);
        oracle.state = RegistrationState::RegistrationFailed;
        let event = RequestEvent {
            index: 5,
            airline: Address::with_last_byte(1),
            flight_name: "ND1309".to_string(),
            timestamp: U256::from(1u64),
            position: None,
        };

        let dispatcher = ResponseDispatcher::new(ledger);
        assert_eq!(dispatcher.on_event(&oracle, &event).await, DispatchOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_reported() {
        let (ledger, oracle) = ledger_with_oracle([2, 5, 9]).await;
        ledger.reject_responses(oracle.account);
        let event = ledger.request_status_with_index(
            9,
            Address::with_last_byte(1),
            "ND1309",
            U256::from(1u64),
        );

        let dispatcher = ResponseDispatcher::new(ledger.clone());
        let outcome = dispatcher.on_event(&oracle, &event).await;

        assert!(matches!(outcome, DispatchOutcome::Failed(OracleError::Rejected(_))));
        assert!(ledger.responses().is_empty());
    }
}
