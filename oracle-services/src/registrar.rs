//! Oracle registration and index assignment

use std::sync::Arc;

use alloy::primitives::U256;
use tracing::{info, warn};

use oracle_chain::OracleContract;
use oracle_core::{Account, AssignedIndices, OracleAccount, OracleResult, RegistrationState};

/// Registers pool accounts with the contract, one account at a time per call
///
/// Every method contains its own failures: a rejected registration or a
/// failed index read affects only the account it was made for.
#[derive(Clone)]
pub struct OracleRegistrar {
    contract: Arc<dyn OracleContract>,
}

impl OracleRegistrar {
    pub fn new(contract: Arc<dyn OracleContract>) -> Self {
        Self { contract }
    }

    /// Submit the registration transaction for `account`
    pub async fn register(&self, account: Account, fee: U256) -> RegistrationState {
        info!("Registering oracle for account {}", account);

        match self.contract.register_oracle(account, fee).await {
            Ok(()) => {
                info!("Oracle registered: {}", account);
                RegistrationState::Registered
            }
            Err(e) => {
                warn!("Registration failed for {}: {}", account, e);
                RegistrationState::RegistrationFailed
            }
        }
    }

    pub async fn fetch_assigned_indices(&self, account: Account) -> OracleResult<AssignedIndices> {
        let indexes = self.contract.my_indexes(account).await?;
        Ok(AssignedIndices::from(indexes))
    }

    /// Register `account` and, if that worked, look up its indices
    ///
    /// An index fetch failure leaves the oracle registered with no indices.
    pub async fn enroll(&self, account: Account, fee: U256) -> OracleAccount {
        let mut oracle = OracleAccount::new(account);

        oracle.state = self.register(account, fee).await;
        if !oracle.is_registered() {
            return oracle;
        }

        match self.fetch_assigned_indices(account).await {
            Ok(indices) => {
                info!("Oracle {} assigned indexes {}", account, indices);
                oracle.indices = indices;
            }
            Err(e) => {
                warn!(
                    "Index fetch failed for {}, oracle will not answer requests: {}",
                    account, e
                );
            }
        }

        oracle
    }
}
