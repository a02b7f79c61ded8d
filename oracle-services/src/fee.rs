//! Registration fee lookup with a fixed fallback

use std::fmt;
use std::sync::Arc;

use alloy::primitives::U256;
use serde::Serialize;
use tracing::{info, warn};

use oracle_chain::OracleContract;

/// Where a resolved fee came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSource {
    Contract,
    Fallback,
}

impl fmt::Display for FeeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeSource::Contract => write!(f, "contract"),
            FeeSource::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedFee {
    pub amount: U256,
    pub source: FeeSource,
}

/// Reads the contract's registration fee once per pool
pub struct FeeResolver {
    contract: Arc<dyn OracleContract>,
    default_fee: U256,
}

impl FeeResolver {
    pub fn new(contract: Arc<dyn OracleContract>, default_fee: U256) -> Self {
        Self {
            contract,
            default_fee,
        }
    }

    /// Ask the contract for its fee, falling back to the default on any read failure
    pub async fn resolve(&self) -> ResolvedFee {
        let resolved = match self.contract.registration_fee().await {
            Ok(amount) => ResolvedFee {
                amount,
                source: FeeSource::Contract,
            },
            Err(e) => {
                warn!("Failed to fetch registration fee, using default: {}", e);
                ResolvedFee {
                    amount: self.default_fee,
                    source: FeeSource::Fallback,
                }
            }
        };

        info!(
            "Current registration fee is {} wei ({})",
            resolved.amount, resolved.source
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_chain::SimulatedLedger;

    #[tokio::test]
    async fn test_fee_from_contract() {
        let ledger = Arc::new(SimulatedLedger::new(1));
        ledger.set_fee(U256::from(5u64));

        let resolver = FeeResolver::new(ledger, U256::from(1u64));
        let fee = resolver.resolve().await;

        assert_eq!(fee.amount, U256::from(5u64));
        assert_eq!(fee.source, FeeSource::Contract);
    }

    #[tokio::test]
    async fn test_fee_fallback_on_read_failure() {
        let ledger = Arc::new(SimulatedLedger::new(1));
        ledger.fail_fee_query(true);

        let resolver = FeeResolver::new(ledger, U256::from(1u64));
        let fee = resolver.resolve().await;

        assert_eq!(fee.amount, U256::from(1u64));
        assert_eq!(fee.source, FeeSource::Fallback);
    }
}
