//! Per-oracle subscription to the contract's request events

use std::sync::Arc;
use std::time::Duration;

use futures::{future, StreamExt};
use tracing::{debug, info};

use oracle_chain::{OracleContract, RequestStream};
use oracle_core::{Account, EventPosition, OracleResult};

/// Reconnect delay base
const RESUBSCRIBE_DELAY_BASE: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling
const RESUBSCRIBE_DELAY_MAX: Duration = Duration::from_secs(30);

/// A request-event subscription owned by a single oracle
///
/// `open` starts from `from_block` and replays the full history from there.
/// `resume` reopens after an event the oracle already handled.
#[derive(Clone)]
pub struct RequestSubscription {
    contract: Arc<dyn OracleContract>,
    account: Account,
    from_block: u64,
}

impl RequestSubscription {
    pub fn new(contract: Arc<dyn OracleContract>, account: Account, from_block: u64) -> Self {
        Self {
            contract,
            account,
            from_block,
        }
    }

    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    /// Establish the subscription and hand back its event stream
    pub async fn open(&self) -> OracleResult<RequestStream> {
        debug!(
            "[Subscription] Opening request stream for {} from block {}",
            self.account, self.from_block
        );
        let stream = self.contract.subscribe_requests(self.from_block).await?;
        info!(
            "[Subscription] {} listening for OracleRequest events",
            self.account
        );
        Ok(stream)
    }

    /// Reopen the subscription, skipping everything up to and including `after`
    ///
    /// Events without a chain position are always delivered.
    pub async fn resume(&self, after: EventPosition) -> OracleResult<RequestStream> {
        let from_block = after.block.max(self.from_block);
        debug!(
            "[Subscription] Resuming request stream for {} after block {} log {}",
            self.account, after.block, after.log_index
        );

        let stream = self.contract.subscribe_requests(from_block).await?;
        info!(
            "[Subscription] {} listening for OracleRequest events from block {}",
            self.account, from_block
        );

        Ok(stream
            .filter(move |item| {
                let fresh = match item {
                    Ok(event) => !matches!(event.position, Some(position) if position <= after),
                    Err(_) => true,
                };
                future::ready(fresh)
            })
            .boxed())
    }
}

/// Delay before re-establishing a subscription after `attempt` consecutive failures
pub(crate) fn resubscribe_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    RESUBSCRIBE_DELAY_BASE
        .saturating_mul(2u32.pow(exponent))
        .min(RESUBSCRIBE_DELAY_MAX)
}
