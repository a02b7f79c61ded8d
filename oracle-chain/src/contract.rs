//! The contract surface an oracle worker depends on

use alloy::primitives::U256;
use async_trait::async_trait;
use futures::stream::BoxStream;

use oracle_core::{Account, OracleResponse, OracleResult, RequestEvent};

/// Unbounded stream of request events; individual items may carry decode errors
pub type RequestStream = BoxStream<'static, OracleResult<RequestEvent>>;

/// Everything an oracle needs from the FlightSuretyApp contract and its ledger
#[async_trait]
pub trait OracleContract: Send + Sync {
    /// Accounts the ledger node manages, in ledger order
    async fn accounts(&self) -> OracleResult<Vec<Account>>;

    /// Current registration fee in wei
    async fn registration_fee(&self) -> OracleResult<U256>;

    /// Register `from` as an oracle, paying `fee`
    async fn register_oracle(&self, from: Account, fee: U256) -> OracleResult<()>;

    /// Indices the contract assigned to `account`
    async fn my_indexes(&self, account: Account) -> OracleResult<[u8; 3]>;

    /// Request events from `from_block` onwards, history first, then live
    async fn subscribe_requests(&self, from_block: u64) -> OracleResult<RequestStream>;

    /// Submit a status response from `from`
    async fn submit_response(&self, from: Account, response: &OracleResponse) -> OracleResult<()>;
}
