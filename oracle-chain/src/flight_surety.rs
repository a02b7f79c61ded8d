//! FlightSuretyApp client over an Ethereum JSON-RPC WebSocket provider
//!
//! Transactions are sent from node-managed (unlocked) accounts, the way a
//! local development chain exposes them, so no local signer is involved.

use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Log;
use alloy::sol;
use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use tracing::{debug, info, warn};

use oracle_core::{
    Account, EventPosition, OracleError, OracleResponse, OracleResult, RequestEvent,
};

use crate::contract::{OracleContract, RequestStream};

/// Gas limit attached to every oracle transaction
pub const DEFAULT_GAS_LIMIT: u64 = 9_999_999;

// Only the functions and events oracles touch; the rest of the ABI is irrelevant here
sol! {
    #[sol(rpc)]
    contract FlightSuretyApp {
        event OracleRequest(uint8 index, address airline, string flight, uint256 timestamp);

        function REGISTRATION_FEE() external view returns (uint256);
        function registerOracle() external payable;
        function getMyIndexes() external view returns (uint8[3] memory);
        function submitOracleResponse(
            uint8 index,
            address airline,
            string flight,
            uint256 timestamp,
            uint8 statusCode
        ) external;
    }
}

/// alloy-backed `OracleContract`
#[derive(Clone)]
pub struct FlightSuretyClient {
    contract: FlightSuretyApp::FlightSuretyAppInstance<DynProvider>,
    gas_limit: u64,
}

impl FlightSuretyClient {
    /// Wrap an existing provider
    pub fn new(provider: DynProvider, address: Address, gas_limit: u64) -> Self {
        Self {
            contract: FlightSuretyApp::new(address, provider),
            gas_limit,
        }
    }

    /// Open a WebSocket provider and bind the contract at `address`
    pub async fn connect(rpc_url: &str, address: Address, gas_limit: u64) -> OracleResult<Self> {
        info!("[FlightSurety] Connecting to {}", rpc_url);

        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(rpc_url))
            .await
            .map_err(|e| {
                OracleError::transport(format!("Failed to connect to {}: {}", rpc_url, e))
            })?;

        info!("[FlightSurety] Bound FlightSuretyApp at {}", address);

        Ok(Self::new(provider.erased(), address, gas_limit))
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }
}

#[async_trait]
impl OracleContract for FlightSuretyClient {
    async fn accounts(&self) -> OracleResult<Vec<Account>> {
        self.contract
            .provider()
            .get_accounts()
            .await
            .map_err(|e| OracleError::transport(format!("eth_accounts failed: {}", e)))
    }

    async fn registration_fee(&self) -> OracleResult<U256> {
        self.contract
            .REGISTRATION_FEE()
            .call()
            .await
            .map_err(|e| OracleError::transport(format!("REGISTRATION_FEE call failed: {}", e)))
    }

    async fn register_oracle(&self, from: Account, fee: U256) -> OracleResult<()> {
        let pending = self
            .contract
            .registerOracle()
            .from(from)
            .value(fee)
            .gas(self.gas_limit)
            .send()
            .await
            .map_err(|e| OracleError::rejected(format!("registerOracle failed: {}", e)))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| OracleError::transport(format!("registerOracle receipt: {}", e)))?;

        if !receipt.status() {
            return Err(OracleError::rejected(format!(
                "registerOracle reverted in {}",
                receipt.transaction_hash()
            )));
        }

        debug!("[FlightSurety] registerOracle mined in {}", receipt.transaction_hash());
        Ok(())
    }

    async fn my_indexes(&self, account: Account) -> OracleResult<[u8; 3]> {
        self.contract
            .getMyIndexes()
            .from(account)
            .call()
            .await
            .map_err(|e| OracleError::transport(format!("getMyIndexes call failed: {}", e)))
    }

    async fn subscribe_requests(&self, from_block: u64) -> OracleResult<RequestStream> {
        let filter = self.contract.OracleRequest_filter().from_block(from_block);

        // Subscribe before querying history so nothing falls between the two;
        // live logs the history already covered are dropped below.
        let live = filter
            .subscribe()
            .await
            .map_err(|e| OracleError::transport(format!("OracleRequest subscribe failed: {}", e)))?;

        let history = filter.query().await.map_err(|e| {
            OracleError::transport(format!("OracleRequest history query failed: {}", e))
        })?;

        let last_seen = history.iter().filter_map(|(_, log)| log_position(log)).max();

        debug!(
            "[FlightSurety] Replaying {} historical OracleRequest events from block {}",
            history.len(),
            from_block
        );

        let history = stream::iter(
            history
                .into_iter()
                .filter(|(_, log)| !log.removed)
                .map(|(event, log)| Ok(request_from_event(event, &log))),
        );

        let live = live.into_stream().filter_map(move |item| {
            let item = match item {
                Ok((_, log)) if log.removed => None,
                Ok((event, log)) => match (last_seen, log_position(&log)) {
                    (Some(seen), Some(position)) if position <= seen => None,
                    _ => Some(Ok(request_from_event(event, &log))),
                },
                Err(e) => {
                    warn!("[FlightSurety] Undecodable OracleRequest log: {}", e);
                    Some(Err(OracleError::decode(e.to_string())))
                }
            };
            future::ready(item)
        });

        Ok(history.chain(live).boxed())
    }

    async fn submit_response(&self, from: Account, response: &OracleResponse) -> OracleResult<()> {
        let pending = self
            .contract
            .submitOracleResponse(
                response.index,
                response.airline,
                response.flight_name.clone(),
                response.timestamp,
                response.status_code,
            )
            .from(from)
            .gas(self.gas_limit)
            .send()
            .await
            .map_err(|e| OracleError::rejected(format!("submitOracleResponse failed: {}", e)))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| OracleError::transport(format!("submitOracleResponse receipt: {}", e)))?;

        if !receipt.status() {
            return Err(OracleError::rejected(format!(
                "submitOracleResponse reverted in {}",
                receipt.transaction_hash()
            )));
        }

        Ok(())
    }
}

fn request_from_event(event: FlightSuretyApp::OracleRequest, log: &Log) -> RequestEvent {
    RequestEvent {
        index: event.index,
        airline: event.airline,
        flight_name: event.flight,
        timestamp: event.timestamp,
        position: log_position(log),
    }
}

/// Ordering key of a log within the chain
fn log_position(log: &Log) -> Option<EventPosition> {
    Some(EventPosition::new(log.block_number?, log.log_index?))
}
