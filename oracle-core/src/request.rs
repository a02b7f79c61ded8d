//! Request events emitted by the contract and the responses oracles send back

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::status::derive_status_code;

/// Where a log sits in the chain; orders events across blocks and within one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block: u64, log_index: u64) -> Self {
        Self { block, log_index }
    }
}

/// A flight status request emitted by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub index: u8,
    pub airline: Address,
    pub flight_name: String,
    /// Passed back to the contract verbatim, it is part of the request key
    pub timestamp: U256,
    /// Unknown for logs the node has not placed in a block yet
    #[serde(default)]
    pub position: Option<EventPosition>,
}

/// An oracle's answer to a request event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub index: u8,
    pub airline: Address,
    pub flight_name: String,
    pub timestamp: U256,
    pub status_code: u8,
}

impl OracleResponse {
    /// Build the response every oracle holding `event.index` would build
    pub fn for_event(event: &RequestEvent) -> Self {
        Self {
            index: event.index,
            airline: event.airline,
            flight_name: event.flight_name.clone(),
            timestamp: event.timestamp,
            status_code: derive_status_code(i64::from(event.index)),
        }
    }
}
