//! Oracle Chain - FlightSuretyApp contract access
//!
//! This crate provides:
//! - The `OracleContract` trait, the narrow slice of the contract oracles use
//! - `FlightSuretyClient`, an alloy-backed implementation over a WebSocket provider
//! - `SimulatedLedger`, an in-process contract with fault injection, used by tests

pub mod contract;
pub mod flight_surety;
pub mod simulated;

pub use contract::{OracleContract, RequestStream};
pub use flight_surety::{FlightSuretyClient, DEFAULT_GAS_LIMIT};
pub use simulated::{SimulatedLedger, MAX_INDEX};
