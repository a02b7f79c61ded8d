//! Core types for the flight status oracle network
//!
//! This crate defines the shared data structures used by every oracle worker,
//! including accounts and their registration state, request events, and the
//! deterministic status code derivation all oracles agree on.

pub mod account;
pub mod error;
pub mod request;
pub mod status;

pub use account::{
    select_oracle_candidates, Account, AssignedIndices, OracleAccount, RegistrationState,
};
pub use error::{OracleError, OracleResult};
pub use request::{EventPosition, OracleResponse, RequestEvent};
pub use status::{derive_status_code, FlightStatus, STATUS_CODES};
