//! Error types for the oracle network

use thiserror::Error;

/// Oracle-wide error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// A read against the ledger failed (account list, fee, indices, events)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ledger refused a state-changing transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Insufficient accounts: {available} available, {requested} requested")]
    InsufficientAccounts { available: usize, requested: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OracleError {
    pub fn transport(msg: impl Into<String>) -> Self {
        OracleError::Transport(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        OracleError::Rejected(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        OracleError::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        OracleError::Config(msg.into())
    }

    /// Configuration failures abort startup; everything else is contained
    /// to the account or event that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OracleError::InsufficientAccounts { .. } | OracleError::Config(_)
        )
    }
}

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;
