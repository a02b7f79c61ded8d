//! Oracle accounts, their registration state and index assignments

use std::collections::BTreeSet;
use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};

/// A ledger identity able to send transactions
pub type Account = Address;

/// Outcome of an oracle's registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Unregistered,
    Registered,
    RegistrationFailed,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registered => "registered",
            RegistrationState::RegistrationFailed => "registration failed",
        };
        write!(f, "{}", name)
    }
}

/// Indices the contract assigned to an oracle at registration
///
/// The contract hands out three per oracle. An empty set means the fetch failed
/// and the oracle will never match a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedIndices(BTreeSet<u8>);

impl AssignedIndices {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: u8) -> bool {
        self.0.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

impl From<[u8; 3]> for AssignedIndices {
    fn from(indices: [u8; 3]) -> Self {
        Self(indices.into_iter().collect())
    }
}

impl FromIterator<u8> for AssignedIndices {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AssignedIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", indices.join(", "))
    }
}

/// An account in the oracle pool together with what the contract knows about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAccount {
    pub account: Account,
    pub state: RegistrationState,
    pub indices: AssignedIndices,
}

impl OracleAccount {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            state: RegistrationState::Unregistered,
            indices: AssignedIndices::empty(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Whether this oracle should answer a request carrying `index`
    pub fn accepts(&self, index: u8) -> bool {
        self.is_registered() && self.indices.contains(index)
    }

    /// Registered, but without indices it can never respond
    pub fn is_inert(&self) -> bool {
        self.is_registered() && self.indices.is_empty()
    }
}

/// Pick the oracle pool from the ledger's account list
///
/// The front of the list belongs to the owner, airlines and passengers, so the
/// pool is the last `count` accounts, in reverse order.
pub fn select_oracle_candidates(
    all_accounts: &[Account],
    count: usize,
) -> OracleResult<Vec<Account>> {
    if all_accounts.len() < count {
        return Err(OracleError::InsufficientAccounts {
            available: all_accounts.len(),
            requested: count,
        });
    }

    Ok(all_accounts.iter().rev().take(count).copied().collect())
}
