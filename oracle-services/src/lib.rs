//! Business logic services for the flight status oracle network
//!
//! This crate runs the oracle lifecycle on top of an `OracleContract`:
//! pick the pool, resolve the fee, register every account, then let each
//! registered oracle listen for requests and answer the ones it was assigned.

pub mod config;
pub mod dispatcher;
pub mod fee;
pub mod health;
pub mod pool;
pub mod registrar;
pub mod subscription;

pub use config::{ConfigError, OracleConfig};
pub use dispatcher::{DispatchOutcome, ResponseDispatcher};
pub use fee::{FeeResolver, FeeSource, ResolvedFee};
pub use health::{HealthMonitor, OracleMetrics, OracleState, OracleStatus, PoolHealth};
pub use pool::{OraclePool, PoolHandle};
pub use registrar::OracleRegistrar;
pub use subscription::RequestSubscription;
