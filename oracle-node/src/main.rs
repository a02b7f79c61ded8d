//! Flight Status Oracle Node
//!
//! Runs a pool of oracles against a FlightSuretyApp deployment and answers
//! its flight status requests.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use oracle_chain::{FlightSuretyClient, OracleContract};
use oracle_services::{HealthMonitor, OracleConfig, OraclePool, PoolHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ceiling for the delay between pool startup attempts
const SUPERVISOR_MAX_BACKOFF_SECONDS: u64 = 60;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub monitor: HealthMonitor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,oracle_node=debug,oracle_services=debug")
            }),
        )
        .init();

    info!("Starting flight status oracle node");

    let config = OracleConfig::from_env()?;
    info!(
        "FlightSuretyApp at {} via {} (pool of {}, requests from block {})",
        config.contract_address, config.rpc_url, config.pool_size, config.from_block
    );

    let pool = tokio::select! {
        started = start_pool(&config) => started?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested before the oracle pool started");
            return Ok(());
        }
    };

    let monitor = pool.monitor();
    tokio::spawn(
        monitor
            .clone()
            .run_reporter(Duration::from_secs(config.health_log_interval_secs)),
    );

    if let Some(port) = config.health_port {
        let app = routes::health_routes().with_state(AppState { monitor });

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Health endpoint listening on http://{}/health", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Health endpoint stopped: {}", e);
            }
        });
    } else {
        info!("Health endpoint disabled (ORACLE_HEALTH_PORT not set)");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down oracle pool");

    pool.abort();
    pool.join().await;

    Ok(())
}

/// Connect and start the pool, retrying with backoff until it starts
///
/// Configuration errors (too few accounts) are returned immediately.
async fn start_pool(config: &OracleConfig) -> anyhow::Result<PoolHandle> {
    let mut restart_count = 0u32;

    loop {
        let started = match FlightSuretyClient::connect(
            &config.rpc_url,
            config.contract_address,
            config.gas_limit,
        )
        .await
        {
            Ok(client) => {
                info!("[Supervisor] Starting oracle pool against {}", client.address());
                let contract: Arc<dyn OracleContract> = Arc::new(client);
                OraclePool::new(config.clone(), contract).start().await
            }
            Err(e) => Err(e),
        };

        match started {
            Ok(pool) => return Ok(pool),
            Err(e) if e.is_fatal() => {
                error!("[Supervisor] Oracle pool cannot start: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                restart_count = restart_count.saturating_add(1);
                let backoff_seconds =
                    2u64.saturating_pow(restart_count.min(6)).min(SUPERVISOR_MAX_BACKOFF_SECONDS);
                warn!(
                    "[Supervisor] Oracle pool startup failed: {}. Retrying in {}s (attempt {})",
                    e, backoff_seconds, restart_count
                );
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }
    }
}
