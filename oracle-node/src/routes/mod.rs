//! HTTP route definitions

mod health;

use axum::Router;

use crate::AppState;

/// Create the health routes served on `ORACLE_HEALTH_PORT`
pub fn health_routes() -> Router<AppState> {
    health::routes()
}
