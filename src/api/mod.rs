//! costsheet API Server module
//!
//! Provides the HTTP REST API over the calculator, snapshot store and exporter.
//! Run with `costsheet serve` or `costsheet-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run_api_server, ApiConfig, AppState};
