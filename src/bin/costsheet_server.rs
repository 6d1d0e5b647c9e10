//! costsheet API Server binary
//!
//! HTTP REST API for cost calculation, snapshots and cost sheet export.

use clap::Parser;
use costsheet::api::{run_api_server, ApiConfig};
use costsheet::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "costsheet-server")]
#[command(version)]
#[command(about = "costsheet API Server - HTTP REST API for part cost estimation")]
#[command(long_about = r#"
costsheet API Server - HTTP REST API

Endpoints (require the x-access-key header):
  - POST /api/v1/calculate       - Compute material/processing costs
  - GET  /api/v1/snapshots       - List saved estimates (newest first)
  - POST /api/v1/snapshots       - Save an estimate
  - GET  /api/v1/snapshots/:id   - Get one saved estimate
  - POST /api/v1/export          - Fill the cost sheet template (.xlsx download)

Open endpoints:
  - GET  /health                 - Health check
  - GET  /version                - Server version info
  - GET  /                       - API documentation

Features:
  - CORS enabled for cross-origin requests
  - Graceful shutdown on SIGINT/SIGTERM
  - JSON response format with request IDs
  - Tracing and structured logging (RUST_LOG)

Example usage:
  costsheet-server                           # Start on localhost:8080
  costsheet-server --host 0.0.0.0 --port 3000 --config costsheet.yaml

  curl -X POST http://localhost:8080/api/v1/calculate \
    -H "Content-Type: application/json" \
    -H "x-access-key: ssep2025" \
    -d '{"header": {"partNumber": "96240-BQ000"}, "processLines": [{"processName": "조립", "cycleTimeSec": 60}]}'
"#)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, env = "COSTSHEET_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, env = "COSTSHEET_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "COSTSHEET_PORT")]
    port: Option<u16>,

    /// API access key
    #[arg(long, env = "COSTSHEET_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Template workbook
    #[arg(long, env = "COSTSHEET_TEMPLATE")]
    template: Option<PathBuf>,

    /// Snapshot store
    #[arg(long, env = "COSTSHEET_STORE")]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(key) = args.access_key {
        config.access_key = key;
    }
    if let Some(template) = args.template {
        config.template_path = template;
    }
    if let Some(store) = args.store {
        config.store_path = store;
    }

    run_api_server(ApiConfig::from(config)).await
}
