//! costsheet API Server implementation
//!
//! HTTP REST API server using Axum.
//! Provides endpoints for calculate, snapshots and template export.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::auth::AccessGate;
use crate::config::AppConfig;
use crate::excel::{TemplateExporter, TemplateLayout};
use crate::store::SnapshotStore;

/// API Server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub access_key: String,
    pub template_path: PathBuf,
    pub store_path: PathBuf,
    pub layout: TemplateLayout,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(AppConfig::default())
    }
}

impl From<AppConfig> for ApiConfig {
    fn from(config: AppConfig) -> Self {
        Self {
            host: config.host,
            port: config.port,
            access_key: config.access_key,
            template_path: config.template_path,
            store_path: config.store_path,
            layout: config.layout,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub version: String,
    pub template_path: PathBuf,
    pub store: SnapshotStore,
    pub exporter: TemplateExporter,
    pub gate: AccessGate,
}

impl AppState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            template_path: config.template_path.clone(),
            store: SnapshotStore::new(&config.store_path),
            exporter: TemplateExporter::new(config.layout.clone()),
            gate: AccessGate::new(config.access_key.clone()),
        }
    }
}

/// Build the router: open health/version endpoints, access-gated `/api/v1`
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/v1/calculate", post(handlers::calculate))
        .route(
            "/api/v1/snapshots",
            get(handlers::list_snapshots).post(handlers::save_snapshot),
        )
        .route("/api/v1/snapshots/:id", get(handlers::get_snapshot))
        .route("/api/v1/export", post(handlers::export))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_access_key,
        ));

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        .merge(api)
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig) -> anyhow::Result<()> {
    // No-op when the caller already installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "costsheet=info,tower_http=info".into()),
        )
        .try_init();

    let state = Arc::new(AppState::new(&config));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("costsheet API Server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/calculate, /api/v1/snapshots, /api/v1/export");
    info!("   Health: /health, Version: /version");
    info!(
        template = %config.template_path.display(),
        store = %config.store_path.display(),
        "   Data files"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("costsheet API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== ApiConfig Tests ====================

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.access_key, "ssep2025");
        assert_eq!(config.template_path, PathBuf::from("template.xlsx"));
    }

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            store_path: PathBuf::from("/data/saved.json"),
            ..AppConfig::default()
        };
        let config = ApiConfig::from(app);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.store_path, PathBuf::from("/data/saved.json"));
    }

    #[test]
    fn test_config_address_format() {
        let config = ApiConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
            ..ApiConfig::default()
        };
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    // ==================== AppState Tests ====================

    #[test]
    fn test_app_state_from_config() {
        let config = ApiConfig {
            store_path: PathBuf::from("store.json"),
            ..ApiConfig::default()
        };
        let state = AppState::new(&config);
        assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(state.store.path(), PathBuf::from("store.json").as_path());
        assert!(state.gate.permits("ssep2025"));
    }
}
