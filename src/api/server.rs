//! API Server
//!
//! Runs the REST gateway for the configured driver until shutdown.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::metrics::GatewayMetrics;
use super::rest::VolumeApi;
use crate::drivers::DriverRegistry;

/// Default REST API bind address
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:9005";

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Driver the gateway serves
    pub driver: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 9005)),
            driver: crate::drivers::vfs::NAME.to_string(),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST gateway server
pub struct ApiServer {
    config: ApiServerConfig,
    registry: Arc<DriverRegistry>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, registry: Arc<DriverRegistry>) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            registry,
            metrics: Arc::new(GatewayMetrics::new()?),
            shutdown_tx,
        })
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        self.metrics.clone()
    }

    /// Serve until [`ApiServer::shutdown`] is called, then shut drivers down
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.rest_addr;
        let app = VolumeApi::new(
            self.registry.clone(),
            self.config.driver.clone(),
            self.metrics.clone(),
        )
        .build();

        if !self.registry.is_registered(&self.config.driver) {
            warn!(
                driver = %self.config.driver,
                registered = ?self.registry.names(),
                "serving an unregistered driver; every request will fail"
            );
        }

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            Error::Internal(format!("Failed to bind REST server: {}", e))
        })?;
        info!(addr = %addr, driver = %self.config.driver, "REST API listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        self.registry.shutdown_all().await;
        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
