//! Volume Gateway
//!
//! Serves the volume lifecycle of one registered driver over REST.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_gateway::{
    register_builtin, store, ApiServer, ApiServerConfig, DriverRegistry, GatewayConfig, Result,
    StoreKind, SysMounter,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Gateway - uniform volume lifecycle over pluggable drivers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; flags override its values
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR")]
    api_addr: Option<String>,

    /// Driver served by this gateway
    #[arg(long, env = "VOLUME_DRIVER")]
    driver: Option<String>,

    /// Metadata store (memory, local)
    #[arg(long, env = "METADATA_STORE")]
    store: Option<StoreKind>,

    /// Directory for the local metadata store
    #[arg(long, env = "METADATA_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Merge flags over the file configuration
    async fn resolve(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path).await?,
            None => GatewayConfig::default(),
        };
        if let Some(addr) = &self.api_addr {
            config.api_addr = addr.clone();
        }
        if let Some(driver) = &self.driver {
            config.driver = driver.clone();
        }
        if let Some(kind) = self.store {
            config.store = kind;
        }
        if let Some(path) = &self.store_path {
            config.store_path = Some(path.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.resolve().await?;

    info!("Starting Volume Gateway");
    info!("  Version: {}", volume_gateway::VERSION);
    info!("  REST API: {}", config.api_addr);
    info!("  Driver: {}", config.driver);
    info!("  Metadata store: {:?}", config.store);

    let metadata = store::open(config.store, config.store_path.clone()).await?;

    let registry = Arc::new(DriverRegistry::with_params(config.drivers.clone()));
    register_builtin(&registry, metadata, Arc::new(SysMounter))?;
    info!("Registered drivers: {}", registry.names().join(", "));

    let api_config = ApiServerConfig {
        rest_addr: config.socket_addr()?,
        driver: config.driver.clone(),
    };
    let server = Arc::new(ApiServer::new(api_config, registry)?);

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;

    info!("Gateway shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
