//! Gateway Configuration
//!
//! Settings can come from a YAML file; command line flags override them.
//!
//! ```yaml
//! api_addr: 0.0.0.0:9005
//! driver: vfs
//! store: local
//! store_path: /var/lib/volume-gateway/meta
//! drivers:
//!   vfs:
//!     base_dir: /var/lib/volume-gateway/vfs
//! ```

use crate::api::server::DEFAULT_API_ADDR;
use crate::drivers::DriverParams;
use crate::error::{Error, Result};
use crate::store::StoreKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// REST API bind address
    pub api_addr: String,
    /// Driver served by the gateway
    pub driver: String,
    /// Metadata store adapter
    pub store: StoreKind,
    /// Directory for the local metadata store
    pub store_path: Option<PathBuf>,
    /// Per-driver factory parameters
    pub drivers: HashMap<String, DriverParams>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_addr: DEFAULT_API_ADDR.to_string(),
            driver: crate::drivers::vfs::NAME.to_string(),
            store: StoreKind::Memory,
            store_path: None,
            drivers: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Parse a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&raw)?;
        debug!(path = %path.display(), drivers = config.drivers.len(), "loaded configuration");
        Ok(config)
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.driver.is_empty() {
            return Err(Error::Configuration("driver name must not be empty".into()));
        }
        if self.store == StoreKind::Local && self.store_path.is_none() {
            return Err(Error::Configuration(
                "local metadata store requires store_path".into(),
            ));
        }
        Ok(())
    }
}
