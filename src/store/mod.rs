//! Metadata Store Adapters
//!
//! Thin adapters implementing [`MetadataStore`] so the gateway can run
//! without an external key/value service:
//! - [`MemoryStore`]: process-local, DashMap backed
//! - [`LocalStore`]: one file per key in a local directory

mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::domain::ports::{MetadataStore, MetadataStoreRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Which store adapter to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Local,
}

impl std::str::FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreKind::Memory),
            "local" | "file" => Ok(StoreKind::Local),
            other => Err(Error::Configuration(format!(
                "unknown metadata store: {}. Use 'memory' or 'local'",
                other
            ))),
        }
    }
}

/// Open the configured store adapter
pub async fn open(kind: StoreKind, path: Option<PathBuf>) -> Result<MetadataStoreRef> {
    let store: Arc<dyn MetadataStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Local => {
            let path = path.ok_or_else(|| {
                Error::Configuration("local metadata store requires a path".into())
            })?;
            Arc::new(LocalStore::open(path).await?)
        }
    };
    Ok(store)
}
