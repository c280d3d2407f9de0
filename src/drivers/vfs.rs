//! vfs driver
//!
//! Reference driver: each volume is a directory under a base directory and
//! mounting bind-mounts that directory onto the requested path. Only the
//! Enumeration capability is declared; spec changes are rejected.

use crate::domain::capability::{Capability, CapabilitySet};
use crate::domain::ports::{MetadataStoreRef, MounterRef, StoreEnumerator, VolumeDriver};
use crate::domain::volume::{DriverType, Source, Volume, VolumeId, VolumeLocator, VolumeSpec};
use crate::drivers::DriverParams;
use crate::error::{Error, Result};
use crate::lifecycle::{BackendStorage, LifecycleEngine};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Registered driver name
pub const NAME: &str = "vfs";

/// Parameter naming the directory volumes are created under
pub const PARAM_BASE_DIR: &str = "base_dir";

pub const DEFAULT_BASE_DIR: &str = "/var/lib/volume-gateway/vfs";

const VOLUME_DIR_MODE: u32 = 0o744;

// =============================================================================
// Backend storage
// =============================================================================

/// Directory-per-volume storage with bind mounts
struct VfsStorage {
    base_dir: PathBuf,
    mounter: MounterRef,
}

impl VfsStorage {
    fn volume_dir(&self, id: &VolumeId) -> PathBuf {
        self.base_dir.join(id.as_str())
    }

    async fn blocking<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(MounterRef) -> Result<()> + Send + 'static,
    {
        let mounter = self.mounter.clone();
        tokio::task::spawn_blocking(move || f(mounter))
            .await
            .map_err(|e| Error::Internal(format!("mount task failed: {}", e)))?
    }
}

#[async_trait]
impl BackendStorage for VfsStorage {
    async fn provision(&self, volume: &Volume) -> Result<String> {
        let dir = self.volume_dir(&volume.id);
        let provisioned = async {
            fs::create_dir_all(&dir).await?;
            fs::set_permissions(&dir, std::fs::Permissions::from_mode(VOLUME_DIR_MODE)).await
        }
        .await;

        provisioned.map_err(|e| Error::Provision {
            id: volume.id.to_string(),
            reason: format!("{}: {}", dir.display(), e),
        })?;
        debug!(volume_id = %volume.id, dir = %dir.display(), "volume directory created");
        Ok(dir.to_string_lossy().into_owned())
    }

    async fn release(&self, volume: &Volume) -> Result<()> {
        fs::remove_dir_all(self.volume_dir(&volume.id)).await?;
        Ok(())
    }

    async fn bind(&self, volume: &Volume, path: &str) -> Result<()> {
        let source = if volume.device_path.is_empty() {
            self.volume_dir(&volume.id)
        } else {
            PathBuf::from(&volume.device_path)
        };
        let target = PathBuf::from(path);
        let fs_type = volume.spec.format.mount_type();

        self.blocking(move |mounter| {
            // Clear anything left mounted at the target
            if let Err(e) = mounter.unmount(&target) {
                debug!(target = %target.display(), error = %e, "no stale mount to clear");
            }
            mounter.mount(&source, &target, fs_type)
        })
        .await
    }

    async fn unbind(&self, _volume: &Volume, path: &str) -> Result<()> {
        let target = PathBuf::from(path);
        self.blocking(move |mounter| mounter.unmount(&target)).await
    }
}

// =============================================================================
// Driver
// =============================================================================

pub struct VfsDriver {
    engine: LifecycleEngine,
    storage: VfsStorage,
}

impl VfsDriver {
    pub async fn new(
        store: MetadataStoreRef,
        mounter: MounterRef,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            Error::Configuration(format!(
                "cannot create vfs base directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;
        info!(base_dir = %base_dir.display(), store = store.name(), "vfs driver ready");

        Ok(Self {
            engine: LifecycleEngine::new(NAME, store),
            storage: VfsStorage { base_dir, mounter },
        })
    }

    /// Build from registry parameters; `base_dir` defaults to [`DEFAULT_BASE_DIR`]
    pub async fn from_params(
        store: MetadataStoreRef,
        mounter: MounterRef,
        params: &DriverParams,
    ) -> Result<Self> {
        let base_dir = params
            .get(PARAM_BASE_DIR)
            .map(String::as_str)
            .unwrap_or(DEFAULT_BASE_DIR);
        for key in params.keys().filter(|k| k.as_str() != PARAM_BASE_DIR) {
            warn!(param = %key, "ignoring unknown vfs parameter");
        }
        Self::new(store, mounter, base_dir).await
    }

    pub fn base_dir(&self) -> &Path {
        &self.storage.base_dir
    }
}

#[async_trait]
impl VolumeDriver for VfsDriver {
    fn name(&self) -> &str {
        NAME
    }

    fn driver_type(&self) -> DriverType {
        DriverType::File
    }

    fn capabilities(&self) -> CapabilitySet {
        Capability::Enumeration.into()
    }

    fn enumerator(&self) -> Option<&dyn StoreEnumerator> {
        Some(&self.engine)
    }

    async fn create(
        &self,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Result<VolumeId> {
        self.engine.create(&self.storage, locator, source, spec).await
    }

    async fn delete(&self, id: &VolumeId) -> Result<()> {
        self.engine.delete(&self.storage, id).await
    }

    async fn mount(&self, id: &VolumeId, path: &str) -> Result<()> {
        self.engine.mount(&self.storage, id, path).await
    }

    async fn unmount(&self, id: &VolumeId, path: &str) -> Result<()> {
        self.engine.unmount(&self.storage, id, path).await
    }

    async fn set(
        &self,
        id: &VolumeId,
        locator: Option<VolumeLocator>,
        spec: Option<VolumeSpec>,
    ) -> Result<()> {
        self.engine.set(id, locator, spec, false).await
    }
}
