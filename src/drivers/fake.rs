//! fake driver
//!
//! In-memory driver implementing all four capability groups on top of the
//! shared lifecycle engine. Volume contents are byte buffers held in
//! memory, mounts are recorded without touching the OS, and attach hands
//! out a synthetic device path.

use crate::domain::capability::CapabilitySet;
use crate::domain::ports::{
    BlockDriver, IoDriver, MetadataStoreRef, SnapshotDriver, StoreEnumerator, VolumeDriver,
};
use crate::domain::volume::{
    Alerts, DriverType, Source, Stats, Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use crate::error::{Error, Result};
use crate::lifecycle::{BackendStorage, LifecycleEngine};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Registered driver name
pub const NAME: &str = "fake";

const DEVICE_PREFIX: &str = "/dev/fake";

/// Buffer limit for volumes created without a size
pub const UNSIZED_CAPACITY: u64 = 1 << 30;

// =============================================================================
// Backend storage
// =============================================================================

#[derive(Default)]
struct FakeStorage {
    data: DashMap<VolumeId, Vec<u8>>,
    stats: DashMap<VolumeId, Stats>,
}

#[async_trait]
impl BackendStorage for FakeStorage {
    async fn provision(&self, volume: &Volume) -> Result<String> {
        let contents = volume
            .parent()
            .and_then(|parent| self.data.get(parent).map(|d| d.value().clone()))
            .unwrap_or_default();
        self.data.insert(volume.id.clone(), contents);
        Ok(format!("memory://{}", volume.id))
    }

    async fn release(&self, volume: &Volume) -> Result<()> {
        self.data.remove(&volume.id);
        self.stats.remove(&volume.id);
        Ok(())
    }

    async fn bind(&self, volume: &Volume, path: &str) -> Result<()> {
        debug!(volume_id = %volume.id, path, "fake bind");
        Ok(())
    }

    async fn unbind(&self, volume: &Volume, path: &str) -> Result<()> {
        debug!(volume_id = %volume.id, path, "fake unbind");
        Ok(())
    }
}

// =============================================================================
// Driver
// =============================================================================

pub struct FakeDriver {
    engine: LifecycleEngine,
    storage: FakeStorage,
}

impl FakeDriver {
    pub fn new(store: MetadataStoreRef) -> Self {
        Self {
            engine: LifecycleEngine::new(NAME, store),
            storage: FakeStorage::default(),
        }
    }
}

#[async_trait]
impl VolumeDriver for FakeDriver {
    fn name(&self) -> &str {
        NAME
    }

    fn driver_type(&self) -> DriverType {
        DriverType::Block
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    fn io(&self) -> Option<&dyn IoDriver> {
        Some(self)
    }

    fn block(&self) -> Option<&dyn BlockDriver> {
        Some(self)
    }

    fn snapshots(&self) -> Option<&dyn SnapshotDriver> {
        Some(self)
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
        self.engine.set(id, locator, spec, true).await
    }

    async fn stats(&self, id: &VolumeId) -> Result<Stats> {
        self.engine.get(id).await?;
        Ok(self
            .storage
            .stats
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }

    async fn alerts(&self, id: &VolumeId) -> Result<Alerts> {
        self.engine.get(id).await?;
        Ok(Alerts::default())
    }

    fn status(&self) -> Vec<(String, String)> {
        vec![
            ("driver".to_string(), NAME.to_string()),
            ("volumes".to_string(), self.storage.data.len().to_string()),
        ]
    }
}

#[async_trait]
impl IoDriver for FakeDriver {
    async fn read(&self, id: &VolumeId, offset: u64, len: usize) -> Result<Bytes> {
        self.engine.get(id).await?;
        let data = self
            .storage
            .data
            .get(id)
            .ok_or_else(|| Error::volume_not_found(id.as_str()))?;

        // Offsets past the addressable range read as past the end
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        let out = Bytes::copy_from_slice(&data[start..end]);
        drop(data);

        let mut stats = self.storage.stats.entry(id.clone()).or_default();
        stats.reads += 1;
        stats.read_bytes += out.len() as u64;
        Ok(out)
    }

    async fn write(&self, id: &VolumeId, offset: u64, data: Bytes) -> Result<usize> {
        let volume = self.engine.get(id).await?;
        if volume.readonly {
            return Err(Error::BadRequest(format!("volume {} is read-only", id)));
        }

        let capacity = match volume.spec.size {
            0 => UNSIZED_CAPACITY,
            size => size,
        };
        let out_of_range = || {
            Error::BadRequest(format!(
                "write of {} bytes at offset {} exceeds volume size {}",
                data.len(),
                offset,
                capacity
            ))
        };
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= capacity)
            .ok_or_else(out_of_range)?;
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = usize::try_from(end).map_err(|_| out_of_range())?;

        let mut buf = self
            .storage
            .data
            .get_mut(id)
            .ok_or_else(|| Error::volume_not_found(id.as_str()))?;
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(&data);
        drop(buf);

        let mut stats = self.storage.stats.entry(id.clone()).or_default();
        stats.writes += 1;
        stats.write_bytes += data.len() as u64;
        Ok(data.len())
    }

    async fn flush(&self, id: &VolumeId) -> Result<()> {
        self.engine.get(id).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockDriver for FakeDriver {
    async fn attach(&self, id: &VolumeId) -> Result<String> {
        let (_, device) = self
            .engine
            .modify(id, |volume| {
                let device = format!("{}/{}", DEVICE_PREFIX, volume.id);
                volume.attached_on = Some(device.clone());
                Ok(device)
            })
            .await?;
        debug!(volume_id = %id, device = %device, "attached");
        Ok(device)
    }

    async fn detach(&self, id: &VolumeId) -> Result<()> {
        self.engine
            .modify(id, |volume| {
                if let Some(path) = volume.mount_path() {
                    return Err(Error::VolumeBusy {
                        id: volume.id.to_string(),
                        reason: format!("mounted at {}", path),
                    });
                }
                volume.attached_on = None;
                Ok(())
            })
            .await?;
        debug!(volume_id = %id, "detached");
        Ok(())
    }
}

#[async_trait]
impl SnapshotDriver for FakeDriver {
    async fn snapshot(
        &self,
        id: &VolumeId,
        readonly: bool,
        locator: VolumeLocator,
    ) -> Result<VolumeId> {
        self.engine
            .snapshot(&self.storage, id, readonly, locator)
            .await
    }

    async fn snap_enumerate(
        &self,
        ids: &[VolumeId],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        self.engine.snap_enumerate(ids, labels).await
    }
}
