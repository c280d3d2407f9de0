//! Capability-checked driver handle
//!
//! Every call into an optional capability group goes through
//! [`capability::require`] before reaching the driver's group interface.

use crate::domain::capability::{self, Capability, CapabilitySet};
use crate::domain::ports::{
    BlockDriver, IoDriver, SnapshotDriver, StoreEnumerator, VolumeDriverRef,
};
use crate::domain::requests::VolumeSetRequest;
use crate::domain::volume::{
    ActiveRequests, Alerts, DriverType, Source, Stats, Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use crate::error::{Error, Result};
use crate::lifecycle::{update, LockTable, UpdateStep};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a constructed driver instance
#[derive(Clone)]
pub struct DriverHandle {
    inner: VolumeDriverRef,
    update_locks: Arc<LockTable>,
}

impl DriverHandle {
    pub fn new(inner: VolumeDriverRef) -> Self {
        Self {
            inner,
            update_locks: Arc::new(LockTable::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn driver_type(&self) -> DriverType {
        self.inner.driver_type()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    pub fn status(&self) -> Vec<(String, String)> {
        self.inner.status()
    }

    /// Check whether both handles point at the same driver instance
    pub fn ptr_eq(&self, other: &DriverHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Capability resolution
    // =========================================================================

    fn io(&self, operation: &str) -> Result<&dyn IoDriver> {
        capability::require(self.capabilities(), Capability::Io, operation)?;
        self.inner.io().ok_or_else(|| Error::not_supported(operation))
    }

    fn block(&self, operation: &str) -> Result<&dyn BlockDriver> {
        capability::require(self.capabilities(), Capability::Block, operation)?;
        self.inner.block().ok_or_else(|| Error::not_supported(operation))
    }

    fn snapshots(&self, operation: &str) -> Result<&dyn SnapshotDriver> {
        capability::require(self.capabilities(), Capability::Snapshot, operation)?;
        self.inner
            .snapshots()
            .ok_or_else(|| Error::not_supported(operation))
    }

    fn enumerator(&self, operation: &str) -> Result<&dyn StoreEnumerator> {
        capability::require(self.capabilities(), Capability::Enumeration, operation)?;
        self.inner
            .enumerator()
            .ok_or_else(|| Error::not_supported(operation))
    }

    // =========================================================================
    // Core lifecycle
    // =========================================================================

    pub async fn create(
        &self,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Result<VolumeId> {
        self.inner.create(locator, source, spec).await
    }

    pub async fn delete(&self, id: &VolumeId) -> Result<()> {
        self.inner.delete(id).await
    }

    pub async fn mount(&self, id: &VolumeId, path: &str) -> Result<()> {
        self.inner.mount(id, path).await
    }

    pub async fn unmount(&self, id: &VolumeId, path: &str) -> Result<()> {
        self.inner.unmount(id, path).await
    }

    pub async fn set(
        &self,
        id: &VolumeId,
        locator: Option<VolumeLocator>,
        spec: Option<VolumeSpec>,
    ) -> Result<()> {
        self.inner.set(id, locator, spec).await
    }

    /// Apply a compound update while holding the per-volume update lock
    pub async fn update(&self, id: &VolumeId, req: &VolumeSetRequest) -> Result<Vec<UpdateStep>> {
        let _guard = self.update_locks.lock(id.as_str()).await;
        update::apply(self, id, req).await
    }

    // =========================================================================
    // Capability groups
    // =========================================================================

    pub async fn read(&self, id: &VolumeId, offset: u64, len: usize) -> Result<Bytes> {
        self.io("read")?.read(id, offset, len).await
    }

    pub async fn write(&self, id: &VolumeId, offset: u64, data: Bytes) -> Result<usize> {
        self.io("write")?.write(id, offset, data).await
    }

    pub async fn flush(&self, id: &VolumeId) -> Result<()> {
        self.io("flush")?.flush(id).await
    }

    pub async fn attach(&self, id: &VolumeId) -> Result<String> {
        self.block("attach")?.attach(id).await
    }

    pub async fn detach(&self, id: &VolumeId) -> Result<()> {
        self.block("detach")?.detach(id).await
    }

    pub async fn snapshot(
        &self,
        id: &VolumeId,
        readonly: bool,
        locator: VolumeLocator,
    ) -> Result<VolumeId> {
        self.snapshots("snapshot")?
            .snapshot(id, readonly, locator)
            .await
    }

    pub async fn snap_enumerate(
        &self,
        ids: &[VolumeId],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        self.snapshots("snap enumerate")?
            .snap_enumerate(ids, labels)
            .await
    }

    pub async fn inspect(&self, ids: &[VolumeId]) -> Result<Vec<Volume>> {
        self.enumerator("inspect")?.inspect(ids).await
    }

    pub async fn enumerate(
        &self,
        locator: &VolumeLocator,
        config_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        self.enumerator("enumerate")?
            .enumerate(locator, config_labels)
            .await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub async fn stats(&self, id: &VolumeId) -> Result<Stats> {
        self.inner.stats(id).await
    }

    pub async fn alerts(&self, id: &VolumeId) -> Result<Alerts> {
        self.inner.alerts(id).await
    }

    pub async fn dump_requests(&self, id: &VolumeId) -> Result<ActiveRequests> {
        self.inner.dump_requests(id).await
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("name", &self.name())
            .field("capabilities", &capability::describe(self.capabilities()))
            .finish()
    }
}
