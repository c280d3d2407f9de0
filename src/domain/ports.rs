//! Domain Ports - Core trait definitions for the volume gateway
//!
//! These traits define the boundaries between the lifecycle logic and
//! external systems. Drivers implement [`VolumeDriver`] plus one trait per
//! capability group they declare; metadata stores implement
//! [`MetadataStore`]; the OS mount primitive sits behind [`Mounter`].

use crate::domain::capability::CapabilitySet;
use crate::domain::volume::{
    ActiveRequests, Alerts, DriverType, Source, Stats, Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Metadata Store Port
// =============================================================================

/// A stored value together with the version the store assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Bytes,
    /// Monotonically increasing per key, starting at 1
    pub version: u64,
}

/// Durable key/value persistence with atomic single-key operations
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<KvPair>>;

    /// Store a value that must not exist yet
    async fn create(&self, key: &str, value: Bytes) -> Result<KvPair>;

    /// Store a value.
    ///
    /// With `expected_version` set, the write only succeeds if the stored
    /// version still equals it; otherwise [`Error::VersionConflict`] is
    /// returned and nothing is written.
    async fn put(&self, key: &str, value: Bytes, expected_version: Option<u64>) -> Result<KvPair>;

    /// Delete a key, returning the removed pair if it existed
    async fn delete(&self, key: &str) -> Result<Option<KvPair>>;

    /// List every pair whose key starts with `prefix`
    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>>;

    /// Store adapter name
    fn name(&self) -> &str;
}

// =============================================================================
// Mount Primitive Port
// =============================================================================

/// Bind-style mount/unmount with a filesystem-type argument.
///
/// Implementations are synchronous and may block; callers run them off the
/// async executor.
pub trait Mounter: Send + Sync {
    /// Bind `source` onto `target`
    fn mount(&self, source: &Path, target: &Path, fs_type: Option<&str>) -> Result<()>;

    /// Unmount whatever is mounted at `target`
    fn unmount(&self, target: &Path) -> Result<()>;
}

// =============================================================================
// Capability Group Ports
// =============================================================================

/// I/O capability: read/write primitives on a volume
#[async_trait]
pub trait IoDriver: Send + Sync {
    async fn read(&self, id: &VolumeId, offset: u64, len: usize) -> Result<Bytes>;

    /// Returns the number of bytes written
    async fn write(&self, id: &VolumeId, offset: u64, data: Bytes) -> Result<usize>;

    async fn flush(&self, id: &VolumeId) -> Result<()>;
}

/// Block capability: reserve/release a volume at the block level
#[async_trait]
pub trait BlockDriver: Send + Sync {
    /// Attach and return the device path
    async fn attach(&self, id: &VolumeId) -> Result<String>;

    async fn detach(&self, id: &VolumeId) -> Result<()>;
}

/// Snapshot capability
#[async_trait]
pub trait SnapshotDriver: Send + Sync {
    /// Create a snapshot of `id`, returning the snapshot's own id
    async fn snapshot(
        &self,
        id: &VolumeId,
        readonly: bool,
        locator: VolumeLocator,
    ) -> Result<VolumeId>;

    /// List snapshots, optionally restricted to the given parents and labels
    async fn snap_enumerate(
        &self,
        ids: &[VolumeId],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>>;
}

/// Enumeration capability: listing and inspecting via the metadata store
#[async_trait]
pub trait StoreEnumerator: Send + Sync {
    /// Records for exactly the requested ids; fails if any lookup fails
    async fn inspect(&self, ids: &[VolumeId]) -> Result<Vec<Volume>>;

    /// Records matching the locator filter and config labels
    async fn enumerate(
        &self,
        locator: &VolumeLocator,
        config_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>>;
}

// =============================================================================
// Volume Driver Port
// =============================================================================

/// A pluggable storage backend.
///
/// The core lifecycle operations are mandatory. Capability groups are
/// reached through the accessor methods, which only need to return `Some`
/// for groups listed in [`VolumeDriver::capabilities`].
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Registered driver name
    fn name(&self) -> &str;

    fn driver_type(&self) -> DriverType;

    /// Capability groups this driver implements
    fn capabilities(&self) -> CapabilitySet;

    fn io(&self) -> Option<&dyn IoDriver> {
        None
    }

    fn block(&self) -> Option<&dyn BlockDriver> {
        None
    }

    fn snapshots(&self) -> Option<&dyn SnapshotDriver> {
        None
    }

    fn enumerator(&self) -> Option<&dyn StoreEnumerator> {
        None
    }

    /// Provision storage and persist a new record
    async fn create(
        &self,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Result<VolumeId>;

    /// Remove backend storage and the record
    async fn delete(&self, id: &VolumeId) -> Result<()>;

    /// Bind the volume's storage onto `path`
    async fn mount(&self, id: &VolumeId, path: &str) -> Result<()>;

    async fn unmount(&self, id: &VolumeId, path: &str) -> Result<()>;

    /// Update the locator; spec changes are driver specific
    async fn set(
        &self,
        id: &VolumeId,
        locator: Option<VolumeLocator>,
        spec: Option<VolumeSpec>,
    ) -> Result<()>;

    async fn stats(&self, _id: &VolumeId) -> Result<Stats> {
        Err(Error::not_supported("stats"))
    }

    async fn alerts(&self, _id: &VolumeId) -> Result<Alerts> {
        Err(Error::not_supported("alerts"))
    }

    async fn dump_requests(&self, _id: &VolumeId) -> Result<ActiveRequests> {
        Ok(ActiveRequests::default())
    }

    /// Free-form key/value status pairs
    fn status(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn shutdown(&self) {}
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type MetadataStoreRef = Arc<dyn MetadataStore>;
pub type MounterRef = Arc<dyn Mounter>;
pub type VolumeDriverRef = Arc<dyn VolumeDriver>;
