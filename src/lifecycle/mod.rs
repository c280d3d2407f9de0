//! Volume Lifecycle Engine
//!
//! The state machine and metadata invariants shared by every driver:
//!
//! ```text
//!   Create ──► Created ──attach──► Attached ──mount──► Mounted
//!                 ▲                   │                  │
//!                 └──────detach───────┘◄─────unmount─────┘
//!   Delete: any state (mount state is not checked)
//! ```
//!
//! Drivers hand the engine a [`BackendStorage`] for the OS-level work and
//! get record persistence, per-id serialization and optimistic version
//! checks for free. Records live in the injected metadata store under
//! `volumes/<driver>/<id>`.

pub mod locks;
pub mod update;

pub use locks::{LockTable, VolumeGuard};
pub use update::UpdateStep;

use crate::domain::ports::{MetadataStoreRef, StoreEnumerator};
use crate::domain::volume::{
    labels_match, Source, Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Key prefix for all volume records
pub const VOLUME_KEY_PREFIX: &str = "volumes";

// =============================================================================
// Backend Storage Port
// =============================================================================

/// OS-level resources a driver manages on behalf of the engine
#[async_trait]
pub trait BackendStorage: Send + Sync {
    /// Provision storage for a new record, returning its device path.
    ///
    /// Records with a parent are snapshots; the backend may seed them from
    /// the parent's storage.
    async fn provision(&self, volume: &Volume) -> Result<String>;

    /// Remove the storage behind a record
    async fn release(&self, volume: &Volume) -> Result<()>;

    /// Make the storage visible at `path`, replacing any stale mount there
    async fn bind(&self, volume: &Volume, path: &str) -> Result<()>;

    /// Undo [`BackendStorage::bind`] at `path`
    async fn unbind(&self, volume: &Volume, path: &str) -> Result<()>;
}

// =============================================================================
// Lifecycle Engine
// =============================================================================

/// Record persistence and state transitions for one driver's volumes
pub struct LifecycleEngine {
    driver: String,
    store: MetadataStoreRef,
    locks: LockTable,
}

impl LifecycleEngine {
    pub fn new(driver: impl Into<String>, store: MetadataStoreRef) -> Self {
        Self {
            driver: driver.into(),
            store,
            locks: LockTable::new(),
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    fn prefix(&self) -> String {
        format!("{}/{}/", VOLUME_KEY_PREFIX, self.driver)
    }

    fn key(&self, id: &VolumeId) -> String {
        format!("{}{}", self.prefix(), id)
    }

    /// Enter the exclusive section for `id`
    pub async fn lock(&self, id: &VolumeId) -> VolumeGuard {
        self.locks.lock(id.as_str()).await
    }

    // -------------------------------------------------------------------------
    // Record access
    // -------------------------------------------------------------------------

    /// Read the current record for `id`
    pub async fn get(&self, id: &VolumeId) -> Result<Volume> {
        let pair = self
            .store
            .get(&self.key(id))
            .await?
            .ok_or_else(|| Error::volume_not_found(id.as_str()))?;
        let mut volume: Volume = serde_json::from_slice(&pair.value)?;
        volume.version = pair.version;
        Ok(volume)
    }

    async fn insert(&self, volume: &Volume) -> Result<Volume> {
        let pair = self
            .store
            .create(&self.key(&volume.id), Bytes::from(serde_json::to_vec(volume)?))
            .await?;
        let mut stored = volume.clone();
        stored.version = pair.version;
        Ok(stored)
    }

    /// Write `volume` back, failing if the record changed since it was read
    pub async fn update(&self, volume: &Volume) -> Result<Volume> {
        let pair = self
            .store
            .put(
                &self.key(&volume.id),
                Bytes::from(serde_json::to_vec(volume)?),
                Some(volume.version),
            )
            .await?;
        let mut stored = volume.clone();
        stored.version = pair.version;
        Ok(stored)
    }

    async fn remove(&self, id: &VolumeId) -> Result<()> {
        self.store
            .delete(&self.key(id))
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::volume_not_found(id.as_str()))
    }

    /// Every record owned by this driver
    pub async fn list(&self) -> Result<Vec<Volume>> {
        let pairs = self.store.enumerate(&self.prefix()).await?;
        let mut volumes = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match serde_json::from_slice::<Volume>(&pair.value) {
                Ok(mut volume) => {
                    volume.version = pair.version;
                    volumes.push(volume);
                }
                Err(e) => warn!(key = %pair.key, error = %e, "skipping undecodable volume record"),
            }
        }
        Ok(volumes)
    }

    /// Locked read-modify-write of a single record
    pub async fn modify<F, T>(&self, id: &VolumeId, f: F) -> Result<(Volume, T)>
    where
        F: FnOnce(&mut Volume) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.lock(id).await;
        let mut volume = self.get(id).await?;
        let out = f(&mut volume)?;
        let stored = self.update(&volume).await?;
        Ok((stored, out))
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Allocate an id, provision storage and persist a new record.
    ///
    /// Nothing is persisted if provisioning fails.
    #[instrument(skip(self, storage, spec), fields(driver = %self.driver, name = %locator.name))]
    pub async fn create(
        &self,
        storage: &dyn BackendStorage,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Result<VolumeId> {
        let volume = Volume::new(VolumeId::generate(), self.driver.as_str(), locator, source, spec);
        self.provision_and_insert(storage, volume).await
    }

    /// Create a record whose source references `parent`
    #[instrument(skip(self, storage, locator), fields(driver = %self.driver))]
    pub async fn snapshot(
        &self,
        storage: &dyn BackendStorage,
        parent: &VolumeId,
        readonly: bool,
        locator: VolumeLocator,
    ) -> Result<VolumeId> {
        let parent = self.get(parent).await?;
        let mut volume = Volume::new(
            VolumeId::generate(),
            self.driver.as_str(),
            locator,
            Some(Source::from_parent(parent.id.clone())),
            parent.spec.clone(),
        );
        volume.readonly = readonly;
        self.provision_and_insert(storage, volume).await
    }

    async fn provision_and_insert(
        &self,
        storage: &dyn BackendStorage,
        mut volume: Volume,
    ) -> Result<VolumeId> {
        let _guard = self.lock(&volume.id).await;

        volume.device_path = storage.provision(&volume).await?;

        if let Err(e) = self.insert(&volume).await {
            warn!(volume_id = %volume.id, error = %e, "record write failed, releasing storage");
            if let Err(release_err) = storage.release(&volume).await {
                warn!(volume_id = %volume.id, error = %release_err, "failed to release storage");
            }
            return Err(e);
        }

        info!(volume_id = %volume.id, snapshot = volume.is_snapshot(), "volume created");
        Ok(volume.id)
    }

    /// Remove backend storage (best effort) and the record.
    ///
    /// Mount state is not checked: deleting a mounted volume leaves the bind
    /// mount in place.
    #[instrument(skip(self, storage), fields(driver = %self.driver))]
    pub async fn delete(&self, storage: &dyn BackendStorage, id: &VolumeId) -> Result<()> {
        let _guard = self.lock(id).await;
        let volume = self.get(id).await?;

        if let Some(path) = volume.mount_path() {
            warn!(volume_id = %id, path, "deleting a volume that is still mounted");
        }
        if let Err(e) = storage.release(&volume).await {
            warn!(volume_id = %id, error = %e, "failed to remove backend storage, continuing");
        }
        self.remove(id).await?;

        info!(volume_id = %id, "volume deleted");
        Ok(())
    }

    /// Bind the volume onto `path` and record it.
    ///
    /// Fails with [`Error::AlreadyMounted`] if a path is recorded. A failed
    /// bind leaves the record unchanged; a failed record write undoes the
    /// bind.
    #[instrument(skip(self, storage), fields(driver = %self.driver))]
    pub async fn mount(&self, storage: &dyn BackendStorage, id: &VolumeId, path: &str) -> Result<()> {
        let _guard = self.lock(id).await;
        let mut volume = self.get(id).await?;

        if let Some(existing) = volume.mount_path() {
            return Err(Error::AlreadyMounted {
                id: id.to_string(),
                path: existing.to_string(),
            });
        }

        storage.bind(&volume, path).await?;

        volume.attach_path = vec![path.to_string()];
        if let Err(e) = self.update(&volume).await {
            warn!(volume_id = %id, path, error = %e, "record write failed, unbinding");
            if let Err(unbind_err) = storage.unbind(&volume, path).await {
                warn!(volume_id = %id, path, error = %unbind_err, "failed to undo bind");
            }
            return Err(e);
        }
        info!(volume_id = %id, path, "volume mounted");
        Ok(())
    }

    /// Unbind the recorded mount path and clear it.
    ///
    /// Fails with [`Error::NotMounted`] if nothing is recorded. A failed
    /// unbind leaves the record unchanged; a failed record write binds the
    /// recorded path again.
    #[instrument(skip(self, storage), fields(driver = %self.driver))]
    pub async fn unmount(&self, storage: &dyn BackendStorage, id: &VolumeId, path: &str) -> Result<()> {
        let _guard = self.lock(id).await;
        let mut volume = self.get(id).await?;

        let recorded = volume
            .mount_path()
            .map(str::to_string)
            .ok_or_else(|| Error::NotMounted { id: id.to_string() })?;
        if !path.is_empty() && path != recorded {
            debug!(volume_id = %id, requested = path, recorded = %recorded, "unmounting recorded path");
        }

        storage.unbind(&volume, &recorded).await?;

        volume.attach_path.clear();
        if let Err(e) = self.update(&volume).await {
            warn!(volume_id = %id, path = %recorded, error = %e, "record write failed, rebinding");
            if let Err(bind_err) = storage.bind(&volume, &recorded).await {
                warn!(volume_id = %id, path = %recorded, error = %bind_err, "failed to restore mount");
            }
            return Err(e);
        }
        info!(volume_id = %id, path = %recorded, "volume unmounted");
        Ok(())
    }

    /// Update the locator, and the volume spec if the driver permits it
    #[instrument(skip(self, locator, spec), fields(driver = %self.driver))]
    pub async fn set(
        &self,
        id: &VolumeId,
        locator: Option<VolumeLocator>,
        spec: Option<VolumeSpec>,
        allow_spec_update: bool,
    ) -> Result<()> {
        if spec.is_some() && !allow_spec_update {
            return Err(Error::not_supported("set volume spec"));
        }
        self.modify(id, |volume| {
            if let Some(locator) = locator {
                volume.locator = locator;
            }
            if let Some(spec) = spec {
                volume.format = spec.format;
                volume.spec = spec;
            }
            Ok(())
        })
        .await?;
        debug!(volume_id = %id, "volume updated");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Snapshot enumeration
    // -------------------------------------------------------------------------

    /// Snapshot records, restricted to parents in `ids` (if any) and labels
    pub async fn snap_enumerate(
        &self,
        ids: &[VolumeId],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|v| match v.parent() {
                Some(parent) => ids.is_empty() || ids.contains(parent),
                None => false,
            })
            .filter(|v| labels_match(labels, &v.locator.volume_labels))
            .collect())
    }
}

#[async_trait]
impl StoreEnumerator for LifecycleEngine {
    async fn inspect(&self, ids: &[VolumeId]) -> Result<Vec<Volume>> {
        let mut volumes = Vec::with_capacity(ids.len());
        for id in ids {
            volumes.push(self.get(id).await?);
        }
        Ok(volumes)
    }

    async fn enumerate(
        &self,
        locator: &VolumeLocator,
        config_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|v| locator.matches(&v.locator))
            .filter(|v| labels_match(config_labels, &v.spec.config_labels))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{KvPair, MetadataStore};
    use crate::domain::volume::FsType;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Backend that records calls and can be told to fail
    #[derive(Default)]
    struct TestStorage {
        fail_provision: AtomicBool,
        fail_bind: AtomicBool,
        fail_release: AtomicBool,
        bound: Mutex<Vec<String>>,
        released: Mutex<Vec<VolumeId>>,
    }

    #[async_trait]
    impl BackendStorage for TestStorage {
        async fn provision(&self, volume: &Volume) -> Result<String> {
            if self.fail_provision.load(Ordering::SeqCst) {
                return Err(Error::Provision {
                    id: volume.id.to_string(),
                    reason: "disk full".into(),
                });
            }
            Ok(format!("/test/{}", volume.id))
        }

        async fn release(&self, volume: &Volume) -> Result<()> {
            self.released.lock().push(volume.id.clone());
            if self.fail_release.load(Ordering::SeqCst) {
                return Err(Error::Internal("busy".into()));
            }
            Ok(())
        }

        async fn bind(&self, _volume: &Volume, path: &str) -> Result<()> {
            if self.fail_bind.load(Ordering::SeqCst) {
                return Err(Error::Mount {
                    path: path.into(),
                    reason: "EPERM".into(),
                });
            }
            self.bound.lock().push(path.to_string());
            Ok(())
        }

        async fn unbind(&self, _volume: &Volume, path: &str) -> Result<()> {
            self.bound.lock().retain(|p| p != path);
            Ok(())
        }
    }

    /// Memory store whose writes can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_put: AtomicBool,
    }

    #[async_trait]
    impl MetadataStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<KvPair>> {
            self.inner.get(key).await
        }

        async fn create(&self, key: &str, value: Bytes) -> Result<KvPair> {
            self.inner.create(key, value).await
        }

        async fn put(&self, key: &str, value: Bytes, expected_version: Option<u64>) -> Result<KvPair> {
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(Error::Store("down".into()));
            }
            self.inner.put(key, value, expected_version).await
        }

        async fn delete(&self, key: &str) -> Result<Option<KvPair>> {
            self.inner.delete(key).await
        }

        async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>> {
            self.inner.enumerate(prefix).await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn engine() -> (LifecycleEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LifecycleEngine::new("test", store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_then_inspect() {
        let (engine, _) = engine();
        let storage = TestStorage::default();

        let spec = VolumeSpec::with_format(FsType::Ext4);
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, spec.clone())
            .await
            .unwrap();

        let vols = engine.inspect(&[id.clone()]).await.unwrap();
        assert_eq!(vols.len(), 1);
        assert_eq!(vols[0].locator, VolumeLocator::new("v1"));
        assert_eq!(vols[0].spec, spec);
        assert!(vols[0].attach_path.is_empty());
        assert_eq!(vols[0].device_path, format!("/test/{}", id));
        assert_eq!(vols[0].driver, "test");
        assert_eq!(vols[0].version, 1);
    }

    #[tokio::test]
    async fn test_failed_provision_persists_nothing() {
        let (engine, store) = engine();
        let storage = TestStorage::default();
        storage.fail_provision.store(true, Ordering::SeqCst);

        let result = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await;
        assert_matches!(result, Err(Error::Provision { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mount_unmount_cycle() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        engine.mount(&storage, &id, "/mnt/a").await.unwrap();
        assert_eq!(engine.get(&id).await.unwrap().attach_path, vec!["/mnt/a"]);

        assert_matches!(
            engine.mount(&storage, &id, "/mnt/b").await,
            Err(Error::AlreadyMounted { path, .. }) if path == "/mnt/a"
        );
        assert_eq!(engine.get(&id).await.unwrap().attach_path, vec!["/mnt/a"]);
        assert_eq!(*storage.bound.lock(), vec!["/mnt/a".to_string()]);

        engine.unmount(&storage, &id, "/mnt/a").await.unwrap();
        assert!(engine.get(&id).await.unwrap().attach_path.is_empty());

        assert_matches!(
            engine.unmount(&storage, &id, "/mnt/a").await,
            Err(Error::NotMounted { .. })
        );
    }

    #[tokio::test]
    async fn test_failed_bind_leaves_record_unchanged() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();
        let before = engine.get(&id).await.unwrap();

        storage.fail_bind.store(true, Ordering::SeqCst);
        assert_matches!(
            engine.mount(&storage, &id, "/mnt/a").await,
            Err(Error::Mount { .. })
        );
        assert_eq!(engine.get(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_record_write_undoes_os_step() {
        let store = Arc::new(FlakyStore::default());
        let engine = LifecycleEngine::new("test", store.clone());
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        // Mount: the bind is undone and nothing is recorded
        store.fail_put.store(true, Ordering::SeqCst);
        assert_matches!(
            engine.mount(&storage, &id, "/mnt/b").await,
            Err(Error::Store(_))
        );
        assert!(engine.get(&id).await.unwrap().attach_path.is_empty());
        assert!(storage.bound.lock().is_empty());

        store.fail_put.store(false, Ordering::SeqCst);
        engine.mount(&storage, &id, "/mnt/a").await.unwrap();

        // Unmount: the path is bound again and stays recorded
        store.fail_put.store(true, Ordering::SeqCst);
        assert_matches!(
            engine.unmount(&storage, &id, "/mnt/a").await,
            Err(Error::Store(_))
        );
        assert_eq!(engine.get(&id).await.unwrap().attach_path, vec!["/mnt/a"]);
        assert_eq!(*storage.bound.lock(), vec!["/mnt/a".to_string()]);

        // A retry once the store recovers goes through
        store.fail_put.store(false, Ordering::SeqCst);
        engine.unmount(&storage, &id, "/mnt/a").await.unwrap();
        assert!(storage.bound.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_locks_behind() {
        let (engine, _) = engine();
        let storage = TestStorage::default();

        for i in 0..200 {
            let id = VolumeId::from(format!("missing-{}", i));
            assert_matches!(
                engine.set(&id, Some(VolumeLocator::new("x")), None, false).await,
                Err(Error::VolumeNotFound { .. })
            );
            assert_matches!(
                engine.mount(&storage, &id, "/mnt/a").await,
                Err(Error::VolumeNotFound { .. })
            );
            assert_matches!(
                engine.delete(&storage, &id).await,
                Err(Error::VolumeNotFound { .. })
            );
        }
        assert!(engine.locks.is_empty());

        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();
        engine.mount(&storage, &id, "/mnt/a").await.unwrap();
        engine.delete(&storage, &id).await.unwrap();
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_delete_swallows_release_errors() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        storage.fail_release.store(true, Ordering::SeqCst);
        engine.delete(&storage, &id).await.unwrap();

        assert_matches!(engine.get(&id).await, Err(Error::VolumeNotFound { .. }));
        assert_matches!(
            engine.delete(&storage, &id).await,
            Err(Error::VolumeNotFound { .. })
        );
        assert_eq!(storage.released.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_set_rejects_spec_unless_allowed() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        assert_matches!(
            engine
                .set(&id, Some(VolumeLocator::new("v2")), Some(VolumeSpec::default()), false)
                .await,
            Err(Error::NotSupported { .. })
        );
        // Rejected before anything is written
        assert_eq!(engine.get(&id).await.unwrap().locator.name, "v1");

        engine
            .set(&id, Some(VolumeLocator::new("v2")), None, false)
            .await
            .unwrap();
        assert_eq!(engine.get(&id).await.unwrap().locator.name, "v2");

        engine
            .set(&id, None, Some(VolumeSpec::with_format(FsType::Xfs)), true)
            .await
            .unwrap();
        let vol = engine.get(&id).await.unwrap();
        assert_eq!(vol.format, FsType::Xfs);
        assert_eq!(vol.locator.name, "v2");
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        let mut first = engine.get(&id).await.unwrap();
        let mut second = engine.get(&id).await.unwrap();

        first.locator.name = "first".into();
        engine.update(&first).await.unwrap();

        second.locator.name = "second".into();
        assert_matches!(
            engine.update(&second).await,
            Err(Error::VersionConflict { .. })
        );
        assert_eq!(engine.get(&id).await.unwrap().locator.name, "first");
    }

    #[tokio::test]
    async fn test_concurrent_mounts_record_one_path() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        let storage = Arc::new(TestStorage::default());
        let id = engine
            .create(storage.as_ref(), VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = engine.clone();
            let storage = storage.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .mount(storage.as_ref(), &id, &format!("/mnt/{}", i))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => assert_matches!(e, Error::AlreadyMounted { .. }),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(engine.get(&id).await.unwrap().attach_path.len(), 1);
        assert_eq!(storage.bound.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_enumerate_filters() {
        let (engine, _) = engine();
        let storage = TestStorage::default();

        let mut spec = VolumeSpec::default();
        spec.config_labels.insert("pool".into(), "fast".into());
        let a = engine
            .create(
                &storage,
                VolumeLocator::new("db-primary").with_label("app", "db"),
                None,
                spec,
            )
            .await
            .unwrap();
        let b = engine
            .create(
                &storage,
                VolumeLocator::new("db-replica").with_label("app", "db"),
                None,
                VolumeSpec::default(),
            )
            .await
            .unwrap();
        engine
            .create(&storage, VolumeLocator::new("web"), None, VolumeSpec::default())
            .await
            .unwrap();

        let all = engine
            .enumerate(&VolumeLocator::default(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let mut dbs: Vec<_> = engine
            .enumerate(&VolumeLocator::new("db"), &BTreeMap::new())
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        dbs.sort();
        let mut expected = vec![a.clone(), b];
        expected.sort();
        assert_eq!(dbs, expected);

        let fast = engine
            .enumerate(
                &VolumeLocator::default().with_label("app", "db"),
                &BTreeMap::from([("pool".to_string(), "fast".to_string())]),
            )
            .await
            .unwrap();
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].id, a);
    }

    #[tokio::test]
    async fn test_inspect_fails_on_any_missing_id() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let id = engine
            .create(&storage, VolumeLocator::new("v1"), None, VolumeSpec::default())
            .await
            .unwrap();

        assert_matches!(
            engine.inspect(&[id, VolumeId::from("missing")]).await,
            Err(Error::VolumeNotFound { id }) if id == "missing"
        );
    }

    #[tokio::test]
    async fn test_snapshot_records() {
        let (engine, _) = engine();
        let storage = TestStorage::default();
        let parent = engine
            .create(
                &storage,
                VolumeLocator::new("v1"),
                None,
                VolumeSpec::with_format(FsType::Ext4),
            )
            .await
            .unwrap();

        let snap = engine
            .snapshot(
                &storage,
                &parent,
                true,
                VolumeLocator::new("v1-snap").with_label("kind", "nightly"),
            )
            .await
            .unwrap();
        let record = engine.get(&snap).await.unwrap();
        assert_eq!(record.parent(), Some(&parent));
        assert!(record.readonly);
        assert_eq!(record.spec.format, FsType::Ext4);

        let snaps = engine.snap_enumerate(&[], &BTreeMap::new()).await.unwrap();
        assert_eq!(snaps.len(), 1);
        let snaps = engine
            .snap_enumerate(&[parent.clone()], &BTreeMap::from([("kind".to_string(), "nightly".to_string())]))
            .await
            .unwrap();
        assert_eq!(snaps.len(), 1);
        let snaps = engine
            .snap_enumerate(&[VolumeId::from("other")], &BTreeMap::new())
            .await
            .unwrap();
        assert!(snaps.is_empty());

        assert_matches!(
            engine
                .snapshot(&storage, &VolumeId::from("missing"), false, VolumeLocator::default())
                .await,
            Err(Error::VolumeNotFound { .. })
        );
    }
}
