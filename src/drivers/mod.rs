//! Volume Drivers and the Driver Registry
//!
//! Provides the built-in drivers:
//! - vfs: one directory per volume, exposed through bind mounts
//! - fake: in-memory driver implementing every capability group
//!
//! and the [`DriverRegistry`] that maps driver names to factories and caches
//! one constructed instance per name.

pub mod fake;
mod handle;
pub mod mount;
pub mod vfs;

pub use fake::FakeDriver;
pub use handle::DriverHandle;
pub use mount::SysMounter;
pub use vfs::VfsDriver;

use crate::domain::ports::{MetadataStoreRef, MounterRef, VolumeDriverRef};
use crate::error::{Error, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// String to string configuration handed to a driver factory
pub type DriverParams = BTreeMap<String, String>;

/// Constructs a driver instance from its parameters
pub type DriverFactory =
    Arc<dyn Fn(DriverParams) -> BoxFuture<'static, Result<VolumeDriverRef>> + Send + Sync>;

// =============================================================================
// Driver Registry
// =============================================================================

/// Name to factory map with lazily constructed, cached instances
pub struct DriverRegistry {
    factories: RwLock<HashMap<String, DriverFactory>>,
    instances: DashMap<String, Arc<OnceCell<DriverHandle>>>,
    params: HashMap<String, DriverParams>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::with_params(HashMap::new())
    }

    /// Registry whose factories receive `params[name]` on construction
    pub fn with_params(params: HashMap<String, DriverParams>) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            instances: DashMap::new(),
            params,
        }
    }

    /// Register a factory under `name`
    pub fn register<F, Fut>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(DriverParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<VolumeDriverRef>> + Send + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            return Err(Error::DriverAlreadyRegistered { name });
        }
        let factory: DriverFactory = Arc::new(move |params| Box::pin(factory(params)));
        factories.insert(name.clone(), factory);
        debug!(driver = %name, "driver registered");
        Ok(())
    }

    /// Get the instance for `name`, constructing it on first use.
    ///
    /// Concurrent first calls construct exactly one instance. A failed
    /// construction is not cached.
    pub async fn get(&self, name: &str) -> Result<DriverHandle> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriverNotFound {
                name: name.to_string(),
            })?;

        let cell = self.instances.entry(name.to_string()).or_default().clone();
        let handle = cell
            .get_or_try_init(|| async {
                let params = self.params.get(name).cloned().unwrap_or_default();
                info!(driver = name, params = params.len(), "initializing driver");
                let driver = factory(params).await.map_err(|e| {
                    warn!(driver = name, error = %e, "driver initialization failed");
                    Error::DriverInit {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok::<_, Error>(DriverHandle::new(driver))
            })
            .await?;

        Ok(handle.clone())
    }

    /// Registered driver names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Shut down every instance constructed so far
    pub async fn shutdown_all(&self) {
        let handles: Vec<DriverHandle> = self
            .instances
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();

        for handle in handles {
            info!(driver = handle.name(), "shutting down driver");
            handle.shutdown().await;
        }
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the built-in `vfs` and `fake` drivers
pub fn register_builtin(
    registry: &DriverRegistry,
    store: MetadataStoreRef,
    mounter: MounterRef,
) -> Result<()> {
    let vfs_store = store.clone();
    registry.register(vfs::NAME, move |params| {
        let store = vfs_store.clone();
        let mounter = mounter.clone();
        async move {
            let driver = VfsDriver::from_params(store, mounter, &params).await?;
            Ok(Arc::new(driver) as VolumeDriverRef)
        }
    })?;

    registry.register(fake::NAME, move |_params| {
        let store = store.clone();
        async move { Ok(Arc::new(FakeDriver::new(store)) as VolumeDriverRef) }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_registry(calls: Arc<AtomicUsize>) -> DriverRegistry {
        let registry = DriverRegistry::new();
        let store: MetadataStoreRef = Arc::new(MemoryStore::new());
        registry
            .register("fake", move |_| {
                let calls = calls.clone();
                let store = store.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(Arc::new(FakeDriver::new(store)) as VolumeDriverRef)
                }
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_get_returns_cached_instance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(calls.clone());

        let first = registry.get("fake").await.unwrap();
        let second = registry.get("fake").await.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_get_is_single_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(counting_registry(calls.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get("fake").await.unwrap() })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h.ptr_eq(&handles[0])));
    }

    #[tokio::test]
    async fn test_unknown_driver_not_found() {
        let registry = DriverRegistry::new();
        for _ in 0..2 {
            assert_matches!(
                registry.get("nfs").await,
                Err(Error::DriverNotFound { name }) if name == "nfs"
            );
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = DriverRegistry::new();
        let store: MetadataStoreRef = Arc::new(MemoryStore::new());
        register_builtin(&registry, store.clone(), Arc::new(SysMounter)).unwrap();

        assert_matches!(
            register_builtin(&registry, store, Arc::new(SysMounter)),
            Err(Error::DriverAlreadyRegistered { name }) if name == "vfs"
        );
        assert_eq!(registry.names(), vec!["fake".to_string(), "vfs".to_string()]);
        assert!(registry.is_registered("vfs"));
        assert!(!registry.is_registered("btrfs"));
    }

    #[tokio::test]
    async fn test_factory_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = DriverRegistry::new();
        let store: MetadataStoreRef = Arc::new(MemoryStore::new());
        let counter = calls.clone();
        registry
            .register("flaky", move |_| {
                let store = store.clone();
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        return Err(Error::Configuration("backend offline".into()));
                    }
                    Ok(Arc::new(FakeDriver::new(store)) as VolumeDriverRef)
                }
            })
            .unwrap();

        assert_matches!(
            registry.get("flaky").await,
            Err(Error::DriverInit { reason, .. }) if reason.contains("backend offline")
        );
        assert!(registry.get("flaky").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_params_reach_factory() {
        let seen = Arc::new(parking_lot::Mutex::new(DriverParams::new()));
        let mut params = HashMap::new();
        params.insert(
            "fake".to_string(),
            DriverParams::from([("zone".to_string(), "a".to_string())]),
        );
        let registry = DriverRegistry::with_params(params);
        let store: MetadataStoreRef = Arc::new(MemoryStore::new());
        let sink = seen.clone();
        registry
            .register("fake", move |params| {
                *sink.lock() = params;
                let store = store.clone();
                async move { Ok(Arc::new(FakeDriver::new(store)) as VolumeDriverRef) }
            })
            .unwrap();

        registry.get("fake").await.unwrap();
        assert_eq!(seen.lock().get("zone").map(String::as_str), Some("a"));
    }
}
