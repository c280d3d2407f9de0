//! Volume Gateway
//!
//! A storage-virtualization layer exposing one volume lifecycle (create,
//! attach, mount, snapshot, delete, enumerate) over pluggable backend
//! drivers, reachable through a single REST protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 REST Gateway (/v1/volumes, /v1/snapshot)         │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ driver name
//!                     ┌───────────┴───────────┐
//!                     │    Driver Registry    │
//!                     │ (single-flight init)  │
//!                     └───────────┬───────────┘
//!                                 │ DriverHandle (capability checks)
//!          ┌──────────────────────┼──────────────────────┐
//!   ┌──────┴──────┐                              ┌───────┴──────┐
//!   │  vfs driver │                              │  fake driver │
//!   │ dir + bind  │                              │  in-memory   │
//!   └──────┬──────┘                              └───────┬──────┘
//!          └────────────┬────────────────────────────────┘
//!              ┌────────┴─────────┐
//!              │ Lifecycle Engine │──── per-id locks, versioned records
//!              └────────┬─────────┘
//!              ┌────────┴─────────┐
//!              │  Metadata Store  │  memory | local directory
//!              └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`]: REST gateway, metrics and server
//! - [`client`]: typed HTTP client for the gateway
//! - [`config`]: YAML configuration
//! - [`domain`]: volume model, capability model and ports
//! - [`drivers`]: driver registry and built-in drivers
//! - [`lifecycle`]: volume state machine shared by drivers
//! - [`store`]: metadata store adapters
//! - [`error`]: error types and handling

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod lifecycle;
pub mod store;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, GatewayMetrics, VolumeApi};

pub use client::VolumeClient;

pub use config::GatewayConfig;

pub use domain::capability::{Capability, CapabilitySet};
pub use domain::ports::{
    BlockDriver, IoDriver, MetadataStore, MetadataStoreRef, Mounter, MounterRef,
    SnapshotDriver, StoreEnumerator, VolumeDriver, VolumeDriverRef,
};
pub use domain::requests::{
    VolumeActionParam, VolumeCreateRequest, VolumeSetRequest, VolumeStateAction,
};
pub use domain::volume::{
    DriverType, FsType, Source, Volume, VolumeId, VolumeLocator, VolumeSpec, VolumeStatus,
};

pub use drivers::{
    register_builtin, DriverHandle, DriverParams, DriverRegistry, FakeDriver, SysMounter,
    VfsDriver,
};

pub use error::{Error, ErrorKind, Result};

pub use lifecycle::{BackendStorage, LifecycleEngine};

pub use store::{LocalStore, MemoryStore, StoreKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
