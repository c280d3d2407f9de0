//! Volume Data Model
//!
//! Records persisted by the metadata store for every volume and snapshot,
//! plus the introspection records drivers may report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Volume ID
// =============================================================================

/// Opaque, globally unique identifier for a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub String);

impl VolumeId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Locator
// =============================================================================

/// Name plus label set identifying a volume for lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLocator {
    /// Human readable name, not required to be unique
    #[serde(default)]
    pub name: String,
    /// Free-form labels
    #[serde(default)]
    pub volume_labels: BTreeMap<String, String>,
}

impl VolumeLocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume_labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.volume_labels.insert(key.into(), value.into());
        self
    }

    /// Check whether a volume's locator satisfies this locator used as a filter.
    ///
    /// The name matches as a substring (empty matches everything) and every
    /// filter label must be present with an equal value.
    pub fn matches(&self, candidate: &VolumeLocator) -> bool {
        candidate.name.contains(self.name.as_str())
            && labels_match(&self.volume_labels, &candidate.volume_labels)
    }
}

/// Check that every `(key, value)` of `filter` is present in `labels`
pub fn labels_match(filter: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(k, v)| labels.get(k).map(|found| found == v).unwrap_or(false))
}

// =============================================================================
// Spec
// =============================================================================

/// Filesystem format of a volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    #[default]
    None,
    Ext4,
    Xfs,
    Btrfs,
    Zfs,
    Nfs,
    Tmpfs,
    Vfs,
}

impl FsType {
    /// Filesystem type string handed to the mount primitive
    pub fn mount_type(&self) -> Option<&'static str> {
        match self {
            FsType::None => None,
            FsType::Ext4 => Some("ext4"),
            FsType::Xfs => Some("xfs"),
            FsType::Btrfs => Some("btrfs"),
            FsType::Zfs => Some("zfs"),
            FsType::Nfs => Some("nfs"),
            FsType::Tmpfs => Some("tmpfs"),
            FsType::Vfs => Some("vfs"),
        }
    }
}

impl std::fmt::Display for FsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mount_type().unwrap_or("none"))
    }
}

/// Requested capacity, format and other backend-interpreted attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Requested size in bytes
    #[serde(default)]
    pub size: u64,
    /// Filesystem format
    #[serde(default)]
    pub format: FsType,
    /// Block size in bytes
    #[serde(default)]
    pub block_size: u64,
    /// Number of replicas requested from the backend
    #[serde(default)]
    pub ha_level: u32,
    /// Class of service
    #[serde(default)]
    pub cos: u32,
    /// Whether the volume may be shared across nodes
    #[serde(default)]
    pub shared: bool,
    /// Whether the backend should deduplicate
    #[serde(default)]
    pub dedupe: bool,
    /// Snapshot interval in minutes, zero to disable
    #[serde(default)]
    pub snapshot_interval: u32,
    /// Labels interpreted by the backend
    #[serde(default)]
    pub config_labels: BTreeMap<String, String>,
}

impl VolumeSpec {
    pub fn with_format(format: FsType) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }
}

/// Origin of a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Parent volume for snapshots and clones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<VolumeId>,
    /// Seed URI the backend may populate the volume from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

impl Source {
    pub fn from_parent(parent: VolumeId) -> Self {
        Self {
            parent: Some(parent),
            seed: None,
        }
    }
}

// =============================================================================
// Volume
// =============================================================================

/// Lifecycle status, derived from the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Created,
    Attached,
    Mounted,
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeStatus::Created => write!(f, "created"),
            VolumeStatus::Attached => write!(f, "attached"),
            VolumeStatus::Mounted => write!(f, "mounted"),
        }
    }
}

/// A volume or snapshot record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: VolumeId,
    pub locator: VolumeLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub spec: VolumeSpec,
    #[serde(default)]
    pub readonly: bool,
    pub ctime: DateTime<Utc>,
    pub format: FsType,
    /// Backend-assigned storage location
    #[serde(default)]
    pub device_path: String,
    /// Mount points currently bound to this volume
    #[serde(default)]
    pub attach_path: Vec<String>,
    /// Block-level attachment target, set by attach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_on: Option<String>,
    /// Name of the owning driver
    #[serde(default)]
    pub driver: String,
    /// Store version this record was read at
    #[serde(default)]
    pub version: u64,
}

impl Volume {
    pub fn new(
        id: VolumeId,
        driver: impl Into<String>,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Self {
        Self {
            id,
            locator,
            source,
            format: spec.format,
            spec,
            readonly: false,
            ctime: Utc::now(),
            device_path: String::new(),
            attach_path: Vec::new(),
            attached_on: None,
            driver: driver.into(),
            version: 0,
        }
    }

    pub fn status(&self) -> VolumeStatus {
        if self.is_mounted() {
            VolumeStatus::Mounted
        } else if self.attached_on.is_some() {
            VolumeStatus::Attached
        } else {
            VolumeStatus::Created
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.attach_path.iter().any(|p| !p.is_empty())
    }

    /// First recorded mount path
    pub fn mount_path(&self) -> Option<&str> {
        self.attach_path
            .iter()
            .map(String::as_str)
            .find(|p| !p.is_empty())
    }

    pub fn parent(&self) -> Option<&VolumeId> {
        self.source.as_ref().and_then(|s| s.parent.as_ref())
    }

    pub fn is_snapshot(&self) -> bool {
        self.parent().is_some()
    }
}

// =============================================================================
// Driver Introspection
// =============================================================================

/// Kind of storage a driver provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    File,
    Block,
    Object,
    Graph,
}

impl std::fmt::Display for DriverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverType::File => write!(f, "file"),
            DriverType::Block => write!(f, "block"),
            DriverType::Object => write!(f, "object"),
            DriverType::Graph => write!(f, "graph"),
        }
    }
}

/// I/O counters for a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub io_progress: u64,
    pub io_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Notify,
    Warning,
    Alarm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Alerts raised for a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerts {
    pub alerts: Vec<Alert>,
}

/// A request the driver is currently servicing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequest {
    pub operation: String,
    pub volume_id: VolumeId,
    pub started: DateTime<Utc>,
}

/// Dump of in-flight requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequests {
    pub requests: Vec<ActiveRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_filter() {
        let vol = VolumeLocator::new("postgres-data")
            .with_label("app", "db")
            .with_label("tier", "hot");

        assert!(VolumeLocator::default().matches(&vol));
        assert!(VolumeLocator::new("postgres").matches(&vol));
        assert!(VolumeLocator::new("data").with_label("app", "db").matches(&vol));

        assert!(!VolumeLocator::new("mysql").matches(&vol));
        assert!(!VolumeLocator::default().with_label("app", "web").matches(&vol));
        assert!(!VolumeLocator::default().with_label("zone", "a").matches(&vol));
    }

    #[test]
    fn test_status_is_derived() {
        let mut vol = Volume::new(
            VolumeId::generate(),
            "vfs",
            VolumeLocator::new("v1"),
            None,
            VolumeSpec::with_format(FsType::Ext4),
        );
        assert_eq!(vol.status(), VolumeStatus::Created);
        assert_eq!(vol.format, FsType::Ext4);

        vol.attached_on = Some("/dev/fake/1".into());
        assert_eq!(vol.status(), VolumeStatus::Attached);

        vol.attach_path.push("/mnt/a".into());
        assert_eq!(vol.status(), VolumeStatus::Mounted);
        assert_eq!(vol.mount_path(), Some("/mnt/a"));
    }

    #[test]
    fn test_volume_json_shape() {
        let vol = Volume::new(
            VolumeId::from("abc"),
            "vfs",
            VolumeLocator::new("v1"),
            Some(Source::from_parent(VolumeId::from("parent"))),
            VolumeSpec::with_format(FsType::Xfs),
        );
        let json = serde_json::to_value(&vol).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["locator"]["name"], "v1");
        assert_eq!(json["spec"]["format"], "xfs");
        assert_eq!(json["source"]["parent"], "parent");
        assert!(json["attachPath"].as_array().unwrap().is_empty());
        assert!(vol.is_snapshot());
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(VolumeId::generate(), VolumeId::generate());
    }
}
