//! Capability Model
//!
//! A driver declares which of the four operation groups it implements. Any
//! call into a group outside the declared set fails with
//! [`Error::NotSupported`] instead of reaching a stub.

use crate::error::{Error, Result};
use enumflags2::{bitflags, BitFlags};

/// Orthogonal operation groups a driver may implement
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read/write primitives
    Io = 0b0001,
    /// Attach/detach
    Block = 0b0010,
    /// Snapshot and snapshot enumeration
    Snapshot = 0b0100,
    /// Inspect and enumerate through the metadata store
    Enumeration = 0b1000,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Io => write!(f, "io"),
            Capability::Block => write!(f, "block"),
            Capability::Snapshot => write!(f, "snapshot"),
            Capability::Enumeration => write!(f, "enumeration"),
        }
    }
}

/// Set of capabilities declared by a driver
pub type CapabilitySet = BitFlags<Capability>;

/// Fail with `NotSupported` unless `declared` contains `required`
pub fn require(declared: CapabilitySet, required: Capability, operation: &str) -> Result<()> {
    if declared.contains(required) {
        Ok(())
    } else {
        Err(Error::not_supported(format!(
            "{} (driver lacks {} capability)",
            operation, required
        )))
    }
}

/// Render a capability set as a comma separated list
pub fn describe(set: CapabilitySet) -> String {
    set.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
