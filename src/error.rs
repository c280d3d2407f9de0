//! Error types for the Volume Gateway
//!
//! Provides structured error types for the driver registry, the volume
//! lifecycle engine, the metadata store adapters, drivers and the REST
//! gateway. Every variant maps onto one of six [`ErrorKind`]s which the
//! gateway uses to decide how a failure is surfaced to callers.

use thiserror::Error;

/// Unified error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Bad request: {0}")]
    BadRequest(String),

    // =========================================================================
    // Driver Registry Errors
    // =========================================================================
    #[error("Driver not found: {name}")]
    DriverNotFound { name: String },

    #[error("Driver already registered: {name}")]
    DriverAlreadyRegistered { name: String },

    #[error("Driver {name} failed to initialize: {reason}")]
    DriverInit { name: String, reason: String },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: String },

    // =========================================================================
    // Volume Lifecycle Errors
    // =========================================================================
    #[error("Volume not found: {id}")]
    VolumeNotFound { id: String },

    #[error("Volume {id} already mounted at {path}")]
    AlreadyMounted { id: String, path: String },

    #[error("Volume {id} not mounted")]
    NotMounted { id: String },

    #[error("Volume {id} is busy: {reason}")]
    VolumeBusy { id: String, reason: String },

    #[error("Record {key} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("Record already exists: {key}")]
    RecordExists { key: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Provisioning failed for volume {id}: {reason}")]
    Provision { id: String, reason: String },

    #[error("Mount failed at {path}: {reason}")]
    Mount { path: String, reason: String },

    #[error("Unmount failed at {path}: {reason}")]
    Unmount { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Metadata Store Errors
    // =========================================================================
    #[error("Metadata store error: {0}")]
    Store(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Client Errors
    // =========================================================================
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {message}")]
    Remote {
        status: u16,
        kind: ErrorKind,
        message: String,
    },
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed body, missing or unparseable id or filter
    BadRequest,
    /// Unknown driver name or unknown volume id
    NotFound,
    /// Capability not implemented by the active driver
    NotSupported,
    /// Already mounted, not mounted, concurrent modification
    Conflict,
    /// Backend provisioning or mount/unmount syscall failure
    IoError,
    /// Metadata store failure or invariant violation
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BadRequest => write!(f, "bad_request"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::NotSupported => write!(f, "not_supported"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::IoError => write!(f, "io_error"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bad_request" => Ok(ErrorKind::BadRequest),
            "not_found" => Ok(ErrorKind::NotFound),
            "not_supported" => Ok(ErrorKind::NotSupported),
            "conflict" => Ok(ErrorKind::Conflict),
            "io_error" => Ok(ErrorKind::IoError),
            "internal" => Ok(ErrorKind::Internal),
            other => Err(Error::BadRequest(format!("unknown error kind: {}", other))),
        }
    }
}

impl ErrorKind {
    /// Best guess for a transport failure that carries no kind
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            404 => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

impl Error {
    /// Build a [`Error::NotSupported`] for the named operation
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Error::NotSupported {
            operation: operation.into(),
        }
    }

    /// Build a [`Error::VolumeNotFound`] for the given id
    pub fn volume_not_found(id: impl Into<String>) -> Self {
        Error::VolumeNotFound { id: id.into() }
    }

    /// Build a [`Error::Store`] from anything displayable
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Error::Store(e.to_string())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) | Error::YamlParse(_) => ErrorKind::BadRequest,

            Error::DriverNotFound { .. } | Error::VolumeNotFound { .. } => ErrorKind::NotFound,

            Error::NotSupported { .. } => ErrorKind::NotSupported,

            Error::DriverAlreadyRegistered { .. }
            | Error::AlreadyMounted { .. }
            | Error::NotMounted { .. }
            | Error::VolumeBusy { .. }
            | Error::VersionConflict { .. }
            | Error::RecordExists { .. } => ErrorKind::Conflict,

            Error::Provision { .. }
            | Error::Mount { .. }
            | Error::Unmount { .. }
            | Error::Io(_) => ErrorKind::IoError,

            Error::Remote { kind, .. } => *kind,

            Error::Internal(_)
            | Error::Configuration(_)
            | Error::DriverInit { .. }
            | Error::Store(_)
            | Error::JsonParse(_)
            | Error::Http(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error means the driver lacks the capability
    pub fn is_not_supported(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
    }
}

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;
