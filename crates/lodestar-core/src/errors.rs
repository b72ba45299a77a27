//! Unified error system for Lodestar
//!
//! Each boundary gets its own small error enum (`StoreError`, `DeviceError`,
//! `ValidationError`) so callers can match on the failure domain. Everything
//! folds into `LodestarError`, which also knows how to classify itself into
//! the client/server response taxonomy.

use crate::identifiers::{DeviceId, PortId, ProtocolKind, ServiceName};
use serde::{Deserialize, Serialize};

/// Response class surfaced to whoever submitted the work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed intent, unknown service or device
    Client,
    /// Store or device unreachable, partial apply
    Server,
}

/// Malformed intent, rejected before it reaches the reconciliation core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    /// A service document with an empty name
    #[error("service name must not be empty")]
    EmptyServiceName,

    /// An entry with an empty device name
    #[error("service {service}: entry name must not be empty")]
    EmptyEntryName {
        /// Owning service
        service: ServiceName,
    },

    /// Two entries share a device name inside one document
    #[error("service {service}: duplicate entry {entry}")]
    DuplicateEntry {
        /// Owning service
        service: ServiceName,
        /// Repeated device name
        entry: DeviceId,
    },

    /// A port is declared both up and down
    #[error("service {service}: entry {entry} lists {ports:?} as both up and down")]
    OverlappingPorts {
        /// Owning service
        service: ServiceName,
        /// Offending entry
        entry: DeviceId,
        /// Ports present in both sets
        ports: Vec<PortId>,
    },

    /// A new entry arrived without a protocol
    #[error("service {service}: entry {entry} has no nos")]
    MissingProtocol {
        /// Owning service
        service: ServiceName,
        /// Offending entry
        entry: DeviceId,
    },

    /// The document refers to a schema nobody registered
    #[error("service {service}: unknown schema {schema}")]
    UnknownSchema {
        /// Owning service
        service: ServiceName,
        /// Schema name that failed lookup
        schema: String,
    },

    /// A YANG-style path that does not parse
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Raw path text
        path: String,
        /// Parser complaint
        reason: String,
    },

    /// Anything else wrong with the submitted payload
    #[error("malformed intent: {0}")]
    Malformed(String),
}

/// Versioned store failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    /// Path has no live revision
    #[error("store path not found: {path}")]
    NotFound {
        /// Store path
        path: String,
    },

    /// `createSafe` hit a live path
    #[error("store path already exists: {path}")]
    AlreadyExists {
        /// Store path
        path: String,
    },

    /// Path failed validation
    #[error("invalid store path {path}: {reason}")]
    InvalidPath {
        /// Store path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Backend could not be reached at all
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Backend complaint
        reason: String,
    },

    /// Local I/O failure
    #[error("store I/O failed: {reason}")]
    Io {
        /// OS error text
        reason: String,
    },

    /// Stored bytes could not be decoded
    #[error("corrupt record at {path}: {reason}")]
    Corrupt {
        /// Store path
        path: String,
        /// Decoder complaint
        reason: String,
    },
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a corrupt record error
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether re-running the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Io { .. })
    }

    /// Stable numeric code
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 2001,
            Self::AlreadyExists { .. } => 2002,
            Self::InvalidPath { .. } => 2003,
            Self::Unavailable { .. } => 2004,
            Self::Io { .. } => 2006,
            Self::Corrupt { .. } => 2007,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

/// Device adapter failures, always scoped to one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DeviceError {
    /// Transport could not reach the device
    #[error("device {device} unreachable: {reason}")]
    Unreachable {
        /// Target device
        device: DeviceId,
        /// Transport complaint
        reason: String,
    },

    /// Device refused the payload
    #[error("device {device} rejected configuration: {reason}")]
    Rejected {
        /// Target device
        device: DeviceId,
        /// Device complaint
        reason: String,
    },

    /// Push or read exceeded its deadline
    #[error("device {device} timed out after {after_ms}ms")]
    Timeout {
        /// Target device
        device: DeviceId,
        /// Deadline that elapsed
        after_ms: u64,
    },

    /// No driver registered for the device's protocol
    #[error("device {device}: no driver for protocol {protocol}")]
    UnsupportedProtocol {
        /// Target device
        device: DeviceId,
        /// Requested protocol
        protocol: ProtocolKind,
    },

    /// Native payload and PathOps could not be mapped onto each other
    #[error("device {device}: translation failed: {reason}")]
    Translation {
        /// Target device
        device: DeviceId,
        /// Translator complaint
        reason: String,
    },

    /// Device is not part of the inventory
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

impl DeviceError {
    /// Device the failure belongs to
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::Unreachable { device, .. }
            | Self::Rejected { device, .. }
            | Self::Timeout { device, .. }
            | Self::UnsupportedProtocol { device, .. }
            | Self::Translation { device, .. } => device,
            Self::UnknownDevice(device) => device,
        }
    }

    /// Stable numeric code
    pub fn code(&self) -> u16 {
        match self {
            Self::Unreachable { .. } => 3001,
            Self::Rejected { .. } => 3002,
            Self::Timeout { .. } => 3003,
            Self::UnsupportedProtocol { .. } => 3004,
            Self::Translation { .. } => 3005,
            Self::UnknownDevice(_) => 3006,
        }
    }
}

/// Unified error type for all Lodestar operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum LodestarError {
    /// Intent failed validation
    #[error("Invalid intent: {0}")]
    Validation(#[from] ValidationError),

    /// Named resource does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// Versioned store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Device adapter failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Codec complaint
        message: String,
    },

    /// Work was cancelled before it produced side effects
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Where cancellation was observed
        message: String,
    },

    /// Configuration could not be used
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with it
        message: String,
    },
}

impl LodestarError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Client errors are never retried; server errors may be
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::NotFound { .. } | Self::Configuration { .. } => {
                ErrorClass::Client
            }
            Self::Store(StoreError::InvalidPath { .. }) => ErrorClass::Client,
            Self::Device(DeviceError::UnknownDevice(_)) => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    /// Whether the caller should retry the whole pass with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LodestarError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
