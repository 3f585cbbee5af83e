//! Error types for the capture core.

use thiserror::Error;

/// Main error type for core operations.
///
/// Most failure paths in this crate never surface one of these to callers:
/// the persistence and transport boundaries swallow errors and degrade to
/// documented defaults. `CoreError` exists for the storage layer and the
/// settings store, where the coordinator turns it into a failure response.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Unsupported export version: {0}")]
    UnsupportedExportVersion(u32),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
