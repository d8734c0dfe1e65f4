//! Error and Result types for the TsFile load pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// The error type for the TsFile load pipeline.
///
/// All variants except [`LoadError::ConnectionFailure`] are file-scoped: the
/// orchestrator catches them, records the file as failed and moves on to the
/// next file. A connection failure aborts the whole run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File name does not follow the `<timestamp>_<version>_...` convention.
    #[error("Malformed file name {path:?}: expected <timestamp>_<version> prefix")]
    MalformedFileName {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// Invalid magic bytes in the file header.
    #[error("Invalid magic bytes: expected TsFile, got {0:?}")]
    InvalidMagic([u8; 6]),

    /// Unsupported file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Unexpected marker byte encountered during sequential decode.
    #[error("Unexpected marker {marker:#04x} at offset {offset}")]
    UnexpectedMarker {
        /// The marker byte that was read.
        marker: u8,
        /// File offset of the marker byte.
        offset: u64,
    },

    /// Page checksum does not match the stored value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// CRC32 stored in the page.
        expected: u32,
        /// CRC32 computed over the page content.
        actual: u32,
    },

    /// A series path could not be parsed into device and measurement.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// Corrupt or undecodable content (bad UTF-8, truncated page, unsupported
    /// payload encoding, malformed modification record).
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The target store rejected a batch; fails the current file only.
    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    /// The store connection is gone; aborts the whole run.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl LoadError {
    /// Returns true if the error must terminate the whole load run rather
    /// than just the current file.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, LoadError::ConnectionFailure(_))
    }
}
