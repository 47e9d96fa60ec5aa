//! Error types for the histogram-filling pipeline.

use eop_store::StoreError;
use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum FillError {
    /// Setup problem, e.g. a simulation file whose dataset id is not in the
    /// cross-section table.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every read attempt for a file failed.
    #[error("data unavailable for '{file}' after {attempts} attempt(s): {source}")]
    DataUnavailable {
        /// Backing file id.
        file: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: StoreError,
    },

    /// A histogram or channel name was registered twice.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// A subchannel clashes with an existing channel or subchannel name.
    #[error("invalid subchannel: {0}")]
    InvalidSubchannel(String),

    /// One axis of a 2D fill uses fixed binning and the other explicit edges.
    #[error("mixed bin specification for '{0}': both axes must use the same binning style")]
    MixedBinSpec(String),

    /// Malformed binning (no bins, reversed range, unsorted edges).
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    /// Partition with `start > end`.
    #[error("invalid partition {start}..{end} for '{file}'")]
    InvalidPartition {
        /// Backing file id.
        file: String,
        /// First row.
        start: u64,
        /// One past the last row.
        end: u64,
    },

    /// Channel name not registered.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// A fill referenced a calculation that was never evaluated.
    #[error("unknown calculation '{0}'")]
    UnknownCalculation(String),

    /// A calculation returned the wrong number of values.
    #[error("'{name}' produced {actual} values for {expected} rows")]
    LengthMismatch {
        /// Calculation name.
        name: String,
        /// Batch length.
        expected: usize,
        /// Output length.
        actual: usize,
    },

    /// Event-store error that is not retried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, FillError>;
