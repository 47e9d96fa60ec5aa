//! Error types for event-store access.

use thiserror::Error;

/// Event-store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error while opening or reading a backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet decoding error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow conversion error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A requested branch is not present in the table.
    #[error("missing branch '{0}'")]
    MissingBranch(String),

    /// A requested file is not known to the source.
    #[error("missing file '{0}'")]
    MissingFile(String),

    /// Columns handed to a batch have different lengths.
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumns {
        /// Offending column.
        column: String,
        /// Length of the first column.
        expected: usize,
        /// Length of the offending column.
        actual: usize,
    },

    /// Row range outside the table or reversed.
    #[error("invalid row range {start}..{stop} for a table with {entries} entries")]
    InvalidRange {
        /// First row requested.
        start: u64,
        /// One past the last row requested.
        stop: u64,
        /// Number of rows in the table.
        entries: u64,
    },

    /// Boolean mask length differs from the batch length.
    #[error("mask has {mask} entries but the batch has {rows} rows")]
    MaskLength {
        /// Mask length.
        mask: usize,
        /// Batch length.
        rows: usize,
    },

    /// Formula parse error.
    #[error("expression error: {0}")]
    Expression(String),

    /// Backing storage temporarily unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a read that failed with this error may succeed when retried.
    ///
    /// Only storage-level failures qualify; schema and parse errors never
    /// heal on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Unavailable(_))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "eos"));
        assert!(io.is_transient());
        assert!(StoreError::Unavailable("xrootd".into()).is_transient());
        assert!(!StoreError::MissingBranch("trk_p".into()).is_transient());
        assert!(!StoreError::Expression("bad".into()).is_transient());
    }
}
