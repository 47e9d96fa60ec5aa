//! Reader traits at the storage boundary.
//!
//! An [`EventSource`] knows how to open backing files; the returned
//! [`TreeReader`] is a handle over one file's table. Handles are dropped as
//! soon as the rows for one retrieval are extracted, so at most one file is
//! held open per retrieval.

use std::ops::Range;

use crate::batch::EventBatch;
use crate::error::{Result, StoreError};

/// Factory for per-file readers.
pub trait EventSource: Send + Sync {
    /// Open the table stored in `file`.
    fn open(&self, file: &str) -> Result<Box<dyn TreeReader + '_>>;
}

/// Open handle over one backing file's table.
pub trait TreeReader {
    /// Total number of rows in the table.
    fn num_entries(&self) -> u64;

    /// Read `branches` for rows in `range`.
    ///
    /// Implementations must return exactly the requested branches and fail
    /// with [`StoreError::MissingBranch`] if one is absent.
    fn read(&mut self, branches: &[String], range: Range<u64>) -> Result<EventBatch>;
}

/// Validate `range` against a table of `entries` rows.
///
/// `stop` past the end is clamped to `entries`; `start > stop` is an error.
pub fn clamp_range(range: Range<u64>, entries: u64) -> Result<Range<u64>> {
    if range.start > range.end || range.start > entries {
        return Err(StoreError::InvalidRange { start: range.start, stop: range.end, entries });
    }
    Ok(range.start..range.end.min(entries))
}
