//! In-memory event source.

use std::collections::HashMap;
use std::ops::Range;

use crate::batch::EventBatch;
use crate::error::{Result, StoreError};
use crate::source::{EventSource, TreeReader, clamp_range};

/// Event source backed by batches already held in memory, keyed by file id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, EventBatch>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `batch` under `file`.
    pub fn with_file(mut self, file: impl Into<String>, batch: EventBatch) -> Self {
        self.insert(file, batch);
        self
    }

    /// Register `batch` under `file`, replacing any previous table.
    pub fn insert(&mut self, file: impl Into<String>, batch: EventBatch) {
        self.files.insert(file.into(), batch);
    }
}

impl EventSource for MemorySource {
    fn open(&self, file: &str) -> Result<Box<dyn TreeReader + '_>> {
        let batch = self.files.get(file).ok_or_else(|| StoreError::MissingFile(file.to_string()))?;
        Ok(Box::new(MemoryReader { batch }))
    }
}

struct MemoryReader<'a> {
    batch: &'a EventBatch,
}

impl TreeReader for MemoryReader<'_> {
    fn num_entries(&self) -> u64 {
        self.batch.len() as u64
    }

    fn read(&mut self, branches: &[String], range: Range<u64>) -> Result<EventBatch> {
        let range = clamp_range(range, self.num_entries())?;
        self.batch.slice(range.start as usize, range.end as usize).project(branches)
    }
}
