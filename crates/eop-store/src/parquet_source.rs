//! Parquet-backed event source.
//!
//! Each file holds one flat table whose top-level numeric columns are the
//! branches. Reads project only the requested columns and decode only the
//! requested row range; integer and boolean columns are widened to `f64` and
//! nulls become NaN. A file id naming a directory is resolved to the tree
//! file `<dir>/<tree_name>.parquet` inside it.

use std::fs::File;
use std::io::ErrorKind;
use std::ops::Range;
use std::path::{Path, PathBuf};

use arrow::array::AsArray;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::batch::EventBatch;
use crate::error::{Result, StoreError};
use crate::source::{EventSource, TreeReader, clamp_range};

/// Default number of rows decoded per Arrow batch.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// Default tree name.
pub const DEFAULT_TREE_NAME: &str = "tree";

/// Event source reading Parquet files below a base directory.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    base_dir: PathBuf,
    tree_name: String,
    batch_size: usize,
}

impl ParquetSource {
    /// Resolve relative file ids against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tree_name: DEFAULT_TREE_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Tree read from directory-style file ids.
    pub fn with_tree_name(mut self, tree_name: impl Into<String>) -> Self {
        self.tree_name = tree_name.into();
        self
    }

    /// Override the decode batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        let path = if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) };
        if path.is_dir() { path.join(format!("{}.parquet", self.tree_name)) } else { path }
    }
}

impl EventSource for ParquetSource {
    fn open(&self, file: &str) -> Result<Box<dyn TreeReader + '_>> {
        let path = self.resolve(file);
        let handle = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::MissingFile(path.display().to_string()),
            _ => StoreError::Io(e),
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(handle.try_clone()?)?;
        let entries = builder.metadata().file_metadata().num_rows().max(0) as u64;
        log::debug!("opened {} ({} entries)", path.display(), entries);
        Ok(Box::new(ParquetReader { handle, entries, batch_size: self.batch_size }))
    }
}

struct ParquetReader {
    handle: File,
    entries: u64,
    batch_size: usize,
}

impl TreeReader for ParquetReader {
    fn num_entries(&self) -> u64 {
        self.entries
    }

    fn read(&mut self, branches: &[String], range: Range<u64>) -> Result<EventBatch> {
        let range = clamp_range(range, self.entries)?;
        let n_rows = (range.end - range.start) as usize;
        let mut out = EventBatch::new(n_rows);
        if branches.is_empty() {
            return Ok(out);
        }

        let builder = ParquetRecordBatchReaderBuilder::try_new(self.handle.try_clone()?)?;
        let roots = branches
            .iter()
            .map(|name| {
                builder.schema().index_of(name).map_err(|_| StoreError::MissingBranch(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder
            .with_projection(mask)
            .with_offset(range.start as usize)
            .with_limit(n_rows)
            .with_batch_size(self.batch_size)
            .build()?;

        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n_rows); branches.len()];
        for record_batch in reader {
            let record_batch = record_batch?;
            for (name, values) in branches.iter().zip(columns.iter_mut()) {
                let array = record_batch
                    .column_by_name(name)
                    .ok_or_else(|| StoreError::MissingBranch(name.clone()))?;
                let widened = cast(array, &DataType::Float64)?;
                let widened = widened.as_primitive::<Float64Type>();
                values.extend(widened.iter().map(|v| v.unwrap_or(f64::NAN)));
            }
        }

        for (name, values) in branches.iter().zip(columns) {
            out.insert_column(name.clone(), values)?;
        }
        Ok(out)
    }
}
