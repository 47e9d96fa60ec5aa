//! Columnar batch of per-track rows.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

/// A set of named `f64` columns aligned by row index.
///
/// Every column has exactly [`EventBatch::len`] entries. Integer and boolean
/// branches are widened to `f64` on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    n_rows: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl EventBatch {
    /// Create an empty batch with a fixed row count and no columns.
    ///
    /// Useful for calculations that need no branches (e.g. a track counter).
    pub fn new(n_rows: usize) -> Self {
        Self { n_rows, columns: BTreeMap::new() }
    }

    /// Build a batch from `(name, values)` pairs; all columns must share one length.
    pub fn from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let mut batch: Option<Self> = None;
        for (name, values) in columns {
            match batch.as_mut() {
                None => {
                    let mut b = Self::new(values.len());
                    b.columns.insert(name, values);
                    batch = Some(b);
                }
                Some(b) => b.insert_column(name, values)?,
            }
        }
        Ok(batch.unwrap_or_default())
    }

    /// Add or replace a column.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_rows {
            return Err(StoreError::RaggedColumns {
                column: name,
                expected: self.n_rows,
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Borrow a column by branch name.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::MissingBranch(name.to_string()))
    }

    /// Whether a column with this name is present.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in lexical order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Keep only the rows where `mask` is `true`.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows {
            return Err(StoreError::MaskLength { mask: mask.len(), rows: self.n_rows });
        }
        let n_rows = mask.iter().filter(|&&keep| keep).count();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), select_rows(values, mask)))
            .collect();
        Ok(Self { n_rows, columns })
    }

    /// Copy rows `start..stop` (clamped to the batch length) into a new batch.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        let stop = stop.min(self.n_rows);
        let start = start.min(stop);
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), values[start..stop].to_vec()))
            .collect();
        Self { n_rows: stop - start, columns }
    }

    /// Drop every column not listed in `keep`.
    pub fn project(&self, keep: &[String]) -> Result<Self> {
        let mut out = Self::new(self.n_rows);
        for name in keep {
            out.columns.insert(name.clone(), self.column(name)?.to_vec());
        }
        Ok(out)
    }
}

/// Gather `values[i]` for every `i` where `mask[i]` holds.
pub fn select_rows<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
    values.iter().zip(mask).filter_map(|(&v, &keep)| keep.then_some(v)).collect()
}
