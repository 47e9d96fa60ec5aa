//! Per-file data retrieval: read, filter, weight, evaluate.

use std::collections::HashMap;
use std::sync::Arc;

use eop_store::{EventSource, Formula, select_rows};

use crate::branches::resolve_with_weight;
use crate::calculation::{Selection, Variable, WeightCalculation};
use crate::channel::Partition;
use crate::error::{FillError, Result};
use crate::retry::RetryPolicy;
use crate::weights::{WeightNormalizer, is_data_file};

/// Row-aligned results of one retrieval: every variable array, every
/// selection mask and the weights have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedData {
    /// Variable values keyed by calculation name.
    pub variables: HashMap<String, Vec<f64>>,
    /// Selection masks keyed by calculation name.
    pub selections: HashMap<String, Vec<bool>>,
    /// Final per-row weights.
    pub weights: Vec<f64>,
}

impl RetrievedData {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether no rows survived.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Values of a variable.
    pub fn variable(&self, name: &str) -> Result<&[f64]> {
        self.variables
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FillError::UnknownCalculation(name.to_string()))
    }

    /// Mask of a selection.
    pub fn selection(&self, name: &str) -> Result<&[bool]> {
        self.selections
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FillError::UnknownCalculation(name.to_string()))
    }

    /// Logical AND of the named selections; all rows pass when `names` is empty.
    pub fn conjunction<'a, I>(&self, names: I) -> Result<Vec<bool>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mask = vec![true; self.len()];
        for name in names {
            for (m, &pass) in mask.iter_mut().zip(self.selection(name)?) {
                *m &= pass;
            }
        }
        Ok(mask)
    }

    /// Keep only the rows where `mask` holds, in every array.
    pub fn prune(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(FillError::LengthMismatch {
                name: "row mask".into(),
                expected: self.len(),
                actual: mask.len(),
            });
        }
        Ok(Self {
            variables: self
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), select_rows(v, mask)))
                .collect(),
            selections: self
                .selections
                .iter()
                .map(|(k, v)| (k.clone(), select_rows(v, mask)))
                .collect(),
            weights: select_rows(&self.weights, mask),
        })
    }
}

/// Reads one file partition and evaluates every registered calculation on it.
pub struct DataRetriever {
    source: Arc<dyn EventSource>,
    weight: WeightCalculation,
    normalizer: WeightNormalizer,
    row_filter: Option<Formula>,
    retry: RetryPolicy,
}

impl DataRetriever {
    /// Create a retriever with no row filter and the default retry policy.
    pub fn new(
        source: Arc<dyn EventSource>,
        weight: WeightCalculation,
        normalizer: WeightNormalizer,
    ) -> Self {
        Self { source, weight, normalizer, row_filter: None, retry: RetryPolicy::default() }
    }

    /// Apply `filter` to every file at read time.
    pub fn with_row_filter(mut self, filter: Option<Formula>) -> Self {
        self.row_filter = filter;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read `file` for `channel` and evaluate `variables` and `selections`.
    ///
    /// Only the branches the calculations, the weight and the row filter need
    /// are read. The file handle is released before evaluation starts.
    pub fn retrieve(
        &self,
        channel: &str,
        file: &str,
        partition: Option<Partition>,
        variables: &[Variable],
        selections: &[Selection],
    ) -> Result<RetrievedData> {
        let is_data = is_data_file(file);
        let mut branches = resolve_with_weight(variables, selections, &self.weight);
        if let Some(filter) = &self.row_filter {
            branches.extend(filter.required_branches.iter().cloned());
        }
        let branches: Vec<String> = branches.into_iter().collect();
        log::debug!("reading {} branch(es) from {file}: {branches:?}", branches.len());

        let batch = self.retry.run(file, |_| {
            let mut reader = self.source.open(file)?;
            let range = match partition {
                Some(p) => p.start..p.end,
                None => 0..reader.num_entries(),
            };
            log::info!(
                "reading entries {}..{} of {file} for channel {channel}",
                range.start,
                range.end
            );
            reader.read(&branches, range)
        })?;

        let batch = match &self.row_filter {
            Some(filter) => {
                let mask = filter.eval_mask(&batch)?;
                let kept = batch.filter(&mask)?;
                log::debug!("row filter '{filter}' kept {} of {} rows", kept.len(), batch.len());
                kept
            }
            None => batch,
        };

        let generator = self.weight.eval(&batch, is_data, channel)?;
        let weights = self.normalizer.normalize(&generator, is_data, file)?;

        let mut out = RetrievedData { weights, ..Default::default() };
        for variable in variables {
            if !out.variables.contains_key(variable.name()) {
                out.variables.insert(variable.name().to_string(), variable.eval(&batch)?);
            }
        }
        for selection in selections {
            if !out.selections.contains_key(selection.name()) {
                let mask = selection.eval(&batch)?;
                log::debug!(
                    "selection {} passes {} of {} rows",
                    selection.name(),
                    mask.iter().filter(|&&p| p).count(),
                    mask.len()
                );
                out.selections.insert(selection.name().to_string(), mask);
            }
        }
        Ok(out)
    }
}
