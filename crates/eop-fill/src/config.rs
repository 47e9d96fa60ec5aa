//! JSON configuration for a filling run.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "tree_name": "LA_EoverP_InDetTrackParticlesSortedLooseIsolatedVertexAssociated_tree",
//!   "row_filter": "trk_nTRT >= 20",
//!   "luminosity": { "prescaled": 5.25948, "unprescaled": 147717.0 },
//!   "cross_sections": [ { "dataset_id": "361020", "weight": 7.65 } ],
//!   "retry": { "max_attempts": 50, "delay_secs": 5.0 },
//!   "partitions": { "LowMuData": { "data/part_001.parquet": [0, 100000] } }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eop_store::{DEFAULT_TREE_NAME, Formula, ParquetSource};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::{FillError, Result};
use crate::retry::RetryPolicy;
use crate::weights::{CrossSectionTable, Luminosity, WeightNormalizer};

/// Settings consumed by [`crate::HistogramFiller`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    /// Name of the table read from each backing file.
    pub tree_name: String,
    /// Row filter applied to every file at read time; empty means none.
    pub row_filter: String,
    /// Integrated luminosity.
    pub luminosity: Luminosity,
    /// Dataset-id normalisation table.
    pub cross_sections: CrossSectionTable,
    /// Read retry policy.
    pub retry: RetryPolicy,
    /// Row ranges per channel and file, as `[start, end]`.
    pub partitions: BTreeMap<String, BTreeMap<String, (u64, u64)>>,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            tree_name: DEFAULT_TREE_NAME.to_string(),
            row_filter: String::new(),
            luminosity: Luminosity::default(),
            cross_sections: CrossSectionTable::default(),
            retry: RetryPolicy::default(),
            partitions: BTreeMap::new(),
        }
    }
}

impl FillerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("loading filler configuration from {}", path.display());
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Check the row filter compiles and partitions are ordered.
    pub fn validate(&self) -> Result<()> {
        self.row_filter_formula()?;
        for (channel, files) in &self.partitions {
            for (file, &(start, end)) in files {
                if start > end {
                    return Err(FillError::InvalidPartition { file: file.clone(), start, end });
                }
            }
            if channel.is_empty() {
                return Err(FillError::Configuration(
                    "partition map has an empty channel name".into(),
                ));
            }
        }
        if self.luminosity.prescaled <= 0.0 {
            return Err(FillError::Configuration(format!(
                "prescaled luminosity must be positive, got {}",
                self.luminosity.prescaled
            )));
        }
        Ok(())
    }

    /// Compiled row filter, `None` when blank.
    pub fn row_filter_formula(&self) -> Result<Option<Formula>> {
        Ok(Formula::compile_optional(&self.row_filter)?)
    }

    /// Parquet source below `base_dir` reading the configured tree.
    pub fn parquet_source(&self, base_dir: impl Into<PathBuf>) -> ParquetSource {
        ParquetSource::new(base_dir).with_tree_name(self.tree_name.clone())
    }

    /// Weight normaliser built from the table and luminosity.
    pub fn normalizer(&self) -> WeightNormalizer {
        WeightNormalizer::new(self.cross_sections.clone(), self.luminosity)
    }

    /// Attach the configured partitions of `channel.name` to `channel`.
    pub fn apply_partitions(&self, mut channel: Channel) -> Result<Channel> {
        if let Some(files) = self.partitions.get(&channel.name) {
            for (file, &(start, end)) in files {
                if !channel.files.contains(file) {
                    log::warn!(
                        "partition for '{file}' ignored: not a file of channel '{}'",
                        channel.name
                    );
                    continue;
                }
                channel = channel.with_partition(file.clone(), start, end)?;
            }
        }
        Ok(channel)
    }
}
