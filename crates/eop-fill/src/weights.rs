//! Event-weight normalisation for simulated samples.
//!
//! Simulated files are scaled by `cross section x filter efficiency / generated
//! events` (looked up by dataset id in the file name) and by the integrated
//! luminosity. Data files always get unit weights.

use serde::{Deserialize, Serialize};

use crate::error::{FillError, Result};

/// One dataset id and its per-event normalisation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSectionEntry {
    /// Dataset id, matched as a substring of the file name.
    pub dataset_id: String,
    /// Normalisation factor in nb per generated event.
    pub weight: f64,
}

/// Dataset id to normalisation lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrossSectionTable {
    entries: Vec<CrossSectionEntry>,
}

impl Default for CrossSectionTable {
    fn default() -> Self {
        Self::dijet_jz()
    }
}

impl CrossSectionTable {
    /// Build a table from `(dataset_id, weight)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, weight)| CrossSectionEntry { dataset_id: id.into(), weight })
                .collect(),
        }
    }

    /// Pythia8 dijet JZ0-JZ2 slices plus the single-particle samples, each
    /// normalised to generated events, cross section (nb) and filter efficiency.
    pub fn dijet_jz() -> Self {
        Self::new([
            ("361020", (1.0 / 9999000.0) * 78420000.0 * 0.9755),
            ("361021", (1.0 / 3995000.0) * 78420000.0 * 0.00067143),
            ("361022", (1.0 / 1998000.0) * 2433200.0 * 0.00033423),
            ("428001", 1.0),
            ("428002", 1.0),
        ])
    }

    /// Entries in table order.
    pub fn entries(&self) -> &[CrossSectionEntry] {
        &self.entries
    }

    /// Normalisation factor for `file`.
    ///
    /// Dataset ids are matched against the last path segment (or the
    /// directory name when `file` ends in `/`). No match, or more than one
    /// distinct dataset id matching, is a configuration error.
    pub fn lookup(&self, file: &str) -> Result<f64> {
        let name = sample_name(file);
        let mut matches = self.entries.iter().filter(|e| name.contains(e.dataset_id.as_str()));
        let first = matches.next().ok_or_else(|| {
            FillError::Configuration(format!("unknown dataset id for file '{file}'"))
        })?;
        if let Some(second) = matches.find(|e| e.dataset_id != first.dataset_id) {
            return Err(FillError::Configuration(format!(
                "ambiguous dataset id for file '{file}': matches both '{}' and '{}'",
                first.dataset_id, second.dataset_id
            )));
        }
        Ok(first.weight)
    }
}

/// Integrated luminosity in nb^-1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Luminosity {
    /// Prescale-corrected luminosity applied to simulation.
    pub prescaled: f64,
    /// Full delivered luminosity.
    pub unprescaled: f64,
}

impl Default for Luminosity {
    fn default() -> Self {
        Self { prescaled: 5.25948, unprescaled: 147.717 * 1000.0 }
    }
}

/// Whether `file` is collision data, judged by `data`/`Data` in its last
/// path segment or in its parent directory.
pub fn is_data_file(file: &str) -> bool {
    let mut segments = file.rsplit('/');
    let last = segments.next().unwrap_or("");
    let parent = segments.next().unwrap_or("");
    [last, parent].iter().any(|s| s.contains("data") || s.contains("Data"))
}

fn sample_name(file: &str) -> &str {
    match file.strip_suffix('/') {
        Some(dir) => dir.rsplit('/').next().unwrap_or(dir),
        None => file.rsplit('/').next().unwrap_or(file),
    }
}

/// Turns per-row generator weights into analysis weights.
#[derive(Debug, Clone, Default)]
pub struct WeightNormalizer {
    cross_sections: CrossSectionTable,
    luminosity: Luminosity,
}

impl WeightNormalizer {
    /// Create a normaliser from an explicit table and luminosity.
    pub fn new(cross_sections: CrossSectionTable, luminosity: Luminosity) -> Self {
        Self { cross_sections, luminosity }
    }

    /// The cross-section table in use.
    pub fn cross_sections(&self) -> &CrossSectionTable {
        &self.cross_sections
    }

    /// The luminosity in use.
    pub fn luminosity(&self) -> Luminosity {
        self.luminosity
    }

    /// Final weights for one batch read from `file`.
    ///
    /// Data gets `1.0` per row whatever `generator` holds; simulation gets
    /// `generator * xsec_weight * prescaled_lumi`.
    pub fn normalize(&self, generator: &[f64], is_data: bool, file: &str) -> Result<Vec<f64>> {
        if is_data {
            return Ok(vec![1.0; generator.len()]);
        }
        let scale = self.cross_sections.lookup(file)? * self.luminosity.prescaled;
        log::debug!("cross-section weight for {file}: {scale}");
        Ok(generator.iter().map(|w| w * scale).collect())
    }
}
