//! Bin-edge generators and axis binning.

use crate::error::{FillError, Result};

/// `n + 1` evenly spaced edges spanning `[min, max]`.
pub fn get_bins(min: f64, max: f64, n: usize) -> Vec<f64> {
    let width = (max - min) / n as f64;
    let mut edges: Vec<f64> = (0..n).map(|i| min + width * i as f64).collect();
    edges.push(max);
    edges
}

/// `n + 1` logarithmically spaced edges spanning `[min, max]`; `min` must be positive.
pub fn get_log_bins(min: f64, max: f64, n: usize) -> Vec<f64> {
    let ratio = (max / min).powf(1.0 / n as f64);
    let mut edges = Vec::with_capacity(n + 1);
    let mut edge = min;
    for _ in 0..n {
        edges.push(edge);
        edge *= ratio;
    }
    edges.push(max);
    edges
}

/// Track momentum from transverse momentum and pseudorapidity.
pub fn get_p(pt: f64, eta: f64) -> f64 {
    pt * eta.cosh()
}

/// Where a value lands on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    /// Below the first edge.
    Underflow,
    /// In-range bin, zero-based.
    Bin(usize),
    /// At or above the last edge, or NaN.
    Overflow,
}

/// Binning of one axis: a fixed bin count over a range, or explicit edges.
#[derive(Debug, Clone, PartialEq)]
pub enum Binning {
    /// `bins` equal-width bins over `[low, high)`.
    Fixed {
        /// Number of bins.
        bins: usize,
        /// Lower edge of the first bin.
        low: f64,
        /// Upper edge of the last bin.
        high: f64,
    },
    /// Variable-width bins; `n + 1` strictly increasing edges.
    Edges(Vec<f64>),
}

impl Binning {
    /// Validated fixed binning.
    pub fn fixed(bins: usize, low: f64, high: f64) -> Result<Self> {
        let b = Self::Fixed { bins, low, high };
        b.validate()?;
        Ok(b)
    }

    /// Validated variable-width binning.
    pub fn edges(edges: Vec<f64>) -> Result<Self> {
        let b = Self::Edges(edges);
        b.validate()?;
        Ok(b)
    }

    /// Reject empty, reversed or unsorted binnings.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed { bins, low, high } => {
                if *bins == 0 {
                    return Err(FillError::InvalidBinning("zero bins".into()));
                }
                if !(low < high) || !low.is_finite() || !high.is_finite() {
                    return Err(FillError::InvalidBinning(format!(
                        "range [{low}, {high}) is empty"
                    )));
                }
            }
            Self::Edges(edges) => {
                if edges.len() < 2 {
                    return Err(FillError::InvalidBinning(format!(
                        "need at least two edges, got {}",
                        edges.len()
                    )));
                }
                if let Some(w) = edges.windows(2).find(|w| !(w[0] < w[1])) {
                    return Err(FillError::InvalidBinning(format!(
                        "edges not strictly increasing at {} -> {}",
                        w[0], w[1]
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether this is a fixed-count binning.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed { .. })
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        match self {
            Self::Fixed { bins, .. } => *bins,
            Self::Edges(edges) => edges.len().saturating_sub(1),
        }
    }

    /// All bin edges, `n_bins() + 1` of them.
    pub fn bin_edges(&self) -> Vec<f64> {
        match self {
            Self::Fixed { bins, low, high } => get_bins(*low, *high, *bins),
            Self::Edges(edges) => edges.clone(),
        }
    }

    /// Bin containing `x`; bins are half-open `[lo, hi)`.
    pub fn find_bin(&self, x: f64) -> BinIndex {
        match self {
            Self::Fixed { bins, low, high } => {
                if x < *low {
                    BinIndex::Underflow
                } else if !(x < *high) {
                    BinIndex::Overflow
                } else {
                    let i = ((x - low) / (high - low) * *bins as f64) as usize;
                    BinIndex::Bin(i.min(bins - 1))
                }
            }
            Self::Edges(edges) => find_edge_bin(edges, x),
        }
    }
}

fn find_edge_bin(edges: &[f64], x: f64) -> BinIndex {
    let (Some(&first), Some(&last)) = (edges.first(), edges.last()) else {
        return BinIndex::Overflow;
    };
    if x < first {
        return BinIndex::Underflow;
    }
    if !(x < last) {
        return BinIndex::Overflow;
    }
    BinIndex::Bin(edges.partition_point(|&e| e <= x) - 1)
}

/// One histogram axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Binning.
    pub binning: Binning,
    /// Axis title.
    pub title: String,
}

impl Axis {
    /// Validated axis.
    pub fn new(binning: Binning, title: impl Into<String>) -> Result<Self> {
        binning.validate()?;
        Ok(Self { binning, title: title.into() })
    }

    /// Fixed-binning axis.
    pub fn fixed(bins: usize, low: f64, high: f64, title: impl Into<String>) -> Result<Self> {
        Self::new(Binning::Fixed { bins, low, high }, title)
    }

    /// Variable-width axis.
    pub fn edges(edges: Vec<f64>, title: impl Into<String>) -> Result<Self> {
        Self::new(Binning::Edges(edges), title)
    }
}

/// Both axes of a 2D fill must use the same binning style.
pub fn check_same_style(name: &str, x: &Binning, y: &Binning) -> Result<()> {
    if x.is_fixed() != y.is_fixed() {
        return Err(FillError::MixedBinSpec(name.to_string()));
    }
    Ok(())
}
