//! In-memory histogram objects produced by the filler.
//!
//! All kinds keep the sum of squared weights per bin, and under/overflow
//! content next to the in-range bins. `entries` counts every fill call,
//! flows included.

use std::collections::BTreeMap;

use crate::binning::{Axis, BinIndex};

/// Weighted counts for one 1D axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    /// Histogram name.
    pub name: String,
    /// X axis.
    pub axis: Axis,
    /// Sum of weights per bin.
    pub sumw: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Underflow sum of weights.
    pub underflow: f64,
    /// Overflow sum of weights.
    pub overflow: f64,
    /// Underflow sum of squared weights.
    pub underflow_sumw2: f64,
    /// Overflow sum of squared weights.
    pub overflow_sumw2: f64,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram1D {
    /// Empty histogram over `axis`.
    pub fn new(name: impl Into<String>, axis: Axis) -> Self {
        let n = axis.binning.n_bins();
        Self {
            name: name.into(),
            axis,
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0,
        }
    }

    /// Add `w` at `x`.
    pub fn fill(&mut self, x: f64, w: f64) {
        let w2 = w * w;
        match self.axis.binning.find_bin(x) {
            BinIndex::Bin(b) => {
                self.sumw[b] += w;
                self.sumw2[b] += w2;
            }
            BinIndex::Underflow => {
                self.underflow += w;
                self.underflow_sumw2 += w2;
            }
            BinIndex::Overflow => {
                self.overflow += w;
                self.overflow_sumw2 += w2;
            }
        }
        self.entries += 1;
    }

    /// Sum of in-range weights.
    pub fn integral(&self) -> f64 {
        self.sumw.iter().sum()
    }

    /// Statistical error of bin `b`.
    pub fn error(&self, b: usize) -> f64 {
        self.sumw2[b].sqrt()
    }
}

/// Weighted counts over an x/y grid, stored row-major in x.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    /// Histogram name.
    pub name: String,
    /// X axis.
    pub x_axis: Axis,
    /// Y axis.
    pub y_axis: Axis,
    /// Z (content) title.
    pub z_title: String,
    /// Sum of weights, index `ix * ny + iy`.
    pub sumw: Vec<f64>,
    /// Sum of squared weights, same layout.
    pub sumw2: Vec<f64>,
    /// Sum of weights falling outside either axis.
    pub flow: f64,
    /// Sum of squared weights falling outside either axis.
    pub flow_sumw2: f64,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram2D {
    /// Empty histogram over `x_axis` x `y_axis`.
    pub fn new(
        name: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
        z_title: impl Into<String>,
    ) -> Self {
        let n = x_axis.binning.n_bins() * y_axis.binning.n_bins();
        Self {
            name: name.into(),
            x_axis,
            y_axis,
            z_title: z_title.into(),
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            flow: 0.0,
            flow_sumw2: 0.0,
            entries: 0,
        }
    }

    /// Add `w` at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, w: f64) {
        match grid_index(&self.x_axis, &self.y_axis, x, y) {
            Some(i) => {
                self.sumw[i] += w;
                self.sumw2[i] += w * w;
            }
            None => {
                self.flow += w;
                self.flow_sumw2 += w * w;
            }
        }
        self.entries += 1;
    }

    /// Content of bin `(ix, iy)`.
    pub fn bin(&self, ix: usize, iy: usize) -> f64 {
        self.sumw[ix * self.y_axis.binning.n_bins() + iy]
    }

    /// Sum of in-range weights.
    pub fn integral(&self) -> f64 {
        self.sumw.iter().sum()
    }
}

fn grid_index(x_axis: &Axis, y_axis: &Axis, x: f64, y: f64) -> Option<usize> {
    match (x_axis.binning.find_bin(x), y_axis.binning.find_bin(y)) {
        (BinIndex::Bin(ix), BinIndex::Bin(iy)) => Some(ix * y_axis.binning.n_bins() + iy),
        _ => None,
    }
}

/// Running sums of one profile bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileBin {
    /// Sum of weights.
    pub sumw: f64,
    /// Sum of `w * y`.
    pub sumwy: f64,
    /// Sum of `w * y^2`.
    pub sumwy2: f64,
    /// Sum of `w^2`.
    pub sumw2: f64,
}

impl ProfileBin {
    fn add(&mut self, y: f64, w: f64) {
        self.sumw += w;
        self.sumwy += w * y;
        self.sumwy2 += w * y * y;
        self.sumw2 += w * w;
    }

    /// Weighted mean of the profiled quantity; `0` for an empty bin.
    pub fn mean(&self) -> f64 {
        if self.sumw == 0.0 { 0.0 } else { self.sumwy / self.sumw }
    }

    /// Standard error of the mean, using the effective entry count
    /// `sumw^2 / sumw2`; `0` for an empty bin.
    pub fn error(&self) -> f64 {
        if self.sumw == 0.0 || self.sumw2 == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = (self.sumwy2 / self.sumw - mean * mean).max(0.0);
        let n_eff = self.sumw * self.sumw / self.sumw2;
        (variance / n_eff).sqrt()
    }
}

/// Mean of `y` per `x` bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile1D {
    /// Profile name.
    pub name: String,
    /// X axis.
    pub axis: Axis,
    /// Title of the profiled quantity.
    pub y_title: String,
    /// Per-bin sums.
    pub bins: Vec<ProfileBin>,
    /// Underflow sums.
    pub underflow: ProfileBin,
    /// Overflow sums.
    pub overflow: ProfileBin,
    /// Number of fill calls.
    pub entries: u64,
}

impl Profile1D {
    /// Empty profile over `axis`.
    pub fn new(name: impl Into<String>, axis: Axis, y_title: impl Into<String>) -> Self {
        let n = axis.binning.n_bins();
        Self {
            name: name.into(),
            axis,
            y_title: y_title.into(),
            bins: vec![ProfileBin::default(); n],
            underflow: ProfileBin::default(),
            overflow: ProfileBin::default(),
            entries: 0,
        }
    }

    /// Add `y` with weight `w` at `x`.
    pub fn fill(&mut self, x: f64, y: f64, w: f64) {
        match self.axis.binning.find_bin(x) {
            BinIndex::Bin(b) => self.bins[b].add(y, w),
            BinIndex::Underflow => self.underflow.add(y, w),
            BinIndex::Overflow => self.overflow.add(y, w),
        }
        self.entries += 1;
    }

    /// Mean of bin `b`.
    pub fn mean(&self, b: usize) -> f64 {
        self.bins[b].mean()
    }

    /// Error on the mean of bin `b`.
    pub fn error(&self, b: usize) -> f64 {
        self.bins[b].error()
    }
}

/// Mean of `z` per `(x, y)` bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile2D {
    /// Profile name.
    pub name: String,
    /// X axis.
    pub x_axis: Axis,
    /// Y axis.
    pub y_axis: Axis,
    /// Title of the profiled quantity.
    pub z_title: String,
    /// Per-bin sums, index `ix * ny + iy`.
    pub bins: Vec<ProfileBin>,
    /// Sums of fills outside either axis.
    pub flow: ProfileBin,
    /// Number of fill calls.
    pub entries: u64,
}

impl Profile2D {
    /// Empty profile over `x_axis` x `y_axis`.
    pub fn new(
        name: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
        z_title: impl Into<String>,
    ) -> Self {
        let n = x_axis.binning.n_bins() * y_axis.binning.n_bins();
        Self {
            name: name.into(),
            x_axis,
            y_axis,
            z_title: z_title.into(),
            bins: vec![ProfileBin::default(); n],
            flow: ProfileBin::default(),
            entries: 0,
        }
    }

    /// Add `z` with weight `w` at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, z: f64, w: f64) {
        match grid_index(&self.x_axis, &self.y_axis, x, y) {
            Some(i) => self.bins[i].add(z, w),
            None => self.flow.add(z, w),
        }
        self.entries += 1;
    }

    /// Sums of bin `(ix, iy)`.
    pub fn bin(&self, ix: usize, iy: usize) -> &ProfileBin {
        &self.bins[ix * self.y_axis.binning.n_bins() + iy]
    }
}

/// Any filled histogram kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FilledHistogram {
    /// 1D histogram.
    Hist1D(Histogram1D),
    /// 2D histogram.
    Hist2D(Histogram2D),
    /// 1D profile.
    Profile1D(Profile1D),
    /// 2D profile.
    Profile2D(Profile2D),
}

impl FilledHistogram {
    /// Histogram name.
    pub fn name(&self) -> &str {
        match self {
            Self::Hist1D(h) => &h.name,
            Self::Hist2D(h) => &h.name,
            Self::Profile1D(h) => &h.name,
            Self::Profile2D(h) => &h.name,
        }
    }

    /// Number of fill calls.
    pub fn entries(&self) -> u64 {
        match self {
            Self::Hist1D(h) => h.entries,
            Self::Hist2D(h) => h.entries,
            Self::Profile1D(h) => h.entries,
            Self::Profile2D(h) => h.entries,
        }
    }

    /// The 1D histogram, if this is one.
    pub fn as_hist1d(&self) -> Option<&Histogram1D> {
        if let Self::Hist1D(h) = self { Some(h) } else { None }
    }

    /// The 2D histogram, if this is one.
    pub fn as_hist2d(&self) -> Option<&Histogram2D> {
        if let Self::Hist2D(h) = self { Some(h) } else { None }
    }

    /// The 1D profile, if this is one.
    pub fn as_profile1d(&self) -> Option<&Profile1D> {
        if let Self::Profile1D(h) = self { Some(h) } else { None }
    }

    /// The 2D profile, if this is one.
    pub fn as_profile2d(&self) -> Option<&Profile2D> {
        if let Self::Profile2D(h) = self { Some(h) } else { None }
    }
}

/// Filled histograms keyed by `(histogram_name, channel_name)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSet {
    histograms: BTreeMap<(String, String), FilledHistogram>,
}

impl HistogramSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `histogram` for `channel`, replacing any previous one.
    pub fn insert(&mut self, channel: &str, histogram: FilledHistogram) {
        self.histograms.insert((histogram.name().to_string(), channel.to_string()), histogram);
    }

    /// Histogram `name` filled from `channel`.
    pub fn get(&self, name: &str, channel: &str) -> Option<&FilledHistogram> {
        self.histograms.get(&(name.to_string(), channel.to_string()))
    }

    /// Mutable access to histogram `name` of `channel`.
    pub fn get_mut(&mut self, name: &str, channel: &str) -> Option<&mut FilledHistogram> {
        self.histograms.get_mut(&(name.to_string(), channel.to_string()))
    }

    /// Every `(name, channel)` pair with its histogram, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &FilledHistogram)> {
        self.histograms.iter().map(|((n, c), h)| (n.as_str(), c.as_str(), h))
    }

    /// Histograms of one channel.
    pub fn for_channel<'a>(
        &'a self,
        channel: &'a str,
    ) -> impl Iterator<Item = &'a FilledHistogram> + 'a {
        self.histograms.iter().filter(move |((_, c), _)| c == channel).map(|(_, h)| h)
    }

    /// Number of stored histograms.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}
