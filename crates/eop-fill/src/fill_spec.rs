//! Fill specifications: what to histogram, under which selections.
//!
//! A [`FillSpec`] is plain data. [`FillSpec::fill`] is the single dispatcher
//! that turns retrieved rows into histogram content for every kind.

use crate::binning::{Axis, check_same_style};
use crate::calculation::{Selection, Variable};
use crate::error::{FillError, Result};
use crate::histogram::{FilledHistogram, Histogram1D, Histogram2D, Profile1D, Profile2D};
use crate::retriever::RetrievedData;

/// Histogram shape and the variables feeding each axis.
#[derive(Debug, Clone)]
pub enum FillKind {
    /// Counts of `x`.
    Hist1D {
        /// X variable.
        x: Variable,
        /// X axis.
        axis: Axis,
    },
    /// Counts of `(x, y)`.
    Hist2D {
        /// X variable.
        x: Variable,
        /// Y variable.
        y: Variable,
        /// X axis.
        x_axis: Axis,
        /// Y axis.
        y_axis: Axis,
        /// Content title.
        z_title: String,
    },
    /// Mean of `y` per `x` bin.
    Profile1D {
        /// X variable.
        x: Variable,
        /// Profiled variable.
        y: Variable,
        /// X axis.
        axis: Axis,
        /// Title of the profiled quantity.
        y_title: String,
    },
    /// Mean of `z` per `(x, y)` bin.
    Profile2D {
        /// X variable.
        x: Variable,
        /// Y variable.
        y: Variable,
        /// Profiled variable.
        z: Variable,
        /// X axis.
        x_axis: Axis,
        /// Y axis.
        y_axis: Axis,
        /// Title of the profiled quantity.
        z_title: String,
    },
}

impl FillKind {
    /// Binned axes, x first.
    pub fn axes(&self) -> Vec<&Axis> {
        match self {
            Self::Hist1D { axis, .. } | Self::Profile1D { axis, .. } => vec![axis],
            Self::Hist2D { x_axis, y_axis, .. } | Self::Profile2D { x_axis, y_axis, .. } => {
                vec![x_axis, y_axis]
            }
        }
    }
}

/// One booked histogram.
#[derive(Debug, Clone)]
pub struct FillSpec {
    /// Histogram name, unique across the filler.
    pub name: String,
    /// Shape and axis variables.
    pub kind: FillKind,
    /// Per-histogram selections, ANDed on top of the channel selections.
    pub selections: Vec<Selection>,
    /// Fill with event weights (otherwise every row counts `1.0`).
    pub use_weights: bool,
}

impl FillSpec {
    /// Create a spec, rejecting invalid binnings and 2D kinds whose axes mix
    /// binning styles.
    pub fn new(
        name: impl Into<String>,
        kind: FillKind,
        selections: Vec<Selection>,
        use_weights: bool,
    ) -> Result<Self> {
        let name = name.into();
        for axis in kind.axes() {
            axis.binning.validate()?;
        }
        match &kind {
            FillKind::Hist2D { x_axis, y_axis, .. }
            | FillKind::Profile2D { x_axis, y_axis, .. } => {
                check_same_style(&name, &x_axis.binning, &y_axis.binning)?;
            }
            FillKind::Hist1D { .. } | FillKind::Profile1D { .. } => {}
        }
        Ok(Self { name, kind, selections, use_weights })
    }

    /// Variables read by this spec, in axis order.
    pub fn variables(&self) -> Vec<&Variable> {
        match &self.kind {
            FillKind::Hist1D { x, .. } => vec![x],
            FillKind::Hist2D { x, y, .. } | FillKind::Profile1D { x, y, .. } => vec![x, y],
            FillKind::Profile2D { x, y, z, .. } => vec![x, y, z],
        }
    }

    /// Empty histogram matching this spec.
    pub fn empty_histogram(&self) -> FilledHistogram {
        let name = self.name.clone();
        match &self.kind {
            FillKind::Hist1D { axis, .. } => {
                FilledHistogram::Hist1D(Histogram1D::new(name, axis.clone()))
            }
            FillKind::Hist2D { x_axis, y_axis, z_title, .. } => FilledHistogram::Hist2D(
                Histogram2D::new(name, x_axis.clone(), y_axis.clone(), z_title.clone()),
            ),
            FillKind::Profile1D { axis, y_title, .. } => {
                FilledHistogram::Profile1D(Profile1D::new(name, axis.clone(), y_title.clone()))
            }
            FillKind::Profile2D { x_axis, y_axis, z_title, .. } => FilledHistogram::Profile2D(
                Profile2D::new(name, x_axis.clone(), y_axis.clone(), z_title.clone()),
            ),
        }
    }

    /// Fill `hist` from the rows of `data` passing this spec's selections.
    ///
    /// Returns the number of rows filled.
    pub fn fill(&self, hist: &mut FilledHistogram, data: &RetrievedData) -> Result<u64> {
        let mask = data.conjunction(self.selections.iter().map(Selection::name))?;
        let weight = |i: usize| if self.use_weights { data.weights[i] } else { 1.0 };
        let rows = mask.iter().enumerate().filter(|(_, pass)| **pass).map(|(i, _)| i);
        let mut filled = 0u64;
        match (&self.kind, hist) {
            (FillKind::Hist1D { x, .. }, FilledHistogram::Hist1D(h)) => {
                let xs = data.variable(x.name())?;
                for i in rows {
                    h.fill(xs[i], weight(i));
                    filled += 1;
                }
            }
            (FillKind::Hist2D { x, y, .. }, FilledHistogram::Hist2D(h)) => {
                let (xs, ys) = (data.variable(x.name())?, data.variable(y.name())?);
                for i in rows {
                    h.fill(xs[i], ys[i], weight(i));
                    filled += 1;
                }
            }
            (FillKind::Profile1D { x, y, .. }, FilledHistogram::Profile1D(h)) => {
                let (xs, ys) = (data.variable(x.name())?, data.variable(y.name())?);
                for i in rows {
                    h.fill(xs[i], ys[i], weight(i));
                    filled += 1;
                }
            }
            (FillKind::Profile2D { x, y, z, .. }, FilledHistogram::Profile2D(h)) => {
                let (xs, ys, zs) =
                    (data.variable(x.name())?, data.variable(y.name())?, data.variable(z.name())?);
                for i in rows {
                    h.fill(xs[i], ys[i], zs[i], weight(i));
                    filled += 1;
                }
            }
            (_, other) => {
                return Err(FillError::Configuration(format!(
                    "histogram '{}' does not match the kind booked for '{}'",
                    other.name(),
                    self.name
                )));
            }
        }
        Ok(filled)
    }
}
