//! # eop-fill
//!
//! Channel-aware histogram filling for calorimeter E/p response studies.
//!
//! Calculations (named per-row functions over event-store branches) are
//! booked into histograms; channels name sets of backing files, optionally
//! gated by channel-level selections, and subchannels re-slice a parent
//! channel's rows. [`HistogramFiller::dump_histograms`] reads each file once,
//! normalises simulation weights to cross section and luminosity, and fills
//! every booked histogram for every channel.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use eop_fill::{Axis, Channel, FillerConfig, HistogramFiller, Variable, variables};
//! use eop_store::{EventBatch, MemorySource};
//!
//! let tracks = EventBatch::from_columns(vec![
//!     ("trk_p".to_string(), vec![1.2, 3.4, 7.9]),
//!     ("trkWeight".to_string(), vec![1.0, 1.0, 1.0]),
//! ])
//! .unwrap();
//! let source = Arc::new(MemorySource::new().with_file("data/run1.parquet", tracks));
//!
//! let mut filler =
//!     HistogramFiller::new(source, FillerConfig::default(), variables::default_weight()).unwrap();
//! filler.add_channel(Channel::new("LowMuData", ["data/run1.parquet"])).unwrap();
//! let axis = Axis::fixed(10, 0.0, 10.0, "P[GeV]").unwrap();
//! filler.book_histogram_fill("trkP", Variable::branch("trk_p"), axis, vec![], true).unwrap();
//!
//! let histograms = filler.dump_histograms().unwrap();
//! assert_eq!(histograms.get("trkP", "LowMuData").unwrap().entries(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod branches;
pub mod calculation;
pub mod channel;
pub mod config;
pub mod error;
pub mod fill_spec;
pub mod filler;
pub mod histogram;
pub mod retriever;
pub mod retry;
pub mod variables;
pub mod weights;

pub use binning::{Axis, BinIndex, Binning, check_same_style, get_bins, get_log_bins, get_p};
pub use branches::{resolve_branches, resolve_with_weight};
pub use calculation::{Calculation, Selection, Variable, WeightCalculation};
pub use channel::{Channel, ChannelRegistry, Partition, Subchannel};
pub use config::FillerConfig;
pub use error::{FillError, Result};
pub use fill_spec::{FillKind, FillSpec};
pub use filler::HistogramFiller;
pub use histogram::{
    FilledHistogram, Histogram1D, Histogram2D, HistogramSet, Profile1D, Profile2D, ProfileBin,
};
pub use retriever::{DataRetriever, RetrievedData};
pub use retry::RetryPolicy;
pub use weights::{CrossSectionEntry, CrossSectionTable, Luminosity, WeightNormalizer, is_data_file};
