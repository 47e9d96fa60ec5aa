//! # eop-store
//!
//! Columnar event-store access for the E/p histogram pipeline.
//!
//! Backing files hold one flat table of per-track numeric branches. A
//! [`EventSource`] opens a file into a [`TreeReader`], which reads a projected
//! set of branches over a row range into an [`EventBatch`]. Row filters are
//! written as TTree::Draw-style selection strings and compiled into a
//! [`Formula`].
//!
//! ## Example
//!
//! ```
//! use eop_store::{EventBatch, EventSource, Formula, MemorySource};
//!
//! let batch = EventBatch::from_columns(vec![
//!     ("trk_p".to_string(), vec![1.0, 5.0, 12.0]),
//!     ("trk_nTRT".to_string(), vec![10.0, 25.0, 30.0]),
//! ])
//! .unwrap();
//! let source = MemorySource::new().with_file("data/run1.parquet", batch);
//!
//! let mut reader = source.open("data/run1.parquet").unwrap();
//! let rows = reader.read(&["trk_p".to_string(), "trk_nTRT".to_string()], 0..3).unwrap();
//! let cut = Formula::compile("trk_nTRT >= 20 && trk_p > 2").unwrap();
//! assert_eq!(cut.eval_mask(&rows).unwrap(), vec![false, true, true]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod formula;
pub mod memory;
pub mod parquet_source;
pub mod source;

pub use batch::{EventBatch, select_rows};
pub use error::{Result, StoreError};
pub use formula::Formula;
pub use memory::MemorySource;
pub use parquet_source::{DEFAULT_TREE_NAME, ParquetSource};
pub use source::{EventSource, TreeReader, clamp_range};
