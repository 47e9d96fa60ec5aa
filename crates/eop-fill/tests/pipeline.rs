//! End-to-end filling over in-memory event stores.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use approx::assert_relative_eq;
use eop_fill::{
    Axis, Channel, FillError, FillerConfig, HistogramFiller, RetryPolicy, Selection, Variable,
    variables,
};
use eop_store::{EventBatch, EventSource, MemorySource, StoreError, TreeReader};
use proptest::prelude::*;

const MC_FILE: &str = "mc/user.361020.parquet";
const DATA_FILE: &str = "data/run.parquet";

fn tracks(n: usize, weight: f64) -> EventBatch {
    EventBatch::from_columns(vec![
        ("X".to_string(), (0..n).map(|i| i as f64 * 100.0 / n as f64).collect()),
        ("trk_nTRT".to_string(), (0..n).map(|i| (i % 40) as f64).collect()),
        ("trkWeight".to_string(), vec![weight; n]),
    ])
    .unwrap()
}

fn memory_source() -> MemorySource {
    MemorySource::new().with_file(MC_FILE, tracks(100, 0.5)).with_file(DATA_FILE, tracks(80, 3.0))
}

fn test_config() -> FillerConfig {
    FillerConfig { retry: RetryPolicy::immediate(3), ..FillerConfig::default() }
}

fn filler_over(source: Arc<dyn EventSource>) -> HistogramFiller {
    let mut f = HistogramFiller::new(source, test_config(), variables::default_weight()).unwrap();
    f.add_channel(Channel::new("MC", [MC_FILE])).unwrap();
    f.add_channel(Channel::new("Data", [DATA_FILE])).unwrap();
    f
}

fn x_axis() -> Axis {
    Axis::fixed(10, 0.0, 100.0, "X").unwrap()
}

#[test]
fn mc_and_data_one_histogram() {
    let mut f = filler_over(Arc::new(memory_source()));
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let set = f.dump_histograms().unwrap();

    assert_eq!(set.len(), 2);
    let mc = set.get("X", "MC").unwrap().as_hist1d().unwrap();
    let data = set.get("X", "Data").unwrap().as_hist1d().unwrap();
    assert_eq!(mc.entries, 100);
    assert_eq!(data.entries, 80);
    assert_eq!(mc.axis.title, "X");

    // Data ignores trkWeight entirely.
    assert_eq!(data.integral(), 80.0);
    assert!(data.sumw.iter().all(|&c| c == 8.0));

    let per_event = 0.5 * (78420000.0 * 0.9755 / 9999000.0) * 5.25948;
    assert_relative_eq!(mc.integral(), 100.0 * per_event, max_relative = 1e-12);
}

#[test]
fn unweighted_fill_counts_rows() {
    let mut f = filler_over(Arc::new(memory_source()));
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], false).unwrap();
    let set = f.dump_histograms().unwrap();
    assert_eq!(set.get("X", "MC").unwrap().as_hist1d().unwrap().integral(), 100.0);
}

#[test]
fn every_kind_for_every_channel() {
    let mut f = filler_over(Arc::new(memory_source()));
    let x = Variable::branch("X");
    let ntrt = variables::n_trt();
    let trt_axis = Axis::fixed(4, 0.0, 40.0, "nTRT").unwrap();
    f.book_histogram_fill("h1", x.clone(), x_axis(), vec![], true).unwrap();
    f.book_2dhistogram_fill(
        "h2",
        x.clone(),
        ntrt.clone(),
        x_axis(),
        trt_axis.clone(),
        "tracks",
        vec![],
        true,
    )
    .unwrap();
    f.book_tprofile_fill("p1", x.clone(), ntrt.clone(), x_axis(), "<nTRT>", vec![], true).unwrap();
    f.book_tprofile2d_fill(
        "p2",
        x.clone(),
        ntrt,
        x.clone(),
        x_axis(),
        trt_axis,
        "<X>",
        vec![],
        true,
    )
    .unwrap();

    let set = f.dump_histograms().unwrap();
    assert_eq!(set.len(), 8);
    for channel in ["MC", "Data"] {
        let n = if channel == "MC" { 100 } else { 80 };
        for name in ["h1", "h2", "p1", "p2"] {
            assert_eq!(set.get(name, channel).unwrap().entries(), n, "{name} [{channel}]");
        }
    }
    let h2 = set.get("h2", "Data").unwrap().as_hist2d().unwrap();
    assert_eq!(h2.integral(), 80.0);
    assert_eq!(h2.flow, 0.0);
}

#[test]
fn mixed_binning_is_fatal() {
    let mut f = filler_over(Arc::new(memory_source()));
    let edges = Axis::edges(vec![0.0, 10.0, 40.0], "nTRT").unwrap();
    let (x, ntrt) = (Variable::branch("X"), variables::n_trt());
    let err =
        f.book_2dhistogram_fill("h2", x, ntrt, x_axis(), edges, "", vec![], true).unwrap_err();
    assert!(matches!(err, FillError::MixedBinSpec(ref n) if n == "h2"));
    assert!(f.specs().is_empty());
}

#[test]
fn duplicate_names_rejected() {
    let mut f = filler_over(Arc::new(memory_source()));
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let (x, ntrt) = (Variable::branch("X"), variables::n_trt());
    let err = f.book_tprofile_fill("X", x, ntrt, x_axis(), "", vec![], true).unwrap_err();
    assert!(matches!(err, FillError::DuplicateRegistration(_)));

    let err = f.create_subchannel_for_channel("Data", "MC", &[]).unwrap_err();
    assert!(matches!(err, FillError::InvalidSubchannel(_)));

    let err = f.add_channel(Channel::new("MC", ["other.parquet"])).unwrap_err();
    assert!(matches!(err, FillError::DuplicateRegistration(_)));
}

#[test]
fn unknown_dataset_aborts_run() {
    let source = MemorySource::new().with_file("mc/user.555555.parquet", tracks(10, 1.0));
    let mut f =
        HistogramFiller::new(Arc::new(source), test_config(), variables::default_weight()).unwrap();
    f.add_channel(Channel::new("MC", ["mc/user.555555.parquet"])).unwrap();
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let err = f.dump_histograms().unwrap_err();
    assert!(matches!(err, FillError::Configuration(ref m) if m.contains("unknown dataset id")));
}

#[test]
fn partitions_and_row_filter_from_config() {
    let config = FillerConfig::from_json_str(
        r#"{
            "row_filter": "trk_nTRT >= 20",
            "retry": {"max_attempts": 1, "delay_secs": 0},
            "partitions": {"Data": {"data/run.parquet": [0, 40]}}
        }"#,
    )
    .unwrap();
    let source = Arc::new(memory_source());
    let mut f = HistogramFiller::new(source, config, variables::default_weight()).unwrap();
    f.add_channel(Channel::new("Data", [DATA_FILE])).unwrap();
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let set = f.dump_histograms().unwrap();
    // Rows 0..40 carry nTRT 0..39; half pass the filter.
    assert_eq!(set.get("X", "Data").unwrap().entries(), 20);
}

struct FlakySource {
    inner: MemorySource,
    failures: u32,
    opens: AtomicU32,
}

impl FlakySource {
    fn new(failures: u32) -> Self {
        Self { inner: memory_source(), failures, opens: AtomicU32::new(0) }
    }
}

impl EventSource for FlakySource {
    fn open(&self, file: &str) -> eop_store::Result<Box<dyn TreeReader + '_>> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(StoreError::Unavailable(format!("storage timeout on {file}")));
        }
        self.inner.open(file)
    }
}

#[test]
fn transient_failures_are_retried() {
    let source = Arc::new(FlakySource::new(2));
    let mut f =
        HistogramFiller::new(source.clone(), test_config(), variables::default_weight()).unwrap();
    f.add_channel(Channel::new("Data", [DATA_FILE])).unwrap();
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let set = f.dump_histograms().unwrap();
    assert_eq!(set.get("X", "Data").unwrap().entries(), 80);
    assert_eq!(source.opens.load(Ordering::SeqCst), 3);
}

#[test]
fn exhausted_retries_are_data_unavailable() {
    let source = Arc::new(FlakySource::new(u32::MAX));
    let config = FillerConfig { retry: RetryPolicy::immediate(50), ..FillerConfig::default() };
    let mut f = HistogramFiller::new(source.clone(), config, variables::default_weight()).unwrap();
    f.add_channel(Channel::new("Data", [DATA_FILE])).unwrap();
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    match f.dump_histograms().unwrap_err() {
        FillError::DataUnavailable { file, attempts, source: last } => {
            assert_eq!(file, DATA_FILE);
            assert_eq!(attempts, 50);
            assert!(last.is_transient());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(source.opens.load(Ordering::SeqCst), 50);
}

struct CountingReader<'a> {
    inner: Box<dyn TreeReader + 'a>,
    live: &'a AtomicU32,
}

impl TreeReader for CountingReader<'_> {
    fn num_entries(&self) -> u64 {
        self.inner.num_entries()
    }

    fn read(&mut self, branches: &[String], range: Range<u64>) -> eop_store::Result<EventBatch> {
        self.inner.read(branches, range)
    }
}

impl Drop for CountingReader<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts opens and the readers currently alive.
#[derive(Default)]
struct CountingSource {
    inner: MemorySource,
    opens: AtomicU32,
    live: AtomicU32,
    peak_live: AtomicU32,
}

impl CountingSource {
    fn new() -> Self {
        Self { inner: memory_source(), ..Self::default() }
    }
}

impl EventSource for CountingSource {
    fn open(&self, file: &str) -> eop_store::Result<Box<dyn TreeReader + '_>> {
        let inner = self.inner.open(file)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(CountingReader { inner, live: &self.live }))
    }
}

#[test]
fn subchannels_reuse_parent_reads() {
    let source = Arc::new(CountingSource::new());
    let mut f =
        HistogramFiller::new(source.clone(), test_config(), variables::default_weight()).unwrap();
    f.add_channel(Channel::new("Data", [DATA_FILE])).unwrap();
    for (name, cut) in [("DataLow", "X < 50"), ("DataHigh", "X >= 50")] {
        let sel = Selection::formula(name, cut).unwrap();
        assert!(f.create_subchannel_for_channel(name, "Data", &[sel]).unwrap());
    }
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let set = f.dump_histograms().unwrap();
    assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    let low = set.get("X", "DataLow").unwrap().entries();
    let high = set.get("X", "DataHigh").unwrap().entries();
    assert_eq!(low + high, set.get("X", "Data").unwrap().entries());
}

#[test]
fn readers_closed_after_each_retrieval() {
    let source = Arc::new(CountingSource::new());
    let mut f = filler_over(source.clone());
    let sel = Selection::formula("LowX", "X < 50").unwrap();
    f.create_subchannel_for_channel("DataLow", "Data", &[sel]).unwrap();
    let x = [Variable::branch("X")];

    for (channel, file) in [("MC", MC_FILE), ("Data", DATA_FILE), ("DataLow", DATA_FILE)] {
        let data = f.get_data(channel, file, &x, &[]).unwrap();
        assert!(!data.is_empty());
        assert_eq!(source.live.load(Ordering::SeqCst), 0, "reader for {channel} left open");
    }

    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    f.dump_histograms().unwrap();
    assert_eq!(source.live.load(Ordering::SeqCst), 0);
    assert_eq!(source.peak_live.load(Ordering::SeqCst), 1);
    assert_eq!(source.opens.load(Ordering::SeqCst), 5);
}

#[test]
fn subchannel_selections_apply_on_top_of_parent() {
    let mut f = filler_over(Arc::new(memory_source()));
    let low_x = Selection::formula("LowX", "X < 50").unwrap();
    f.apply_selection_for_channel("Data", &[low_x]).unwrap();
    let trt = Selection::formula("nTRT20", "trk_nTRT >= 20").unwrap();
    f.create_subchannel_for_channel("DataTRT", "Data", &[trt]).unwrap();
    f.apply_selection_for_channel("DataTRT", &[Selection::formula("Tiny", "X < 10").unwrap()])
        .unwrap();
    f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
    let set = f.dump_histograms().unwrap();
    // Data rows: X = 1.25 * i; X < 50 keeps i < 40.
    assert_eq!(set.get("X", "Data").unwrap().entries(), 40);
    // nTRT = i % 40 >= 20 keeps i in 20..40, all with X >= 25.
    assert_eq!(set.get("X", "DataTRT").unwrap().entries(), 0);
    // The MC channel carries no channel selections.
    assert_eq!(set.get("X", "MC").unwrap().entries(), 100);
}

fn surviving_x(selection_groups: &[Vec<Selection>]) -> Vec<f64> {
    let mut f = filler_over(Arc::new(memory_source()));
    for group in selection_groups {
        f.apply_selection_for_channel("Data", group).unwrap();
    }
    let x = [Variable::branch("X")];
    f.get_data("Data", DATA_FILE, &x, &[]).unwrap().variable("X").unwrap().to_vec()
}

proptest! {
    #[test]
    fn prop_channel_selection_associative(
        a in 0.0f64..100.0,
        b in 0.0f64..40.0,
        c in 0.0f64..100.0,
    ) {
        let sa = Selection::formula("A", &format!("X > {a}")).unwrap();
        let sb = Selection::formula("B", &format!("trk_nTRT >= {b}")).unwrap();
        let sc = Selection::formula("C", &format!("X < {c}")).unwrap();
        let staged = surviving_x(&[vec![sa.clone(), sb.clone()], vec![sc.clone()]]);
        let at_once = surviving_x(&[vec![sa, sb, sc]]);
        prop_assert_eq!(staged, at_once);
    }

    #[test]
    fn prop_subchannel_never_grows(cut in -10.0f64..110.0) {
        let mut f = filler_over(Arc::new(memory_source()));
        let sel = Selection::formula("Cut", &format!("X > {cut}")).unwrap();
        f.create_subchannel_for_channel("MCCut", "MC", &[sel]).unwrap();
        f.book_histogram_fill("X", Variable::branch("X"), x_axis(), vec![], true).unwrap();
        let set = f.dump_histograms().unwrap();
        let (cut, parent) = (set.get("X", "MCCut").unwrap(), set.get("X", "MC").unwrap());
        prop_assert!(cut.entries() <= parent.entries());
    }
}
