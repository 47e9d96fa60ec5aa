//! Histogram booking and the channel-by-channel filling pass.
//!
//! Bookings are recorded as [`FillSpec`] values; nothing is read until
//! [`HistogramFiller::dump_histograms`]. Each top-level channel's files are
//! read once, gated by the channel selections, and shared by every booked
//! histogram. Subchannels are filled afterwards from their parent's rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eop_store::EventSource;

use crate::binning::Axis;
use crate::calculation::{Calculation, Selection, Variable, WeightCalculation};
use crate::channel::{Channel, ChannelRegistry};
use crate::config::FillerConfig;
use crate::error::{FillError, Result};
use crate::fill_spec::{FillKind, FillSpec};
use crate::histogram::HistogramSet;
use crate::retriever::{DataRetriever, RetrievedData};

/// Registry of channels and booked histograms, and the driver that fills them.
pub struct HistogramFiller {
    config: FillerConfig,
    registry: ChannelRegistry,
    retriever: DataRetriever,
    specs: Vec<FillSpec>,
    variables: Vec<Variable>,
    selections: Vec<Selection>,
}

impl HistogramFiller {
    /// Create a filler reading from `source`, weighting rows with `weight`.
    pub fn new(
        source: Arc<dyn EventSource>,
        config: FillerConfig,
        weight: WeightCalculation,
    ) -> Result<Self> {
        config.validate()?;
        let retriever = DataRetriever::new(source, weight, config.normalizer())
            .with_row_filter(config.row_filter_formula()?)
            .with_retry(config.retry);
        Ok(Self {
            config,
            registry: ChannelRegistry::new(),
            retriever,
            specs: Vec::new(),
            variables: Vec::new(),
            selections: Vec::new(),
        })
    }

    /// Register a top-level channel, attaching any configured partitions.
    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        let channel = self.config.apply_partitions(channel)?;
        log::debug!("registered channel {} with {} file(s)", channel.name, channel.files.len());
        self.registry.add_channel(channel)
    }

    /// Channel registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Booked fill specs, in booking order.
    pub fn specs(&self) -> &[FillSpec] {
        &self.specs
    }

    /// Every variable referenced by a booking, deduplicated by name.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Every selection referenced by a booking or channel, deduplicated by name.
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Gate every histogram of `channel` by `selections`.
    pub fn apply_selection_for_channel(
        &mut self,
        channel: &str,
        selections: &[Selection],
    ) -> Result<()> {
        self.registry.apply_selection(channel, selections)?;
        for sel in selections {
            catalog(&mut self.selections, sel);
        }
        Ok(())
    }

    /// Derive subchannel `name` from `parent` by extra `selections`.
    ///
    /// Returns `Ok(false)` (after a warning) when `parent` is not a top-level
    /// channel; a name collision is an error.
    pub fn create_subchannel_for_channel(
        &mut self,
        name: &str,
        parent: &str,
        selections: &[Selection],
    ) -> Result<bool> {
        let created = self.registry.create_subchannel(name, parent, selections)?;
        if created {
            for sel in selections {
                catalog(&mut self.selections, sel);
            }
        }
        Ok(created)
    }

    /// Book a fill spec; its name must be new.
    pub fn book(&mut self, spec: FillSpec) -> Result<()> {
        if self.specs.iter().any(|s| s.name == spec.name) {
            return Err(FillError::DuplicateRegistration(format!("histogram '{}'", spec.name)));
        }
        for v in spec.variables() {
            catalog(&mut self.variables, v);
        }
        for s in &spec.selections {
            catalog(&mut self.selections, s);
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Book a 1D histogram of `x`.
    pub fn book_histogram_fill(
        &mut self,
        name: &str,
        x: Variable,
        axis: Axis,
        selections: Vec<Selection>,
        use_weights: bool,
    ) -> Result<()> {
        self.book(FillSpec::new(name, FillKind::Hist1D { x, axis }, selections, use_weights)?)
    }

    /// Book a 2D histogram of `(x, y)`. Both axes must use the same binning style.
    #[allow(clippy::too_many_arguments)]
    pub fn book_2dhistogram_fill(
        &mut self,
        name: &str,
        x: Variable,
        y: Variable,
        x_axis: Axis,
        y_axis: Axis,
        z_title: &str,
        selections: Vec<Selection>,
        use_weights: bool,
    ) -> Result<()> {
        let kind = FillKind::Hist2D { x, y, x_axis, y_axis, z_title: z_title.to_string() };
        self.book(FillSpec::new(name, kind, selections, use_weights)?)
    }

    /// Book a profile of `y` against `x`.
    #[allow(clippy::too_many_arguments)]
    pub fn book_tprofile_fill(
        &mut self,
        name: &str,
        x: Variable,
        y: Variable,
        axis: Axis,
        y_title: &str,
        selections: Vec<Selection>,
        use_weights: bool,
    ) -> Result<()> {
        let kind = FillKind::Profile1D { x, y, axis, y_title: y_title.to_string() };
        self.book(FillSpec::new(name, kind, selections, use_weights)?)
    }

    /// Book a profile of `z` against `(x, y)`. Both axes must use the same binning style.
    #[allow(clippy::too_many_arguments)]
    pub fn book_tprofile2d_fill(
        &mut self,
        name: &str,
        x: Variable,
        y: Variable,
        z: Variable,
        x_axis: Axis,
        y_axis: Axis,
        z_title: &str,
        selections: Vec<Selection>,
        use_weights: bool,
    ) -> Result<()> {
        let kind = FillKind::Profile2D { x, y, z, x_axis, y_axis, z_title: z_title.to_string() };
        self.book(FillSpec::new(name, kind, selections, use_weights)?)
    }

    /// Read `file` of `channel` and keep only rows passing the channel selections.
    ///
    /// For a subchannel, the parent's file is read and both the parent's and
    /// the subchannel's selections are applied.
    pub fn get_data(
        &self,
        channel: &str,
        file: &str,
        variables: &[Variable],
        selections: &[Selection],
    ) -> Result<RetrievedData> {
        let (top, gate) = match self.registry.subchannel(channel) {
            Some(sub) => {
                let mut gate = self.registry.selections_for(&sub.parent).to_vec();
                gate.extend(sub.selections.iter().cloned());
                gate.extend(self.registry.selections_for(channel).iter().cloned());
                (sub.parent.as_str(), gate)
            }
            None => (channel, self.registry.selections_for(channel).to_vec()),
        };
        let top_channel =
            self.registry.channel(top).ok_or_else(|| FillError::UnknownChannel(top.into()))?;

        let mut wanted = selections.to_vec();
        for sel in &gate {
            catalog(&mut wanted, sel);
        }
        let partition = top_channel.partition(file);
        let data = self.retriever.retrieve(top, file, partition, variables, &wanted)?;
        let mask = data.conjunction(gate.iter().map(Selection::name))?;
        let kept = data.prune(&mask)?;
        log::debug!(
            "channel {channel}: {} of {} rows in {file} pass the channel selections",
            kept.len(),
            data.len()
        );
        Ok(kept)
    }

    /// Fill every booked histogram for every channel and subchannel.
    ///
    /// Top-level channels are read first. Subchannels are then re-sliced
    /// from their parent's rows, so no file is read twice.
    pub fn dump_histograms(&self) -> Result<HistogramSet> {
        let mut out = HistogramSet::new();
        let parents: HashSet<&str> =
            self.registry.subchannels().iter().map(|s| s.parent.as_str()).collect();
        let mut retained: HashMap<&str, Vec<RetrievedData>> = HashMap::new();

        for channel in self.registry.channels() {
            log::info!("reading channel {} ({} file(s))", channel.name, channel.files.len());
            let mut per_file = Vec::with_capacity(channel.files.len());
            for file in &channel.files {
                let data = self.get_data(&channel.name, file, &self.variables, &self.selections)?;
                per_file.push(data);
            }
            self.fill_channel(&channel.name, &per_file, &mut out)?;
            if parents.contains(channel.name.as_str()) {
                retained.insert(channel.name.as_str(), per_file);
            }
        }

        for sub in self.registry.subchannels() {
            let parent = retained
                .get(sub.parent.as_str())
                .ok_or_else(|| FillError::UnknownChannel(sub.parent.clone()))?;
            let names: Vec<&str> = sub
                .selections
                .iter()
                .chain(self.registry.selections_for(&sub.name))
                .map(Selection::name)
                .collect();
            let mut sliced = Vec::with_capacity(parent.len());
            for data in parent {
                let kept = data.prune(&data.conjunction(names.iter().copied())?)?;
                log::debug!(
                    "subchannel {}: kept {} of {} parent rows",
                    sub.name,
                    kept.len(),
                    data.len()
                );
                sliced.push(kept);
            }
            log::info!("filling subchannel {} from {}", sub.name, sub.parent);
            self.fill_channel(&sub.name, &sliced, &mut out)?;
        }
        Ok(out)
    }

    fn fill_channel(
        &self,
        channel: &str,
        per_file: &[RetrievedData],
        out: &mut HistogramSet,
    ) -> Result<()> {
        for spec in &self.specs {
            let mut hist = spec.empty_histogram();
            let mut filled = 0;
            for data in per_file {
                filled += spec.fill(&mut hist, data)?;
            }
            log::debug!("{} [{channel}]: {filled} entries", spec.name);
            out.insert(channel, hist);
        }
        Ok(())
    }
}

fn catalog<T>(list: &mut Vec<Calculation<T>>, calc: &Calculation<T>) {
    if list.iter().all(|c| c.name() != calc.name()) {
        list.push(calc.clone());
    }
}
