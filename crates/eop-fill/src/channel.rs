//! Channel and subchannel registry.
//!
//! A channel is one physics sample backed by an ordered list of files. A
//! subchannel reuses its parent's files and rows but keeps only the rows
//! passing extra selections. Channel-level selections gate every histogram
//! filled from that channel.

use std::collections::HashMap;

use crate::calculation::Selection;
use crate::error::{FillError, Result};

/// Contiguous row range `start..end` read from one backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// First row.
    pub start: u64,
    /// One past the last row.
    pub end: u64,
}

impl Partition {
    /// Create a partition; `start` must not exceed `end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(FillError::InvalidPartition { file: String::new(), start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of rows covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the partition covers no rows.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One top-level data source.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel name.
    pub name: String,
    /// Backing file ids, in read order.
    pub files: Vec<String>,
    /// Optional row range per file; files without one are read in full.
    pub partitions: HashMap<String, Partition>,
}

impl Channel {
    /// Create a channel over `files`.
    pub fn new<I, S>(name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            files: files.into_iter().map(Into::into).collect(),
            partitions: HashMap::new(),
        }
    }

    /// Restrict `file` to rows `start..end`.
    pub fn with_partition(mut self, file: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let file = file.into();
        let partition = Partition::new(start, end)
            .map_err(|_| FillError::InvalidPartition { file: file.clone(), start, end })?;
        self.partitions.insert(file, partition);
        Ok(self)
    }

    /// Configured partition for `file`, if any.
    pub fn partition(&self, file: &str) -> Option<Partition> {
        self.partitions.get(file).copied()
    }
}

/// A channel derived from a parent by additional row selections.
#[derive(Debug, Clone)]
pub struct Subchannel {
    /// Subchannel name.
    pub name: String,
    /// Name of the top-level channel whose rows are re-sliced.
    pub parent: String,
    /// Extra selections applied on top of the parent's rows.
    pub selections: Vec<Selection>,
}

/// Registry of channels, subchannels and channel-level selections.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    subchannels: Vec<Subchannel>,
    channel_selections: HashMap<String, Vec<Selection>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a top-level channel.
    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        if self.contains(&channel.name) {
            return Err(FillError::DuplicateRegistration(format!("channel '{}'", channel.name)));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Whether `name` is a channel or subchannel.
    pub fn contains(&self, name: &str) -> bool {
        self.channel(name).is_some() || self.subchannel(name).is_some()
    }

    /// Look up a top-level channel.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Look up a subchannel.
    pub fn subchannel(&self, name: &str) -> Option<&Subchannel> {
        self.subchannels.iter().find(|s| s.name == name)
    }

    /// Top-level channels in registration order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Subchannels in registration order.
    pub fn subchannels(&self) -> &[Subchannel] {
        &self.subchannels
    }

    /// Every channel name (top-level first, then subchannels), in registration order.
    pub fn all_names(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.subchannels.iter().map(|s| s.name.as_str()))
            .collect()
    }

    /// Backing files of a channel; a subchannel shares its parent's files.
    pub fn files(&self, name: &str) -> Result<&[String]> {
        if let Some(c) = self.channel(name) {
            return Ok(&c.files);
        }
        let sub = self.subchannel(name).ok_or_else(|| FillError::UnknownChannel(name.into()))?;
        self.files(&sub.parent)
    }

    /// Append `selections` to `channel`'s selection list.
    ///
    /// A selection whose name is already registered for the channel is
    /// skipped.
    pub fn apply_selection(&mut self, channel: &str, selections: &[Selection]) -> Result<()> {
        if !self.contains(channel) {
            return Err(FillError::UnknownChannel(channel.into()));
        }
        let list = self.channel_selections.entry(channel.to_string()).or_default();
        for sel in selections {
            if list.iter().all(|s| s.name() != sel.name()) {
                list.push(sel.clone());
            }
        }
        Ok(())
    }

    /// Selections registered for `channel` (empty if none).
    pub fn selections_for(&self, channel: &str) -> &[Selection] {
        self.channel_selections.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Register subchannel `name` deriving from `parent`.
    ///
    /// A name that collides with an existing channel or subchannel fails with
    /// [`FillError::InvalidSubchannel`]. An unknown parent is the one lenient
    /// case in the pipeline: it is logged as a warning, nothing is registered,
    /// and `Ok(false)` is returned so a whole run is not lost to one bad entry.
    pub fn create_subchannel(
        &mut self,
        name: &str,
        parent: &str,
        selections: &[Selection],
    ) -> Result<bool> {
        if self.contains(name) {
            return Err(FillError::InvalidSubchannel(format!(
                "'{name}' collides with an existing channel"
            )));
        }
        if self.channel(parent).is_none() {
            log::warn!("couldn't find the channel '{parent}' for subchannel '{name}'; skipping it");
            return Ok(false);
        }
        self.subchannels.push(Subchannel {
            name: name.to_string(),
            parent: parent.to_string(),
            selections: selections.to_vec(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        let mut r = ChannelRegistry::new();
        r.add_channel(Channel::new("PythiaJetJet", ["mc/361020.parquet", "mc/361021.parquet"]))
            .unwrap();
        r.add_channel(Channel::new("LowMuData", ["data/data17_lowmu.parquet"])).unwrap();
        r
    }

    #[test]
    fn duplicate_channel_rejected() {
        let mut r = registry();
        let err = r.add_channel(Channel::new("LowMuData", ["x"])).unwrap_err();
        assert!(matches!(err, FillError::DuplicateRegistration(_)));
    }

    #[test]
    fn subchannel_shares_parent_files() {
        let mut r = registry();
        let sel = Selection::formula("PBin", "trk_p > 2 && trk_p < 3").unwrap();
        assert!(r.create_subchannel("PythiaJetJetPBin", "PythiaJetJet", &[sel]).unwrap());
        assert_eq!(r.files("PythiaJetJetPBin").unwrap(), r.files("PythiaJetJet").unwrap());
        assert_eq!(r.all_names(), vec!["PythiaJetJet", "LowMuData", "PythiaJetJetPBin"]);
    }

    #[test]
    fn subchannel_name_collision() {
        let mut r = registry();
        let err = r.create_subchannel("LowMuData", "PythiaJetJet", &[]).unwrap_err();
        assert!(matches!(err, FillError::InvalidSubchannel(_)));

        r.create_subchannel("Sub", "PythiaJetJet", &[]).unwrap();
        let err = r.create_subchannel("Sub", "LowMuData", &[]).unwrap_err();
        assert!(matches!(err, FillError::InvalidSubchannel(_)));
    }

    #[test]
    fn unknown_parent_skipped() {
        let mut r = registry();
        assert!(!r.create_subchannel("Orphan", "Herwig", &[]).unwrap());
        assert!(!r.contains("Orphan"));
        assert!(r.subchannels().is_empty());
    }

    #[test]
    fn subchannel_of_subchannel_is_skipped() {
        let mut r = registry();
        r.create_subchannel("Sub", "PythiaJetJet", &[]).unwrap();
        assert!(!r.create_subchannel("SubSub", "Sub", &[]).unwrap());
    }

    #[test]
    fn channel_selections_idempotent_by_name() {
        let mut r = registry();
        let a = Selection::formula("NonZeroEnergy", "trk_ClusterEnergy_EM_200 > 0").unwrap();
        let b = Selection::formula("nTRT", "trk_nTRT >= 20").unwrap();
        r.apply_selection("LowMuData", &[a.clone(), b]).unwrap();
        r.apply_selection("LowMuData", &[a]).unwrap();
        let names: Vec<&str> = r.selections_for("LowMuData").iter().map(Selection::name).collect();
        assert_eq!(names, vec!["NonZeroEnergy", "nTRT"]);
        assert!(r.selections_for("PythiaJetJet").is_empty());
        assert!(matches!(r.apply_selection("Nope", &[]), Err(FillError::UnknownChannel(_))));
    }

    #[test]
    fn partitions() {
        let c = Channel::new("LowMuData", ["data.parquet"])
            .with_partition("data.parquet", 10, 20)
            .unwrap();
        assert_eq!(c.partition("data.parquet"), Some(Partition { start: 10, end: 20 }));
        assert_eq!(c.partition("other.parquet"), None);
        let err = Channel::new("X", ["f"]).with_partition("f", 5, 1).unwrap_err();
        assert!(matches!(err, FillError::InvalidPartition { start: 5, end: 1, .. }));
    }
}
