//! Channel record sources
//!
//! File-format decoding (NetCDF/HDF) lives outside this crate. A decoder only
//! has to implement [`ChannelSource`] and hand back typed [`ChannelRecord`]s.

use crate::types::{ChannelCode, ChannelRecord, DataLevel, GoesError, GoesResult};
use std::collections::{BTreeMap, HashMap};

/// What the source knows about the scene before any channel is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneDescriptor {
    pub data_level: DataLevel,
    /// A scene summary / pre-composited multi-channel product is available
    pub has_summary: bool,
}

impl Default for SceneDescriptor {
    fn default() -> Self {
        Self {
            data_level: DataLevel::Level1b,
            has_summary: false,
        }
    }
}

/// Provider of raw per-channel records
pub trait ChannelSource: Send + Sync {
    fn scene(&self) -> SceneDescriptor;

    /// Channels this source can load, in band order
    fn available_channels(&self) -> Vec<ChannelCode>;

    fn load(&self, code: ChannelCode) -> GoesResult<ChannelRecord>;
}

/// Source backed by records that were decoded elsewhere
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    scene: SceneDescriptor,
    records: BTreeMap<ChannelCode, ChannelRecord>,
    unreadable: HashMap<ChannelCode, String>,
}

impl InMemorySource {
    pub fn new(scene: SceneDescriptor) -> Self {
        Self {
            scene,
            records: BTreeMap::new(),
            unreadable: HashMap::new(),
        }
    }

    /// Add a record; a later record for the same code replaces the earlier one
    pub fn insert(&mut self, record: ChannelRecord) {
        self.records.insert(record.code, record);
    }

    pub fn with_record(mut self, record: ChannelRecord) -> Self {
        self.insert(record);
        self
    }

    /// Advertise a channel whose load always fails
    pub fn with_unreadable(mut self, code: ChannelCode, reason: &str) -> Self {
        self.unreadable.insert(code, reason.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ChannelRecord> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = ChannelRecord>>(iter: I) -> Self {
        let mut source = InMemorySource::default();
        for record in iter {
            source.insert(record);
        }
        source
    }
}

impl ChannelSource for InMemorySource {
    fn scene(&self) -> SceneDescriptor {
        self.scene
    }

    fn available_channels(&self) -> Vec<ChannelCode> {
        let mut codes: Vec<ChannelCode> = self
            .records
            .keys()
            .chain(self.unreadable.keys())
            .copied()
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    fn load(&self, code: ChannelCode) -> GoesResult<ChannelRecord> {
        if let Some(reason) = self.unreadable.get(&code) {
            return Err(GoesError::LoadFailure {
                channel: code,
                reason: reason.clone(),
            });
        }
        let record = self.records.get(&code).ok_or_else(|| GoesError::LoadFailure {
            channel: code,
            reason: "channel not present in source".to_string(),
        })?;
        if record.native_shape().0 == 0 || record.native_shape().1 == 0 {
            return Err(GoesError::LoadFailure {
                channel: code,
                reason: "empty pixel array".to_string(),
            });
        }
        Ok(record.clone())
    }
}
