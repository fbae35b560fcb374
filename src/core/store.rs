//! Per-run channel store

use crate::core::calibrate::CalibratedChannel;
use crate::core::enhance::EnhancedChannel;
use crate::core::projection::ProjectionAuthority;
use crate::core::resample::ResolutionRequirement;
use crate::core::solar::SolarAngleGrid;
use crate::types::{
    CalibratedImage, ChannelClass, ChannelCode, CoordinateData, DataLevel, GeoTransform, GoesError,
    GoesResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Descriptive metadata kept next to each stored channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub code: ChannelCode,
    pub class: ChannelClass,
    pub band_id: u8,
    pub data_level: DataLevel,
    pub native_shape: (usize, usize),
    pub shape: (usize, usize),
    pub requirement: ResolutionRequirement,
    pub time_coverage_start: DateTime<Utc>,
    pub time_coverage_end: Option<DateTime<Utc>>,
    pub orbital_slot: String,
    pub source: Option<PathBuf>,
    /// Filled in once every channel has been processed
    pub geotransform: Option<GeoTransform>,
    pub processing_time_s: f64,
    pub calibrated_bytes: usize,
    pub enhanced_bytes: usize,
    /// Stored in compact form (f32 calibrated, u8 enhanced)
    pub compressed: bool,
}

/// Calibrated + enhanced data and metadata for one channel
#[derive(Debug, Clone)]
pub struct StoredChannel {
    pub calibrated: CalibratedChannel,
    pub enhanced: EnhancedChannel,
    pub metadata: ChannelMetadata,
}

impl StoredChannel {
    pub fn size_bytes(&self) -> usize {
        self.metadata.calibrated_bytes + self.metadata.enhanced_bytes
    }
}

/// Aggregate view of the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSummary {
    pub channel_count: usize,
    pub ir_channels: usize,
    pub visible_channels: usize,
    pub total_size_mb: f64,
    pub average_processing_time_s: f64,
    pub has_solar_angles: bool,
}

/// Append-only mapping from channel code to processed data
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: BTreeMap<ChannelCode, StoredChannel>,
    coordinates: Option<CoordinateData>,
    coordinate_channel: Option<ChannelCode>,
    solar: Option<SolarAngleGrid>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a processed channel; each code may be written once
    pub fn insert(&mut self, channel: StoredChannel) -> GoesResult<()> {
        let code = channel.metadata.code;
        if self.channels.contains_key(&code) {
            return Err(GoesError::DuplicateChannel(code));
        }
        log::debug!(
            "Stored {} ({:.2} MB)",
            code,
            channel.size_bytes() as f64 / BYTES_PER_MB
        );
        self.channels.insert(code, channel);
        Ok(())
    }

    pub fn get(&self, code: ChannelCode) -> Option<&StoredChannel> {
        self.channels.get(&code)
    }

    pub fn calibrated(&self, code: ChannelCode) -> Option<&CalibratedImage> {
        self.channels.get(&code).map(|c| &c.calibrated.data)
    }

    pub fn enhanced(&self, code: ChannelCode) -> Option<&EnhancedChannel> {
        self.channels.get(&code).map(|c| &c.enhanced)
    }

    pub fn contains(&self, code: ChannelCode) -> bool {
        self.channels.contains_key(&code)
    }

    /// Codes from `required` that are not stored, in the given order
    pub fn missing(&self, required: &[ChannelCode]) -> Vec<ChannelCode> {
        required.iter().copied().filter(|c| !self.contains(*c)).collect()
    }

    pub fn codes(&self) -> Vec<ChannelCode> {
        self.channels.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelCode, &StoredChannel)> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Keep the first coordinate context offered
    pub fn capture_coordinates(&mut self, code: ChannelCode, coordinates: CoordinateData) {
        if self.coordinates.is_none() {
            log::debug!("Coordinate context captured from {}", code);
            self.coordinates = Some(coordinates);
            self.coordinate_channel = Some(code);
        }
    }

    pub fn coordinates(&self) -> Option<&CoordinateData> {
        self.coordinates.as_ref()
    }

    pub fn coordinate_channel(&self) -> Option<ChannelCode> {
        self.coordinate_channel
    }

    pub fn set_solar_angles(&mut self, grid: SolarAngleGrid) {
        self.solar = Some(grid);
    }

    pub fn solar_angles(&self) -> Option<&SolarAngleGrid> {
        self.solar.as_ref()
    }

    /// Derive each channel's geotransform from its final dimensions
    pub fn assign_geotransforms(&mut self, authority: &ProjectionAuthority) -> GoesResult<usize> {
        let mut assigned = 0;
        for stored in self.channels.values_mut() {
            let (rows, cols) = stored.metadata.shape;
            stored.metadata.geotransform = Some(authority.geotransform_for(cols, rows)?);
            assigned += 1;
        }
        Ok(assigned)
    }

    /// Shape shared by the most channels, ties broken by larger area
    pub fn dominant_shape(&self) -> Option<(usize, usize)> {
        let mut counts: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for stored in self.channels.values() {
            *counts.entry(stored.metadata.shape).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by_key(|((r, c), n)| (*n, r * c))
            .map(|(shape, _)| shape)
    }

    pub fn total_size_bytes(&self) -> usize {
        let channels: usize = self.channels.values().map(|c| c.size_bytes()).sum();
        channels + self.solar.as_ref().map_or(0, |s| s.size_bytes())
    }

    pub fn summary(&self) -> StoreSummary {
        let count = self.channels.len();
        let ir = self
            .channels
            .values()
            .filter(|c| c.metadata.class == ChannelClass::Ir)
            .count();
        let total_time: f64 = self.channels.values().map(|c| c.metadata.processing_time_s).sum();

        StoreSummary {
            channel_count: count,
            ir_channels: ir,
            visible_channels: count - ir,
            total_size_mb: self.total_size_bytes() as f64 / BYTES_PER_MB,
            average_processing_time_s: if count > 0 { total_time / count as f64 } else { 0.0 },
            has_solar_angles: self.solar.is_some(),
        }
    }
}
