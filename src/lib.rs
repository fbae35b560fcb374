//! goes-rgb: A Fast, Modular GOES-R ABI Processor
//!
//! This library turns per-channel ABI radiance into calibrated brightness
//! temperature and reflectance, colorized single-channel imagery and
//! multi-channel RGB composites, all registered to one geostationary
//! projection shared across channels of differing native resolution.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    CalibrationConstants, ChannelClass, ChannelCode, ChannelRecord, CoordinateData, DataLevel,
    DomainType, GoesError, GoesResult, ProjectionMetadata, RawPixels,
};

pub use config::ProcessingConfig;
pub use io::{ChannelSource, InMemorySource, SceneDescriptor};

pub use crate::core::{
    ChannelStore, CompositingEngine, Orchestrator, ProcessingPath, ProcessingSummary,
    RgbProductKind, SceneOutput,
};
