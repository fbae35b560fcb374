//! Core GOES ABI processing modules

pub mod calibrate;
pub mod composite;
pub mod enhance;
pub mod orchestrator;
pub mod projection;
pub mod render;
pub mod resample;
pub mod rgb_formulas;
pub mod solar;
pub mod store;

// Re-export main types
pub use calibrate::{CalibratedChannel, CalibrationEngine};
pub use composite::{CompositingEngine, RgbProduct, RgbProductSet};
pub use enhance::{CombinedLut, EnhancedChannel, EnhancementEngine};
pub use orchestrator::{select_path, Orchestrator, ProcessingPath, ProcessingSummary, SceneOutput};
pub use projection::{ProjectionAuthority, ProjectionContext, ResolutionClass};
pub use resample::{ResamplingEngine, ResolutionRequirement};
pub use rgb_formulas::{compose, CompositeInputs, ProductCategory, RgbProductKind, RgbRecipe};
pub use solar::{SolarAngleGrid, SolarGeometryEngine, SolarMethod};
pub use store::{ChannelMetadata, ChannelStore, StoreSummary, StoredChannel};
