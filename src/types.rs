use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Calibrated single-channel raster (kelvin for IR, reflectance for visible)
pub type CalibratedImage = Array2<f32>;

/// 8-bit single-band intensity raster
pub type GrayImage = Array2<u8>;

/// 8-bit color raster (row x col x band)
pub type RgbImage = Array3<u8>;

/// ABI spectral channel, bands 1 through 16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelCode(u8);

impl ChannelCode {
    pub const C01: ChannelCode = ChannelCode(1);
    pub const C02: ChannelCode = ChannelCode(2);
    pub const C03: ChannelCode = ChannelCode(3);
    pub const C04: ChannelCode = ChannelCode(4);
    pub const C05: ChannelCode = ChannelCode(5);
    pub const C06: ChannelCode = ChannelCode(6);
    pub const C07: ChannelCode = ChannelCode(7);
    pub const C08: ChannelCode = ChannelCode(8);
    pub const C09: ChannelCode = ChannelCode(9);
    pub const C10: ChannelCode = ChannelCode(10);
    pub const C11: ChannelCode = ChannelCode(11);
    pub const C12: ChannelCode = ChannelCode(12);
    pub const C13: ChannelCode = ChannelCode(13);
    pub const C14: ChannelCode = ChannelCode(14);
    pub const C15: ChannelCode = ChannelCode(15);
    pub const C16: ChannelCode = ChannelCode(16);

    pub const BAND_COUNT: u8 = 16;

    /// Build a channel code from a band number (1..=16)
    pub fn new(band: u8) -> GoesResult<Self> {
        if (1..=Self::BAND_COUNT).contains(&band) {
            Ok(ChannelCode(band))
        } else {
            Err(GoesError::UnknownChannel(format!("band {}", band)))
        }
    }

    pub fn band(self) -> u8 {
        self.0
    }

    /// Bands 7 and above are emissive
    pub fn class(self) -> ChannelClass {
        if self.0 >= 7 {
            ChannelClass::Ir
        } else {
            ChannelClass::Visible
        }
    }

    pub fn family(self) -> ChannelFamily {
        match self.0 {
            7 => ChannelFamily::ShortwaveIr,
            8..=10 => ChannelFamily::WaterVapor,
            11..=16 => ChannelFamily::LongwaveWindow,
            _ => ChannelFamily::Unclassified,
        }
    }

    /// All sixteen channels in band order
    pub fn all() -> impl Iterator<Item = ChannelCode> {
        (1..=Self::BAND_COUNT).map(ChannelCode)
    }
}

impl fmt::Display for ChannelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{:02}", self.0)
    }
}

impl FromStr for ChannelCode {
    type Err = GoesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('C')
            .or_else(|| trimmed.strip_prefix('c'))
            .ok_or_else(|| GoesError::UnknownChannel(s.to_string()))?;
        let band: u8 = digits
            .parse()
            .map_err(|_| GoesError::UnknownChannel(s.to_string()))?;
        ChannelCode::new(band).map_err(|_| GoesError::UnknownChannel(s.to_string()))
    }
}

impl TryFrom<String> for ChannelCode {
    type Error = GoesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelCode> for String {
    fn from(code: ChannelCode) -> Self {
        code.to_string()
    }
}

/// Radiometric class of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelClass {
    Ir,
    Visible,
}

impl fmt::Display for ChannelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelClass::Ir => write!(f, "ir"),
            ChannelClass::Visible => write!(f, "visible"),
        }
    }
}

/// Channels sharing one enhancement curve and color table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFamily {
    ShortwaveIr,
    WaterVapor,
    LongwaveWindow,
    Unclassified,
}

/// Product processing level of the source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLevel {
    Level1b,
    Level2,
}

/// ABI scan sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    Conus,
    FullDisk,
    Mesoscale,
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainType::Conus => write!(f, "conus"),
            DomainType::FullDisk => write!(f, "full_disk"),
            DomainType::Mesoscale => write!(f, "mesoscale"),
        }
    }
}

impl FromStr for DomainType {
    type Err = GoesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conus" => Ok(DomainType::Conus),
            "full_disk" | "fulldisk" => Ok(DomainType::FullDisk),
            "mesoscale" => Ok(DomainType::Mesoscale),
            other => Err(GoesError::Configuration(format!("unknown domain type '{}'", other))),
        }
    }
}

/// Fixed-grid sweep angle axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    X,
    Y,
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAxis::X => write!(f, "x"),
            SweepAxis::Y => write!(f, "y"),
        }
    }
}

/// Geostationary projection parameters as carried in the ABI fixed-grid metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMetadata {
    pub longitude_of_projection_origin: f64, // degrees east
    pub perspective_point_height: f64,       // meters above the ellipsoid
    pub semi_major_axis: f64,                // meters
    pub semi_minor_axis: f64,                // meters
    pub inverse_flattening: f64,
    pub sweep_angle_axis: SweepAxis,
}

impl Default for ProjectionMetadata {
    /// GOES-East operational fixed grid
    fn default() -> Self {
        Self {
            longitude_of_projection_origin: -75.0,
            perspective_point_height: 35_786_023.0,
            semi_major_axis: 6_378_137.0,
            semi_minor_axis: 6_356_752.314_14,
            inverse_flattening: 298.257_222_2,
            sweep_angle_axis: SweepAxis::X,
        }
    }
}

/// Scan-angle coordinates (radians) of the reference channel
#[derive(Debug, Clone)]
pub struct CoordinateData {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub projection: ProjectionMetadata,
}

/// Calibration constants as read from the source file; any of them may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConstants {
    pub planck_fk1: Option<f64>,
    pub planck_fk2: Option<f64>,
    pub planck_bc1: Option<f64>,
    pub planck_bc2: Option<f64>,
    pub kappa0: Option<f64>,
}

impl CalibrationConstants {
    /// Full Planck set, only when all four coefficients are present
    pub fn planck(&self) -> Option<PlanckConstants> {
        match (self.planck_fk1, self.planck_fk2, self.planck_bc1, self.planck_bc2) {
            (Some(fk1), Some(fk2), Some(bc1), Some(bc2)) => Some(PlanckConstants { fk1, fk2, bc1, bc2 }),
            _ => None,
        }
    }

    pub fn with_planck(planck: PlanckConstants) -> Self {
        Self {
            planck_fk1: Some(planck.fk1),
            planck_fk2: Some(planck.fk2),
            planck_bc1: Some(planck.bc1),
            planck_bc2: Some(planck.bc2),
            kappa0: None,
        }
    }

    pub fn with_kappa0(kappa0: f64) -> Self {
        Self {
            kappa0: Some(kappa0),
            ..Self::default()
        }
    }
}

/// Planck function coefficients for one emissive band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanckConstants {
    pub fk1: f64,
    pub fk2: f64,
    pub bc1: f64,
    pub bc2: f64,
}

/// Pixel payload of a loaded channel
#[derive(Debug, Clone)]
pub enum RawPixels {
    /// Level-1b spectral radiance
    Radiance(Array2<f32>),
    /// Already calibrated values (kelvin or reflectance), e.g. level-2 CMI
    Calibrated(Array2<f32>),
}

impl RawPixels {
    pub fn array(&self) -> &Array2<f32> {
        match self {
            RawPixels::Radiance(a) | RawPixels::Calibrated(a) => a,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.array().dim()
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, RawPixels::Calibrated(_))
    }

    /// Same variant wrapping a different array
    pub fn map_array(&self, array: Array2<f32>) -> RawPixels {
        match self {
            RawPixels::Radiance(_) => RawPixels::Radiance(array),
            RawPixels::Calibrated(_) => RawPixels::Calibrated(array),
        }
    }
}

/// One loaded channel, immutable once handed to the orchestrator
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub code: ChannelCode,
    pub class: ChannelClass,
    pub data: RawPixels,
    pub calibration: CalibrationConstants,
    /// Present on the reference channel only
    pub coordinates: Option<CoordinateData>,
    pub time_coverage_start: DateTime<Utc>,
    pub time_coverage_end: Option<DateTime<Utc>>,
    pub orbital_slot: String,
    pub data_level: DataLevel,
    pub source: Option<PathBuf>,
}

impl ChannelRecord {
    /// Level-1b radiance record with no constants or coordinates attached
    pub fn radiance(code: ChannelCode, radiance: Array2<f32>, start: DateTime<Utc>) -> Self {
        Self {
            code,
            class: code.class(),
            data: RawPixels::Radiance(radiance),
            calibration: CalibrationConstants::default(),
            coordinates: None,
            time_coverage_start: start,
            time_coverage_end: None,
            orbital_slot: "GOES-East".to_string(),
            data_level: DataLevel::Level1b,
            source: None,
        }
    }

    /// Level-2 record carrying calibrated values
    pub fn calibrated(code: ChannelCode, values: Array2<f32>, start: DateTime<Utc>) -> Self {
        Self {
            data: RawPixels::Calibrated(values),
            data_level: DataLevel::Level2,
            ..Self::radiance(code, Array2::zeros((0, 0)), start)
        }
    }

    pub fn with_calibration(mut self, calibration: CalibrationConstants) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_coordinates(mut self, coordinates: CoordinateData) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn native_shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Affine pixel-to-projection mapping (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Whether a failure is handled by a local fallback or surfaces to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Recoverable,
    Fatal,
}

/// Error types for GOES processing
#[derive(Debug, thiserror::Error)]
pub enum GoesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load {channel}: {reason}")]
    LoadFailure { channel: ChannelCode, reason: String },

    #[error("Calibration failed for {channel}: {reason}")]
    Calibration { channel: ChannelCode, reason: String },

    #[error("Projection context queried before initialization")]
    ProjectionUninitialized,

    #[error("Projection context already initialized")]
    ProjectionAlreadyInitialized,

    #[error("Cannot resample {from:?} to {to:?} with a fixed-ratio kernel")]
    ResamplingShapeMismatch { from: (usize, usize), to: (usize, usize) },

    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Solar geometry error: {0}")]
    SolarGeometry(String),

    #[error("Product {product} is missing channels [{}]", join_codes(.missing))]
    MissingChannels { product: String, missing: Vec<ChannelCode> },

    #[error("Unknown RGB product '{0}'")]
    UnknownProduct(String),

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("Channel {0} already stored")]
    DuplicateChannel(ChannelCode),

    #[error("No channels could be loaded")]
    NoChannelsLoaded,
}

impl GoesError {
    /// Failures that a component absorbs with a deterministic fallback
    pub fn kind(&self) -> FailureKind {
        match self {
            GoesError::SolarGeometry(_) | GoesError::ResamplingShapeMismatch { .. } => {
                FailureKind::Recoverable
            }
            _ => FailureKind::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == FailureKind::Recoverable
    }
}

/// Comma-separated channel list for messages
pub fn join_codes(codes: &[ChannelCode]) -> String {
    codes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}

/// Result type for GOES operations
pub type GoesResult<T> = Result<T, GoesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_code_parsing() {
        assert_eq!("C07".parse::<ChannelCode>().unwrap(), ChannelCode::C07);
        assert_eq!("c13".parse::<ChannelCode>().unwrap(), ChannelCode::C13);
        assert_eq!(ChannelCode::C02.to_string(), "C02");
        assert!("C17".parse::<ChannelCode>().is_err());
        assert!("C00".parse::<ChannelCode>().is_err());
        assert!("band7".parse::<ChannelCode>().is_err());
    }

    #[test]
    fn test_channel_classification() {
        assert_eq!(ChannelCode::C06.class(), ChannelClass::Visible);
        assert_eq!(ChannelCode::C07.class(), ChannelClass::Ir);
        assert_eq!(ChannelCode::C07.family(), ChannelFamily::ShortwaveIr);
        assert_eq!(ChannelCode::C09.family(), ChannelFamily::WaterVapor);
        assert_eq!(ChannelCode::C16.family(), ChannelFamily::LongwaveWindow);
        assert_eq!(ChannelCode::C03.family(), ChannelFamily::Unclassified);
        assert_eq!(ChannelCode::all().count(), 16);
    }

    #[test]
    fn test_partial_planck_constants() {
        let mut constants = CalibrationConstants::with_planck(PlanckConstants {
            fk1: 1.0,
            fk2: 2.0,
            bc1: 0.1,
            bc2: 0.9,
        });
        assert!(constants.planck().is_some());
        constants.planck_bc2 = None;
        assert!(constants.planck().is_none());
    }

    #[test]
    fn test_error_kinds() {
        assert!(GoesError::SolarGeometry("x".into()).is_recoverable());
        assert_eq!(GoesError::ProjectionUninitialized.kind(), FailureKind::Fatal);
        assert_eq!(GoesError::NoChannelsLoaded.kind(), FailureKind::Fatal);
    }
}
