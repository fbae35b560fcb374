//! Scene-wide geostationary projection
//!
//! All ABI channels of one scene share the same angular extent but are sampled
//! at 0.5, 1 or 2 km. The [`ProjectionAuthority`] is initialised once from the
//! reference channel's scan-angle coordinates; every other channel derives its
//! geotransform from its pixel dimensions against that extent.

use crate::types::{GeoTransform, GoesError, GoesResult, ProjectionMetadata, SweepAxis};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Angular pixel size (radians) below which a grid is 0.5 km
const FINE_PIXEL_RAD: f64 = 0.000021;
/// Angular pixel size (radians) below which a grid is 1 km
const MEDIUM_PIXEL_RAD: f64 = 0.000042;

/// ABI nominal resolution tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionClass {
    /// 0.5 km (C02)
    Fine,
    /// 1 km (C01, C03, C05)
    Medium,
    /// 2 km (everything else)
    Coarse,
}

impl ResolutionClass {
    /// Classify an angular pixel size. Anything outside the three ABI tiers
    /// lands in the nearest band.
    pub fn from_pixel_size(radians: f64) -> Self {
        let size = radians.abs();
        if size < FINE_PIXEL_RAD {
            ResolutionClass::Fine
        } else if size < MEDIUM_PIXEL_RAD {
            ResolutionClass::Medium
        } else {
            ResolutionClass::Coarse
        }
    }

    pub fn km(self) -> f64 {
        match self {
            ResolutionClass::Fine => 0.5,
            ResolutionClass::Medium => 1.0,
            ResolutionClass::Coarse => 2.0,
        }
    }
}

/// Projection definition plus the scene's angular extent
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionContext {
    pub metadata: ProjectionMetadata,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Resolution of the channel that initialised the context
    pub source_resolution: ResolutionClass,
    pub source_shape: (usize, usize),
}

impl ProjectionContext {
    /// Build a context from fixed-grid coordinates (radians)
    pub fn from_coordinates(
        metadata: &ProjectionMetadata,
        x: &Array1<f64>,
        y: &Array1<f64>,
    ) -> GoesResult<Self> {
        let (x_min, x_max) = finite_bounds(x)
            .ok_or_else(|| GoesError::InvalidFormat("x coordinates have no finite extent".to_string()))?;
        let (y_min, y_max) = finite_bounds(y)
            .ok_or_else(|| GoesError::InvalidFormat("y coordinates have no finite extent".to_string()))?;

        if !(metadata.perspective_point_height.is_finite() && metadata.perspective_point_height > 0.0) {
            return Err(GoesError::InvalidFormat(format!(
                "invalid perspective point height {}",
                metadata.perspective_point_height
            )));
        }

        let source_resolution = ResolutionClass::from_pixel_size((x_max - x_min) / x.len() as f64);

        Ok(Self {
            metadata: metadata.clone(),
            x_min,
            x_max,
            y_min,
            y_max,
            source_resolution,
            source_shape: (y.len(), x.len()),
        })
    }

    pub fn x_extent(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn y_extent(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Resolution class implied by a grid of the given width
    pub fn resolution_for(&self, width: usize) -> ResolutionClass {
        ResolutionClass::from_pixel_size(self.x_extent() / width.max(1) as f64)
    }

    /// Affine transform in meters for a grid of the given dimensions
    pub fn geotransform_for(&self, width: usize, height: usize) -> GoesResult<GeoTransform> {
        if width == 0 || height == 0 {
            return Err(GoesError::InvalidFormat(format!(
                "cannot derive geotransform for {}x{} grid",
                width, height
            )));
        }
        let h = self.metadata.perspective_point_height;
        let dx = self.x_extent() / width as f64;
        let dy = self.y_extent() / height as f64;

        Ok(GeoTransform {
            top_left_x: self.x_min * h,
            pixel_width: dx * h,
            rotation_x: 0.0,
            top_left_y: self.y_max * h,
            rotation_y: 0.0,
            pixel_height: -(dy * h).abs(),
        })
    }

    pub fn proj_string(&self) -> String {
        let m = &self.metadata;
        format!(
            "+proj=geos +lon_0={} +h={} +x_0=0 +y_0=0 +a={} +b={} +sweep={} +units=m +no_defs",
            m.longitude_of_projection_origin,
            m.perspective_point_height,
            m.semi_major_axis,
            m.semi_minor_axis,
            m.sweep_angle_axis
        )
    }

    /// Extent in projection meters as (x_min, x_max, y_min, y_max)
    pub fn extent_meters(&self) -> (f64, f64, f64, f64) {
        let h = self.metadata.perspective_point_height;
        (self.x_min * h, self.x_max * h, self.y_min * h, self.y_max * h)
    }
}

fn finite_bounds(values: &Array1<f64>) -> Option<(f64, f64)> {
    let mut bounds: Option<(f64, f64)> = None;
    for &v in values.iter().filter(|v| v.is_finite()) {
        bounds = Some(match bounds {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    bounds.filter(|(lo, hi)| hi > lo)
}

/// Holder of the per-scene projection context.
///
/// Created fresh for each scene and dropped with it. The first successful
/// initialisation wins; the context is read-only afterwards.
#[derive(Debug, Default)]
pub struct ProjectionAuthority {
    context: OnceLock<ProjectionContext>,
}

impl ProjectionAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict initialisation: fails if a context is already present
    pub fn initialize(
        &self,
        metadata: &ProjectionMetadata,
        x: &Array1<f64>,
        y: &Array1<f64>,
    ) -> GoesResult<&ProjectionContext> {
        if self.context.get().is_some() {
            return Err(GoesError::ProjectionAlreadyInitialized);
        }
        let context = ProjectionContext::from_coordinates(metadata, x, y)?;
        self.context
            .set(context)
            .map_err(|_| GoesError::ProjectionAlreadyInitialized)?;
        self.context()
    }

    /// Initialise if nobody has yet; otherwise return the existing context.
    /// Safe to call from concurrent channel tasks.
    pub fn ensure_initialized(
        &self,
        metadata: &ProjectionMetadata,
        x: &Array1<f64>,
        y: &Array1<f64>,
    ) -> GoesResult<&ProjectionContext> {
        if let Some(existing) = self.context.get() {
            return Ok(existing);
        }
        let context = ProjectionContext::from_coordinates(metadata, x, y)?;
        if self.context.set(context).is_ok() {
            log::info!("Projection context initialized");
        }
        self.context()
    }

    pub fn context(&self) -> GoesResult<&ProjectionContext> {
        self.context.get().ok_or(GoesError::ProjectionUninitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.get().is_some()
    }

    pub fn geotransform_for(&self, width: usize, height: usize) -> GoesResult<GeoTransform> {
        self.context()?.geotransform_for(width, height)
    }

    pub fn resolution_for(&self, width: usize) -> GoesResult<ResolutionClass> {
        Ok(self.context()?.resolution_for(width))
    }

    /// One-line description for logs and summaries
    pub fn info(&self) -> String {
        match self.context.get() {
            None => "projection not initialized".to_string(),
            Some(ctx) => format!(
                "geos lon_0={} h={} sweep={} source {:.1} km {}x{}",
                ctx.metadata.longitude_of_projection_origin,
                ctx.metadata.perspective_point_height,
                ctx.metadata.sweep_angle_axis,
                ctx.source_resolution.km(),
                ctx.source_shape.1,
                ctx.source_shape.0
            ),
        }
    }
}

/// Fixed-grid inverse: scan angles to geodetic coordinates
#[derive(Debug, Clone, Copy)]
pub struct GeosInverse {
    /// Distance from Earth center to satellite (m)
    h: f64,
    req: f64,
    rpol: f64,
    lambda_0: f64,
}

impl GeosInverse {
    pub fn new(metadata: &ProjectionMetadata) -> GoesResult<Self> {
        if metadata.sweep_angle_axis != SweepAxis::X {
            return Err(GoesError::SolarGeometry(
                "only sweep-x fixed grids are supported".to_string(),
            ));
        }
        let valid = [
            metadata.perspective_point_height,
            metadata.semi_major_axis,
            metadata.semi_minor_axis,
            metadata.longitude_of_projection_origin,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !valid || metadata.semi_minor_axis <= 0.0 || metadata.perspective_point_height <= 0.0 {
            return Err(GoesError::SolarGeometry(format!(
                "invalid projection parameters {:?}",
                metadata
            )));
        }
        Ok(Self {
            h: metadata.perspective_point_height + metadata.semi_major_axis,
            req: metadata.semi_major_axis,
            rpol: metadata.semi_minor_axis,
            lambda_0: metadata.longitude_of_projection_origin.to_radians(),
        })
    }

    /// (lon, lat) in degrees, `None` when the line of sight misses the Earth
    pub fn scan_to_geo(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (sin_x, cos_x) = x.sin_cos();
        let (sin_y, cos_y) = y.sin_cos();
        let ratio2 = (self.req / self.rpol).powi(2);

        let a = sin_x * sin_x + cos_x * cos_x * (cos_y * cos_y + ratio2 * sin_y * sin_y);
        let b = -2.0 * self.h * cos_x * cos_y;
        let c = self.h * self.h - self.req * self.req;

        let disc = b * b - 4.0 * a * c;
        if !(disc >= 0.0) {
            return None;
        }
        let rs = (-b - disc.sqrt()) / (2.0 * a);

        let sx = rs * cos_x * cos_y;
        let sy = -rs * sin_x;
        let sz = rs * cos_x * sin_y;

        let lat = (ratio2 * sz / (self.h - sx).hypot(sy)).atan();
        let lon = self.lambda_0 - sy.atan2(self.h - sx);
        Some((lon.to_degrees(), lat.to_degrees()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    fn conus_axes(width: usize, height: usize) -> (Array1<f64>, Array1<f64>) {
        let x = Array1::linspace(-0.101360, 0.038640, width);
        let y = Array1::linspace(0.128226, 0.044240, height);
        (x, y)
    }

    #[test]
    fn test_resolution_classes() {
        assert_eq!(ResolutionClass::from_pixel_size(0.000014), ResolutionClass::Fine);
        assert_eq!(ResolutionClass::from_pixel_size(0.000028), ResolutionClass::Medium);
        assert_eq!(ResolutionClass::from_pixel_size(-0.000056), ResolutionClass::Coarse);
        assert_eq!(ResolutionClass::from_pixel_size(0.01), ResolutionClass::Coarse);
    }

    #[test]
    fn test_uninitialized_queries_fail() {
        let authority = ProjectionAuthority::new();
        assert!(matches!(
            authority.geotransform_for(10, 10),
            Err(GoesError::ProjectionUninitialized)
        ));
        assert!(!authority.is_initialized());
    }

    #[test]
    fn test_strict_initialization() {
        let authority = ProjectionAuthority::new();
        let (x, y) = conus_axes(2500, 1500);
        let meta = ProjectionMetadata::default();
        authority.initialize(&meta, &x, &y).unwrap();
        assert!(matches!(
            authority.initialize(&meta, &x, &y),
            Err(GoesError::ProjectionAlreadyInitialized)
        ));
        // lenient path keeps the first context
        let (x2, y2) = conus_axes(10, 10);
        let ctx = authority.ensure_initialized(&meta, &x2, &y2).unwrap();
        assert_eq!(ctx.source_shape, (1500, 2500));
    }

    #[test]
    fn test_geotransform_per_resolution() {
        let authority = ProjectionAuthority::new();
        let (x, y) = conus_axes(2500, 1500);
        let meta = ProjectionMetadata::default();
        authority.initialize(&meta, &x, &y).unwrap();

        let coarse = authority.geotransform_for(2500, 1500).unwrap();
        let fine = authority.geotransform_for(10000, 6000).unwrap();
        assert_abs_diff_eq!(coarse.top_left_x, fine.top_left_x);
        assert_abs_diff_eq!(coarse.pixel_width / fine.pixel_width, 4.0, epsilon = 1e-9);
        assert!(coarse.pixel_height < 0.0);
        assert_eq!(coarse.rotation_x, 0.0);
        assert_abs_diff_eq!(coarse.top_left_y, 0.128226 * 35_786_023.0, epsilon = 1e-3);

        assert_eq!(authority.resolution_for(2500).unwrap(), ResolutionClass::Coarse);
        assert_eq!(authority.resolution_for(5000).unwrap(), ResolutionClass::Medium);
        assert_eq!(authority.resolution_for(10000).unwrap(), ResolutionClass::Fine);
    }

    #[test]
    fn test_nan_coordinates_rejected() {
        let authority = ProjectionAuthority::new();
        let x = Array1::from_elem(10, f64::NAN);
        let y = Array1::linspace(0.1, 0.0, 10);
        assert!(authority
            .ensure_initialized(&ProjectionMetadata::default(), &x, &y)
            .is_err());
        assert!(!authority.is_initialized());
    }

    #[test]
    fn test_scan_to_geo_nadir_and_space() {
        let inverse = GeosInverse::new(&ProjectionMetadata::default()).unwrap();
        let (lon, lat) = inverse.scan_to_geo(0.0, 0.0).unwrap();
        assert_abs_diff_eq!(lon, -75.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-9);
        assert!(inverse.scan_to_geo(0.2, 0.2).is_none());
    }

    #[test]
    fn test_sweep_y_rejected() {
        let mut meta = ProjectionMetadata::default();
        meta.sweep_angle_axis = SweepAxis::Y;
        let err = GeosInverse::new(&meta).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_proj_string() {
        let authority = ProjectionAuthority::new();
        let (x, y) = conus_axes(100, 60);
        authority
            .initialize(&ProjectionMetadata::default(), &x, &y)
            .unwrap();
        let proj = authority.context().unwrap().proj_string();
        assert!(proj.starts_with("+proj=geos +lon_0=-75"));
        assert!(proj.contains("+sweep=x"));
    }
}
