//! Solar zenith angle over the fixed grid
//!
//! Geodetic reprojection is the expensive part, so it runs on a strided
//! subset of the scan-angle axes and the coarse result is upsampled back.
//! Any failure along the way (bad coordinates, unsupported sweep, nothing on
//! the Earth disk) is absorbed here: callers always get a grid back, built
//! from a deterministic time-of-day pattern when the real computation fails.

use crate::core::projection::GeosInverse;
use crate::core::resample::zoom_bilinear;
use crate::types::{CoordinateData, GoesError, GoesResult};
use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};

/// Earth equatorial radius used for the disk test (m)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Nominal GOES perspective point height (m)
pub const DEFAULT_SATELLITE_HEIGHT_M: f64 = 35_786_023.0;

/// Zenith angle used when no scan time is known
const NO_TIME_ZENITH_DEG: f32 = 60.0;

/// Strategy for the reprojection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarMethod {
    /// Fixed stride of 16, no Earth-disk mask
    Simple,
    /// Size-dependent stride, computation restricted to the Earth disk
    Masked,
}

impl SolarMethod {
    /// Coordinate stride for a grid of the given axis lengths
    pub fn downsample_factor(self, width: usize, height: usize) -> usize {
        match self {
            SolarMethod::Simple => 16usize.min(width.max(1)).min(height.max(1)),
            SolarMethod::Masked => {
                let base = if width > 3000 { 8 } else { 4 };
                base.min(width / 20).min(height / 20).max(1)
            }
        }
    }

    /// (minimum base angle, variation span, clip low, clip high) of the fallback pattern
    fn fallback_shape(self) -> (f64, f64, f64, f64) {
        match self {
            SolarMethod::Simple => (30.0, 20.0, 20.0, 120.0),
            SolarMethod::Masked => (20.0, 30.0, 10.0, 120.0),
        }
    }
}

/// Per-pixel solar zenith angle (degrees) and its cosine
#[derive(Debug, Clone, PartialEq)]
pub struct SolarAngleGrid {
    pub sza: Array2<f32>,
    pub cos_sza: Array2<f32>,
    pub method: SolarMethod,
    /// True when the synthetic fallback pattern was used
    pub is_fallback: bool,
}

impl SolarAngleGrid {
    pub fn shape(&self) -> (usize, usize) {
        self.sza.dim()
    }

    /// Fraction of finite pixels with the sun above the horizon
    pub fn day_fraction(&self) -> f64 {
        let (day, total) = self
            .sza
            .iter()
            .filter(|v| v.is_finite())
            .fold((0usize, 0usize), |(d, t), &v| (d + usize::from(v < 90.0), t + 1));
        if total == 0 {
            0.0
        } else {
            day as f64 / total as f64
        }
    }

    /// Same grid resampled (corner-aligned bilinear) to another shape
    pub fn resized(&self, shape: (usize, usize)) -> SolarAngleGrid {
        if self.shape() == shape {
            return self.clone();
        }
        SolarAngleGrid {
            sza: zoom_bilinear(&self.sza, shape),
            cos_sza: zoom_bilinear(&self.cos_sza, shape),
            method: self.method,
            is_fallback: self.is_fallback,
        }
    }

    pub fn size_bytes(&self) -> usize {
        (self.sza.len() + self.cos_sza.len()) * std::mem::size_of::<f32>()
    }
}

/// Angular radius of the visible Earth disk seen from height `h` (m)
pub fn earth_disk_radius(h: f64) -> f64 {
    (EARTH_RADIUS_M / h).asin()
}

/// Scan angle (x, y) lies on the visible Earth disk
#[inline]
pub fn is_on_disk(x: f64, y: f64, disk_radius: f64) -> bool {
    x * x + y * y <= disk_radius * disk_radius
}

/// Earth-disk mask with rows following `y` and columns following `x`
pub fn validity_mask(x: &Array1<f64>, y: &Array1<f64>, h: f64) -> Array2<bool> {
    let radius = earth_disk_radius(h);
    Array2::from_shape_fn((y.len(), x.len()), |(r, c)| is_on_disk(x[c], y[r], radius))
}

/// Solar declination in degrees for a day of year
pub fn solar_declination_deg(day_of_year: u32) -> f64 {
    23.45 * (360.0 * (284.0 + day_of_year as f64) / 365.25).to_radians().sin()
}

/// Hour angle in degrees for a UTC hour and an east-positive longitude
pub fn hour_angle_deg(utc_hour: f64, lon_deg: f64) -> f64 {
    15.0 * (utc_hour - 12.0) + lon_deg
}

/// Fractional UTC hour of a timestamp
pub fn utc_hour(time: &DateTime<Utc>) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0
}

/// (zenith degrees, cosine) for a location and time
pub fn solar_zenith(lat_deg: f64, lon_deg: f64, day_of_year: u32, utc_hour: f64) -> (f64, f64) {
    let dec = solar_declination_deg(day_of_year).to_radians();
    let ha = hour_angle_deg(utc_hour, lon_deg).to_radians();
    let lat = lat_deg.to_radians();
    let cos_sza = (lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos()).clamp(-1.0, 1.0);
    (cos_sza.acos().to_degrees(), cos_sza)
}

/// Deterministic stand-in grid: a time-of-day biased zenith angle with a
/// linear west-east gradient. `mask` (if it has any valid pixel) blanks
/// off-disk pixels.
pub fn fallback_grid(
    method: SolarMethod,
    shape: (usize, usize),
    scan_time: Option<&DateTime<Utc>>,
    mask: Option<&Array2<bool>>,
) -> SolarAngleGrid {
    let (rows, cols) = shape;
    let (min_base, span, lo, hi) = method.fallback_shape();

    let mut sza = match scan_time {
        None => Array2::from_elem(shape, NO_TIME_ZENITH_DEG),
        Some(time) => {
            let hour = utc_hour(time);
            let base = (90.0 - 15.0 * (hour - 12.0).abs()).max(min_base);
            Array2::from_shape_fn((rows, cols), |(_, c)| {
                let frac = if cols > 1 { c as f64 / (cols - 1) as f64 } else { 0.0 };
                (base + (frac - 0.5) * span).clamp(lo, hi) as f32
            })
        }
    };

    if method == SolarMethod::Masked {
        if let Some(mask) = mask.filter(|m| m.dim() == shape && m.iter().any(|&v| v)) {
            Zip::from(&mut sza).and(mask).for_each(|s, &valid| {
                if !valid {
                    *s = f32::NAN;
                }
            });
        }
    }

    let cos_sza = sza.mapv(|s| s.to_radians().cos());
    SolarAngleGrid {
        sza,
        cos_sza,
        method,
        is_fallback: true,
    }
}

/// Computes the scene's solar geometry once per run
#[derive(Debug, Clone)]
pub struct SolarGeometryEngine {
    method: SolarMethod,
}

impl SolarGeometryEngine {
    pub fn new(method: SolarMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> SolarMethod {
        self.method
    }

    /// Solar grid at `shape`. Never fails; falls back to the synthetic pattern.
    pub fn compute(
        &self,
        coordinates: Option<&CoordinateData>,
        shape: (usize, usize),
        scan_time: Option<&DateTime<Utc>>,
    ) -> SolarAngleGrid {
        match self.try_compute(coordinates, shape, scan_time) {
            Ok(grid) => {
                log::info!(
                    "Solar geometry computed ({:?}), day fraction {:.2}",
                    self.method,
                    grid.day_fraction()
                );
                grid
            }
            Err(e) => {
                log::warn!("{}; using fallback solar pattern", e);
                let mask = coordinates
                    .filter(|c| coordinates_are_finite(c))
                    .map(|c| {
                        let mask = validity_mask(&c.x, &c.y, c.projection.perspective_point_height);
                        resize_mask(&mask, shape)
                    });
                fallback_grid(self.method, shape, scan_time, mask.as_ref())
            }
        }
    }

    /// Full computation; every error here is recoverable
    pub fn try_compute(
        &self,
        coordinates: Option<&CoordinateData>,
        shape: (usize, usize),
        scan_time: Option<&DateTime<Utc>>,
    ) -> GoesResult<SolarAngleGrid> {
        let coords = coordinates
            .ok_or_else(|| GoesError::SolarGeometry("no coordinate data captured".to_string()))?;
        let time = scan_time.ok_or_else(|| GoesError::SolarGeometry("no scan time".to_string()))?;
        if shape.0 == 0 || shape.1 == 0 {
            return Err(GoesError::SolarGeometry(format!("empty target grid {:?}", shape)));
        }
        if coords.x.len() < 2 || coords.y.len() < 2 {
            return Err(GoesError::SolarGeometry("coordinate axes too short".to_string()));
        }
        if !coordinates_are_finite(coords) {
            return Err(GoesError::SolarGeometry("non-finite scan-angle coordinates".to_string()));
        }

        let inverse = GeosInverse::new(&coords.projection)?;
        let h = coords.projection.perspective_point_height;
        let disk_radius = earth_disk_radius(h);
        if !disk_radius.is_finite() {
            return Err(GoesError::SolarGeometry(format!("invalid satellite height {}", h)));
        }

        let factor = self.method.downsample_factor(coords.x.len(), coords.y.len());
        let xs: Vec<f64> = coords.x.iter().step_by(factor).copied().collect();
        let ys: Vec<f64> = coords.y.iter().step_by(factor).copied().collect();
        let masked = self.method == SolarMethod::Masked;

        let doy = time.ordinal();
        let hour = utc_hour(time);
        log::debug!(
            "Solar grid: stride {} -> {}x{} samples, doy {}, {:.3} UTC",
            factor,
            xs.len(),
            ys.len(),
            doy,
            hour
        );

        let coarse: Array2<(f64, f64)> = Array2::from_shape_fn((ys.len(), xs.len()), |(r, c)| {
            let (x, y) = (xs[c], ys[r]);
            if masked && !is_on_disk(x, y, disk_radius) {
                return (f64::NAN, f64::NAN);
            }
            match inverse.scan_to_geo(x, y) {
                Some((lon, lat)) => solar_zenith(lat, lon, doy, hour),
                None => (f64::NAN, f64::NAN),
            }
        });

        if !coarse.iter().any(|(s, _)| s.is_finite()) {
            return Err(GoesError::SolarGeometry("no pixel on the Earth disk".to_string()));
        }

        let sza_coarse = coarse.mapv(|(s, _)| if s.is_finite() { s as f32 } else { 90.0 });
        let cos_coarse = coarse.mapv(|(_, c)| if c.is_finite() { c as f32 } else { 0.0 });
        let mut sza = zoom_bilinear(&sza_coarse, shape);
        let mut cos_sza = zoom_bilinear(&cos_coarse, shape);

        if masked {
            let mask = resize_mask(&validity_mask(&coords.x, &coords.y, h), shape);
            Zip::from(&mut sza)
                .and(&mut cos_sza)
                .and(&mask)
                .for_each(|s, cs, &valid| {
                    if !valid {
                        *s = f32::NAN;
                        *cs = f32::NAN;
                    }
                });
        }

        Ok(SolarAngleGrid {
            sza,
            cos_sza,
            method: self.method,
            is_fallback: false,
        })
    }
}

fn coordinates_are_finite(coords: &CoordinateData) -> bool {
    coords.x.iter().chain(coords.y.iter()).all(|v| v.is_finite())
}

/// Nearest-neighbour resize of a boolean mask
fn resize_mask(mask: &Array2<bool>, shape: (usize, usize)) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    if (rows, cols) == shape || rows == 0 || cols == 0 {
        return if (rows, cols) == shape {
            mask.clone()
        } else {
            Array2::from_elem(shape, false)
        };
    }
    Array2::from_shape_fn(shape, |(r, c)| {
        let sr = (r * rows / shape.0).min(rows - 1);
        let sc = (c * cols / shape.1).min(cols - 1);
        mask[[sr, sc]]
    })
}
