use crate::types::{
    CalibratedImage, CalibrationConstants, ChannelClass, ChannelCode, ChannelRecord, GoesError,
    GoesResult, PlanckConstants, RawPixels,
};
use ndarray::{Array2, Zip};

/// Fallback Planck coefficients per emissive band:
/// (band, central wavelength um, fk1, fk2, bc1, bc2)
const PLANCK_FALLBACK: [(u8, f64, f64, f64, f64, f64); 10] = [
    (7, 3.8853, 5.44958e3, 9.20062e2, 0.43616, 0.99715),
    (8, 6.2428, 2.08380e3, 8.97668e2, 0.27387, 0.99636),
    (9, 6.9419, 1.67380e3, 8.95963e2, 0.30802, 0.99574),
    (10, 7.3414, 1.49979e3, 8.94765e2, 0.33708, 0.99536),
    (11, 8.4447, 1.12855e3, 8.89377e2, 0.39298, 0.99419),
    (12, 9.6136, 8.68052e2, 8.78786e2, 0.47261, 0.99248),
    (13, 10.3499, 7.47300e2, 8.68467e2, 0.53083, 0.99111),
    (14, 11.1949, 6.34106e2, 8.55701e2, 0.60474, 0.98917),
    (15, 12.2740, 5.16292e2, 8.36581e2, 0.70681, 0.98622),
    (16, 13.2807, 4.31815e2, 8.16406e2, 0.81669, 0.98279),
];

/// Band whose constants stand in for unrecognised codes
const DEFAULT_FALLBACK_BAND: u8 = 13;

fn fallback_row(code: ChannelCode) -> &'static (u8, f64, f64, f64, f64, f64) {
    PLANCK_FALLBACK
        .iter()
        .find(|row| row.0 == code.band())
        .or_else(|| PLANCK_FALLBACK.iter().find(|row| row.0 == DEFAULT_FALLBACK_BAND))
        .unwrap_or(&PLANCK_FALLBACK[6])
}

/// Static Planck constants for a channel (C13's for non-emissive codes)
pub fn fallback_planck(code: ChannelCode) -> PlanckConstants {
    let &(_, _, fk1, fk2, bc1, bc2) = fallback_row(code);
    PlanckConstants { fk1, fk2, bc1, bc2 }
}

/// Central wavelength in micrometers from the fallback table
pub fn central_wavelength_um(code: ChannelCode) -> f64 {
    fallback_row(code).1
}

/// Record constants when all four are present, else the static table
pub fn resolve_planck(code: ChannelCode, constants: &CalibrationConstants) -> PlanckConstants {
    match constants.planck() {
        Some(planck) => planck,
        None => {
            log::debug!("{}: using fallback Planck constants", code);
            fallback_planck(code)
        }
    }
}

/// Inverse Planck with band correction for a single radiance value.
/// Non-positive or non-finite radiance is no-data (NaN).
#[inline]
pub fn planck_brightness_temp(radiance: f64, c: &PlanckConstants) -> f64 {
    if !(radiance > 0.0) || !radiance.is_finite() {
        return f64::NAN;
    }
    (c.fk2 / (c.fk1 / radiance + 1.0).ln() - c.bc1) / c.bc2
}

/// Forward Planck: radiance that calibrates to `temperature` kelvin
#[inline]
pub fn planck_radiance(temperature: f64, c: &PlanckConstants) -> f64 {
    c.fk1 / ((c.fk2 / (c.bc1 + c.bc2 * temperature)).exp() - 1.0)
}

fn validate_planck(code: ChannelCode, c: &PlanckConstants) -> GoesResult<()> {
    let finite = [c.fk1, c.fk2, c.bc1, c.bc2].iter().all(|v| v.is_finite());
    if !finite || c.fk1 <= 0.0 || c.fk2 <= 0.0 || c.bc2 == 0.0 {
        return Err(GoesError::Calibration {
            channel: code,
            reason: format!("malformed Planck constants {:?}", c),
        });
    }
    Ok(())
}

/// Brightness temperature (K) from spectral radiance.
/// Computed in f64 and stored as f32.
pub fn radiance_to_brightness_temp(
    radiance: &Array2<f32>,
    code: ChannelCode,
    constants: &CalibrationConstants,
) -> GoesResult<CalibratedImage> {
    let planck = resolve_planck(code, constants);
    validate_planck(code, &planck)?;

    let convert = |&l: &f32| planck_brightness_temp(l as f64, &planck) as f32;

    #[cfg(feature = "parallel")]
    let temperature = Zip::from(radiance).par_map_collect(convert);
    #[cfg(not(feature = "parallel"))]
    let temperature = Zip::from(radiance).map_collect(convert);

    Ok(temperature)
}

/// Radiance (f32) for a brightness temperature grid in kelvin
pub fn brightness_temp_to_radiance(
    temperature: &Array2<f32>,
    code: ChannelCode,
    constants: &CalibrationConstants,
) -> GoesResult<Array2<f32>> {
    let planck = resolve_planck(code, constants);
    validate_planck(code, &planck)?;
    Ok(temperature.mapv(|t| planck_radiance(t as f64, &planck) as f32))
}

/// Reflectance factor from radiance.
///
/// With kappa0 this is `radiance * kappa0`. Without it the array is divided
/// by its NaN-ignoring maximum; an array whose maximum is not positive is
/// returned unchanged.
pub fn radiance_to_reflectance(radiance: &Array2<f32>, kappa0: Option<f64>) -> CalibratedImage {
    if let Some(k) = kappa0.filter(|k| k.is_finite()) {
        return radiance.mapv(|l| (l as f64 * k) as f32);
    }

    let max = radiance
        .iter()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    if max > 0.0 {
        log::debug!("No kappa0, normalizing radiance by max {:.4}", max);
        radiance.mapv(|l| l / max)
    } else {
        radiance.clone()
    }
}

/// Output of calibration for one channel
#[derive(Debug, Clone)]
pub struct CalibratedChannel {
    pub code: ChannelCode,
    pub class: ChannelClass,
    /// Kelvin for IR, reflectance factor for visible
    pub data: CalibratedImage,
}

impl CalibratedChannel {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Converts raw channel payloads into physical units
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine;

impl CalibrationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Calibrate a record's own pixels
    pub fn calibrate(&self, record: &ChannelRecord) -> GoesResult<CalibratedChannel> {
        self.calibrate_pixels(record.code, &record.data, &record.calibration)
    }

    /// Calibrate an arbitrary payload using a record's code and constants.
    /// Used when radiance has been resampled before calibration.
    pub fn calibrate_pixels(
        &self,
        code: ChannelCode,
        pixels: &RawPixels,
        constants: &CalibrationConstants,
    ) -> GoesResult<CalibratedChannel> {
        let (rows, cols) = pixels.dim();
        if rows == 0 || cols == 0 {
            return Err(GoesError::Calibration {
                channel: code,
                reason: "empty pixel array".to_string(),
            });
        }

        let class = code.class();
        let data = match pixels {
            RawPixels::Calibrated(values) => {
                log::debug!("{}: input already calibrated", code);
                values.clone()
            }
            RawPixels::Radiance(radiance) => match class {
                ChannelClass::Ir => radiance_to_brightness_temp(radiance, code, constants)?,
                ChannelClass::Visible => radiance_to_reflectance(radiance, constants.kappa0),
            },
        };

        log::debug!("{}: calibrated {}x{} {} pixels", code, rows, cols, class);
        Ok(CalibratedChannel { code, class, data })
    }
}
