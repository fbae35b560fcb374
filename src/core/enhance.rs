//! Single-channel enhancement
//!
//! IR channels go through two stages: a temperature curve (degC to an 8-bit
//! enhancement index) and a 256-entry color table. Both stages are folded
//! into one [`CombinedLut`] of temperature to RGB so each pixel costs a
//! single interpolated lookup. Tables are built once per channel code and
//! cached for the lifetime of the engine.

use crate::core::calibrate::CalibratedChannel;
use crate::core::render::{render_gray, render_rgb};
use crate::types::{
    CalibratedImage, ChannelClass, ChannelCode, ChannelFamily, GoesError, GoesResult, GrayImage,
    RgbImage,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Lowest temperature covered by the tables (degC)
pub const LUT_MIN_CELSIUS: f64 = -150.0;
/// Highest temperature covered by the tables (degC)
pub const LUT_MAX_CELSIUS: f64 = 150.0;
/// Samples in the temperature curve
pub const CURVE_SAMPLES: usize = 30_000;
/// Samples in the combined temperature-to-RGB table
pub const COMBINED_SAMPLES: usize = 3_000;

const KELVIN_OFFSET: f32 = 273.15;

/// Shortwave-IR (C07) linear span, degC
const SHORTWAVE_SPAN: (f64, f64) = (-83.0, 127.0);

const SHORTWAVE_KEY_TEMPS: [f64; 44] = [
    -83.0, -78.0, -73.0, -68.0, -63.0, -58.0, -53.0, -48.0, -43.0, -42.0, -38.0, -33.0, -28.0,
    -23.0, -18.0, -13.0, -8.0, -3.0, 2.0, 7.0, 13.0, 17.0, 22.0, 27.0, 32.0, 38.0, 42.0, 47.0,
    52.0, 57.0, 62.0, 67.0, 72.0, 77.0, 82.0, 87.0, 92.0, 97.0, 102.0, 107.0, 112.0, 117.0,
    122.0, 127.0,
];

/// Colors at each shortwave key temperature, coldest first
const SHORTWAVE_COLORS: [[u8; 3]; 44] = [
    [0, 0, 0], [2, 2, 2], [5, 5, 5], [8, 8, 8], [11, 11, 11], [14, 14, 14], [17, 17, 17],
    [21, 21, 21], [24, 24, 24], [27, 27, 27], [31, 31, 31], [34, 34, 34], [37, 37, 37],
    [40, 40, 40], [44, 44, 44], [46, 46, 46], [49, 49, 49], [53, 53, 53], [56, 56, 56],
    [69, 69, 69], [80, 80, 80], [91, 91, 91], [103, 103, 103], [112, 112, 112],
    [125, 125, 125], [135, 135, 135], [145, 145, 145], [156, 156, 156], [167, 167, 167],
    [177, 177, 177], [186, 186, 186], [0, 166, 206], [0, 2, 114], [0, 249, 3], [172, 255, 0],
    [201, 255, 0], [255, 149, 0], [252, 0, 0], [70, 0, 0], [35, 35, 35], [58, 58, 58],
    [79, 79, 79], [101, 101, 101], [122, 122, 122],
];

const WATER_VAPOR_TEMPS: [f64; 24] = [
    -93.0, -88.0, -83.0, -78.0, -73.0, -68.0, -63.0, -58.0, -54.0, -53.0, -48.0, -43.0, -38.0,
    -33.0, -30.0, -28.0, -23.0, -18.0, -13.0, -8.0, -5.0, -3.0, 2.0, 7.0,
];

const WATER_VAPOR_COLORS: [[u8; 3]; 24] = [
    [9, 239, 227], [26, 207, 170], [43, 176, 114], [61, 144, 57], [77, 137, 47],
    [100, 152, 73], [122, 167, 99], [145, 182, 126], [164, 194, 148], [170, 200, 156],
    [206, 223, 198], [243, 248, 241], [224, 224, 238], [169, 169, 207], [137, 137, 190],
    [92, 92, 166], [21, 21, 105], [199, 199, 25], [255, 216, 0], [255, 149, 0],
    [255, 109, 0], [255, 81, 0], [255, 9, 0], [0, 0, 0],
];

const WINDOW_TEMPS: [f64; 38] = [
    -110.0, -105.0, -100.0, -95.0, -90.0, -85.0, -80.0, -75.0, -70.0, -65.0, -60.0, -59.0,
    -55.0, -50.0, -45.0, -40.0, -35.0, -30.0, -25.0, -20.0, -15.0, -10.0, -5.0, 0.0, 5.0, 6.0,
    10.0, 15.0, 20.0, 25.0, 30.0, 31.0, 35.0, 40.0, 45.0, 50.0, 55.0, 57.0,
];

const WINDOW_COLORS: [[u8; 3]; 38] = [
    [255, 255, 255], [255, 255, 255], [255, 255, 255], [187, 187, 187], [103, 103, 103],
    [8, 11, 11], [104, 0, 0], [223, 0, 0], [255, 79, 0], [255, 184, 0], [219, 255, 0],
    [199, 255, 0], [67, 255, 0], [0, 144, 50], [0, 9, 120], [0, 149, 197], [199, 186, 186],
    [182, 182, 182], [176, 176, 176], [168, 168, 168], [157, 157, 157], [146, 146, 146],
    [136, 136, 136], [125, 125, 125], [114, 114, 114], [113, 113, 113], [103, 103, 103],
    [92, 92, 92], [80, 80, 80], [69, 69, 69], [58, 58, 58], [55, 55, 55], [48, 48, 48],
    [37, 37, 37], [28, 28, 28], [18, 18, 18], [9, 9, 9], [5, 5, 5],
];

/// Piecewise-linear interpolation with clamping at both ends.
/// `xs` must be ascending.
fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let last = xs.len() - 1;
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[last] {
        return ys[last];
    }
    let upper = xs.partition_point(|&v| v <= x).min(last);
    let lower = upper - 1;
    let span = xs[upper] - xs[lower];
    if span <= 0.0 {
        return ys[upper];
    }
    let t = (x - xs[lower]) / span;
    ys[lower] + t * (ys[upper] - ys[lower])
}

/// Evenly spaced samples including both endpoints
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    let step = (stop - start) / (n - 1) as f64;
    let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    values[n - 1] = stop;
    values
}

/// Breakpoint target `floor(i * 255 / (n - 1))`
fn breakpoint_index(i: usize, n: usize) -> f64 {
    ((i * 255) / (n - 1)) as f64
}

/// Clamped piecewise-linear curve through (temps[i], breakpoint_index(i))
fn breakpoint_curve(celsius: f64, temps: &[f64]) -> f64 {
    let n = temps.len();
    if celsius <= temps[0] {
        return 0.0;
    }
    if celsius >= temps[n - 1] {
        return breakpoint_index(n - 1, n);
    }
    let upper = temps.partition_point(|&v| v <= celsius).min(n - 1);
    let lower = upper - 1;
    let t = (celsius - temps[lower]) / (temps[upper] - temps[lower]);
    let (a, b) = (breakpoint_index(lower, n), breakpoint_index(upper, n));
    a + t * (b - a)
}

/// Enhancement index (unclamped to integers) for a temperature in degC
pub fn enhancement_value(family: ChannelFamily, celsius: f64) -> f64 {
    match family {
        ChannelFamily::ShortwaveIr => {
            let (t_min, t_max) = SHORTWAVE_SPAN;
            let normalized = (celsius - t_min) / (t_max - t_min);
            255.0 - (normalized * 255.0).clamp(0.0, 255.0)
        }
        ChannelFamily::WaterVapor => breakpoint_curve(celsius, &WATER_VAPOR_TEMPS),
        ChannelFamily::LongwaveWindow => breakpoint_curve(celsius, &WINDOW_TEMPS),
        ChannelFamily::Unclassified => ((celsius + 100.0) / 200.0 * 255.0).clamp(0.0, 255.0),
    }
}

/// Temperature to 8-bit enhancement index, sampled over the table range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemperatureCurve {
    values: Vec<u8>,
}

impl TemperatureCurve {
    pub fn for_family(family: ChannelFamily) -> Self {
        let values = linspace(LUT_MIN_CELSIUS, LUT_MAX_CELSIUS, CURVE_SAMPLES)
            .into_iter()
            .map(|t| enhancement_value(family, t) as u8)
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Linearly interpolated curve value at `celsius`, clamped to the ends
    pub fn evaluate(&self, celsius: f64) -> f64 {
        let last = self.values.len() - 1;
        let step = (LUT_MAX_CELSIUS - LUT_MIN_CELSIUS) / last as f64;
        let pos = ((celsius - LUT_MIN_CELSIUS) / step).clamp(0.0, last as f64);
        let i = (pos.floor() as usize).min(last);
        if i == last {
            return self.values[last] as f64;
        }
        let frac = pos - i as f64;
        let (a, b) = (self.values[i] as f64, self.values[i + 1] as f64);
        a + frac * (b - a)
    }
}

/// 256-entry enhancement index to RGB table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 3]>,
}

impl ColorTable {
    pub fn for_family(family: ChannelFamily) -> Self {
        let (temps, colors): (&[f64], &[[u8; 3]]) = match family {
            ChannelFamily::ShortwaveIr => (&SHORTWAVE_KEY_TEMPS[..], &SHORTWAVE_COLORS[..]),
            ChannelFamily::WaterVapor => (&WATER_VAPOR_TEMPS[..], &WATER_VAPOR_COLORS[..]),
            ChannelFamily::LongwaveWindow => (&WINDOW_TEMPS[..], &WINDOW_COLORS[..]),
            ChannelFamily::Unclassified => {
                let entries = (0..=255u8).map(|i| [i, i, i]).collect();
                return Self { entries };
            }
        };

        let (t_min, t_max) = (temps[0], temps[temps.len() - 1]);
        let positions: Vec<f64> = temps.iter().map(|t| (t - t_min) / (t_max - t_min)).collect();
        let bands: Vec<Vec<f64>> = (0..3)
            .map(|b| colors.iter().map(|c| c[b] as f64).collect())
            .collect();

        let entries = linspace(0.0, 1.0, 256)
            .into_iter()
            .map(|x| {
                [
                    interp(x, &positions, &bands[0]) as u8,
                    interp(x, &positions, &bands[1]) as u8,
                    interp(x, &positions, &bands[2]) as u8,
                ]
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    pub fn lookup(&self, index: u8) -> [u8; 3] {
        self.entries[index as usize]
    }
}

/// Direct temperature (degC) to RGB table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedLut {
    pub code: ChannelCode,
    entries: Vec<[u8; 3]>,
}

impl CombinedLut {
    pub fn build(code: ChannelCode) -> Self {
        let family = code.family();
        let curve = TemperatureCurve::for_family(family);
        let colors = ColorTable::for_family(family);

        let entries = linspace(LUT_MIN_CELSIUS, LUT_MAX_CELSIUS, COMBINED_SAMPLES)
            .into_iter()
            .map(|t| {
                let index = curve.evaluate(t).clamp(0.0, 255.0) as u8;
                colors.lookup(index)
            })
            .collect();

        Self { code, entries }
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    /// Flattened RGB bytes, for comparisons and hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().flatten().copied().collect()
    }

    /// Table temperature at entry `i` (degC)
    pub fn temperature_at(&self, i: usize) -> f64 {
        let last = self.entries.len() - 1;
        LUT_MIN_CELSIUS + (LUT_MAX_CELSIUS - LUT_MIN_CELSIUS) * i.min(last) as f64 / last as f64
    }

    /// Interpolated color for a temperature in degC; out-of-range values
    /// clamp to the boundary entries and NaN renders black
    #[inline]
    pub fn lookup(&self, celsius: f32) -> [u8; 3] {
        if celsius.is_nan() {
            return [0, 0, 0];
        }
        let last = self.entries.len() - 1;
        let step = (LUT_MAX_CELSIUS - LUT_MIN_CELSIUS) / last as f64;
        let pos = ((celsius as f64 - LUT_MIN_CELSIUS) / step).clamp(0.0, last as f64);
        let i = (pos.floor() as usize).min(last);
        if i == last {
            return self.entries[last];
        }
        let frac = pos - i as f64;
        let (a, b) = (self.entries[i], self.entries[i + 1]);
        let mix = |k: usize| (a[k] as f64 + frac * (b[k] as f64 - a[k] as f64)).round() as u8;
        [mix(0), mix(1), mix(2)]
    }
}

/// Enhanced rendition of one channel
#[derive(Debug, Clone, PartialEq)]
pub enum EnhancedChannel {
    /// Visible channels: one 8-bit band
    Gray(GrayImage),
    /// IR channels: colorized 3-band image
    Color(RgbImage),
}

impl EnhancedChannel {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            EnhancedChannel::Gray(a) => a.dim(),
            EnhancedChannel::Color(a) => {
                let (r, c, _) = a.dim();
                (r, c)
            }
        }
    }

    pub fn bands(&self) -> usize {
        match self {
            EnhancedChannel::Gray(_) => 1,
            EnhancedChannel::Color(_) => 3,
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            EnhancedChannel::Gray(a) => a.len(),
            EnhancedChannel::Color(a) => a.len(),
        }
    }
}

/// Square-root tone curve for reflectance; NaN renders as 0
pub fn enhance_visible(reflectance: &CalibratedImage) -> GrayImage {
    let (rows, cols) = reflectance.dim();
    render_gray(rows, cols, |r, c| {
        let v = reflectance[[r, c]];
        if v.is_nan() {
            0
        } else {
            (v.clamp(0.0, 1.0).sqrt() * 255.0) as u8
        }
    })
}

/// Owner of the per-channel table cache
#[derive(Debug)]
pub struct EnhancementEngine {
    use_combined_luts: bool,
    cache: RwLock<HashMap<ChannelCode, Arc<CombinedLut>>>,
}

impl Default for EnhancementEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EnhancementEngine {
    /// `use_combined_luts = false` evaluates curve and color table per pixel
    pub fn new(use_combined_luts: bool) -> Self {
        Self {
            use_combined_luts,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached combined table for a channel, built on first use
    pub fn combined_lut(&self, code: ChannelCode) -> GoesResult<Arc<CombinedLut>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| GoesError::Processing("enhancement cache poisoned".to_string()))?;
            if let Some(lut) = cache.get(&code) {
                return Ok(Arc::clone(lut));
            }
        }

        let built = Arc::new(CombinedLut::build(code));
        let mut cache = self
            .cache
            .write()
            .map_err(|_| GoesError::Processing("enhancement cache poisoned".to_string()))?;
        let lut = cache.entry(code).or_insert_with(|| {
            log::debug!("Built combined temperature->RGB table for {}", code);
            built
        });
        Ok(Arc::clone(lut))
    }

    pub fn cached_tables(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Colorize a brightness temperature grid (kelvin)
    pub fn enhance_ir(&self, kelvin: &CalibratedImage, code: ChannelCode) -> GoesResult<RgbImage> {
        let (rows, cols) = kelvin.dim();

        if self.use_combined_luts {
            let lut = self.combined_lut(code)?;
            return Ok(render_rgb(rows, cols, |r, c| {
                lut.lookup(kelvin[[r, c]] - KELVIN_OFFSET)
            }));
        }

        let family = code.family();
        let colors = ColorTable::for_family(family);
        Ok(render_rgb(rows, cols, |r, c| {
            let celsius = kelvin[[r, c]] - KELVIN_OFFSET;
            if celsius.is_nan() {
                return [0, 0, 0];
            }
            let index = enhancement_value(family, celsius as f64).clamp(0.0, 255.0) as u8;
            colors.lookup(index)
        }))
    }

    /// Enhance a calibrated channel according to its class
    pub fn enhance(&self, channel: &CalibratedChannel) -> GoesResult<EnhancedChannel> {
        match channel.class {
            ChannelClass::Ir => Ok(EnhancedChannel::Color(self.enhance_ir(&channel.data, channel.code)?)),
            ChannelClass::Visible => Ok(EnhancedChannel::Gray(enhance_visible(&channel.data))),
        }
    }
}
